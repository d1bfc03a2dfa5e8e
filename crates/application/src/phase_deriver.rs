//! 阶段派生器
//!
//! 把持久化状态（发布状态、各阶段状态、cron控制块、回归测试周期）
//! 映射为唯一的展示阶段与合法操作集。实现为有序的决策表：按顺序
//! 求值谓词，返回第一个命中的行；各行按构造互斥。
//!
//! 纯函数，无副作用；输入不满足持久化不变式时报 `InvalidState`，绝不猜测。

use orchestrator_domain::{
    Phase, RegressionCycleStatus, Release, ReleaseAction, ReleaseStatus, StageStatus,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

/// 当前回归测试周期的快照（阶段2之外为 `None`）
#[derive(Debug, Clone)]
pub struct CycleSnapshot {
    pub status: RegressionCycleStatus,
    pub tag: String,
    pub sequence: i32,
    /// 是否还有下一个周期（尚有剩余时段且未跳过）
    pub has_next: bool,
}

#[derive(Debug)]
pub struct PhaseInput<'a> {
    pub release: &'a Release,
    pub cycle: Option<CycleSnapshot>,
}

#[derive(Debug, Clone)]
pub struct PhaseResolution {
    pub phase: Phase,
    pub display_text: String,
    pub actions: Vec<ReleaseAction>,
}

struct PhaseRule {
    phase: Phase,
    matches: fn(&PhaseInput) -> bool,
    display: fn(&PhaseInput) -> String,
    actions: &'static [ReleaseAction],
}

use orchestrator_domain::PauseType;

fn paused_with(input: &PhaseInput, pause_type: PauseType) -> bool {
    input.release.status == ReleaseStatus::Paused && input.release.cron.pause_type == pause_type
}

fn in_regression(input: &PhaseInput) -> bool {
    input.release.status == ReleaseStatus::InProgress
        && input.release.stage1_status == StageStatus::Completed
        && input.release.stage2_status == StageStatus::InProgress
}

fn cycle_terminal(input: &PhaseInput) -> bool {
    matches!(
        input.cycle.as_ref().map(|c| c.status),
        Some(RegressionCycleStatus::Done) | Some(RegressionCycleStatus::Abandoned)
    )
}

fn cycle_has_next(input: &PhaseInput) -> bool {
    input.cycle.as_ref().map(|c| c.has_next).unwrap_or(false)
}

fn cycle_tag(input: &PhaseInput) -> String {
    input
        .cycle
        .as_ref()
        .map(|c| c.tag.clone())
        .unwrap_or_else(|| "RC1".to_string())
}

/// 决策表，从上到下求值，首个命中生效
static PHASE_TABLE: &[PhaseRule] = &[
    PhaseRule {
        phase: Phase::Archived,
        matches: |input| input.release.status == ReleaseStatus::Archived,
        display: |_| "发布已归档".to_string(),
        actions: &[],
    },
    PhaseRule {
        phase: Phase::PausedByUser,
        matches: |input| paused_with(input, PauseType::UserRequested),
        display: |_| "发布已由用户暂停".to_string(),
        actions: &[ReleaseAction::Resume, ReleaseAction::Archive],
    },
    PhaseRule {
        phase: Phase::PausedByFailure,
        matches: |input| paused_with(input, PauseType::TaskFailure),
        display: |_| "任务失败，发布已暂停，请重试或跳过失败任务".to_string(),
        actions: &[
            ReleaseAction::RetryTask,
            ReleaseAction::SkipTask,
            ReleaseAction::Archive,
        ],
    },
    PhaseRule {
        phase: Phase::AwaitingRegressionTrigger,
        matches: |input| {
            paused_with(input, PauseType::AwaitingStageTrigger)
                && input.release.stage1_status == StageStatus::Completed
                && input.release.stage2_status == StageStatus::Pending
        },
        display: |_| "kickoff完成，等待人工触发回归测试阶段".to_string(),
        actions: &[ReleaseAction::TriggerStage2, ReleaseAction::Archive],
    },
    PhaseRule {
        phase: Phase::AwaitingDistributionTrigger,
        matches: |input| {
            paused_with(input, PauseType::AwaitingStageTrigger)
                && input.release.stage2_status == StageStatus::Completed
                && input.release.stage3_status == StageStatus::Pending
        },
        display: |_| "回归测试完成，等待人工触发发布分发阶段".to_string(),
        actions: &[ReleaseAction::TriggerStage3, ReleaseAction::Archive],
    },
    PhaseRule {
        phase: Phase::PendingKickoff,
        matches: |input| input.release.status == ReleaseStatus::Pending,
        display: |input| {
            format!(
                "发布已排期，kickoff时间 {}",
                input.release.kickoff_at.format("%Y-%m-%d %H:%M UTC")
            )
        },
        actions: &[ReleaseAction::Start, ReleaseAction::Archive],
    },
    PhaseRule {
        phase: Phase::KickoffInProgress,
        matches: |input| {
            input.release.status == ReleaseStatus::InProgress
                && input.release.stage1_status == StageStatus::InProgress
        },
        display: |_| "kickoff阶段进行中".to_string(),
        actions: &[ReleaseAction::Pause, ReleaseAction::Archive],
    },
    PhaseRule {
        phase: Phase::RegressionCycleStarting,
        matches: |input| {
            in_regression(input)
                && matches!(
                    input.cycle.as_ref().map(|c| c.status),
                    None | Some(RegressionCycleStatus::NotStarted)
                )
        },
        display: |input| format!("回归测试周期 {} 即将开始", cycle_tag(input)),
        actions: &[ReleaseAction::Pause, ReleaseAction::Archive],
    },
    PhaseRule {
        phase: Phase::RegressionCycleRunning,
        matches: |input| {
            in_regression(input)
                && (matches!(
                    input.cycle.as_ref().map(|c| c.status),
                    Some(RegressionCycleStatus::InProgress)
                ) || (cycle_terminal(input) && !cycle_has_next(input)))
        },
        display: |input| format!("回归测试周期 {} 进行中", cycle_tag(input)),
        actions: &[
            ReleaseAction::Pause,
            ReleaseAction::AbandonCycle,
            ReleaseAction::SkipRemainingCycles,
            ReleaseAction::Archive,
        ],
    },
    PhaseRule {
        phase: Phase::RegressionAwaitingNextCycle,
        matches: |input| in_regression(input) && cycle_terminal(input) && cycle_has_next(input),
        display: |input| format!("回归测试周期 {} 已结束，等待下一周期", cycle_tag(input)),
        actions: &[ReleaseAction::Pause, ReleaseAction::SkipRemainingCycles],
    },
    PhaseRule {
        phase: Phase::DistributionInProgress,
        matches: |input| {
            input.release.status == ReleaseStatus::InProgress
                && input.release.stage3_status == StageStatus::InProgress
        },
        display: |_| "发布分发阶段进行中".to_string(),
        actions: &[ReleaseAction::Pause, ReleaseAction::Archive],
    },
    PhaseRule {
        phase: Phase::Submitted,
        matches: |input| input.release.status == ReleaseStatus::Submitted,
        display: |_| "发布已提交，等待生效".to_string(),
        actions: &[ReleaseAction::Archive],
    },
    PhaseRule {
        phase: Phase::Completed,
        matches: |input| input.release.status == ReleaseStatus::Completed,
        display: |_| "发布已完成".to_string(),
        actions: &[ReleaseAction::Archive],
    },
];

/// 派生展示阶段。确定性、幂等，可任意频率调用。
pub fn derive_phase(input: &PhaseInput) -> OrchestratorResult<PhaseResolution> {
    input.release.validate_invariants()?;

    for rule in PHASE_TABLE {
        if (rule.matches)(input) {
            return Ok(PhaseResolution {
                phase: rule.phase,
                display_text: (rule.display)(input),
                actions: rule.actions.to_vec(),
            });
        }
    }

    // 决策表覆盖所有合法状态组合，落到这里说明数据不一致
    Err(OrchestratorError::invalid_state(format!(
        "发布 {} 的状态组合无法派生阶段: status={:?}, stages=({:?},{:?},{:?}), cron={:?}/{:?}",
        input.release.id,
        input.release.status,
        input.release.stage1_status,
        input.release.stage2_status,
        input.release.stage3_status,
        input.release.cron.status,
        input.release.cron.pause_type,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orchestrator_domain::{CronStatus, Platform, SemanticVersion, Stage, VersionTarget};

    fn release() -> Release {
        Release::new(
            "tenant-1".to_string(),
            1,
            vec![VersionTarget {
                platform: Platform::Android,
                target: "play-store".to_string(),
                version: SemanticVersion::new(1, 2, 0),
            }],
            Utc::now(),
            None,
            Utc::now() + chrono::Duration::days(10),
        )
    }

    fn in_regression_release() -> Release {
        let mut r = release();
        r.status = ReleaseStatus::InProgress;
        r.cron.resume();
        r.set_stage_status(Stage::Kickoff, StageStatus::Completed, Utc::now());
        r.set_stage_status(Stage::Regression, StageStatus::InProgress, Utc::now());
        r
    }

    fn cycle(status: RegressionCycleStatus, has_next: bool) -> Option<CycleSnapshot> {
        Some(CycleSnapshot {
            status,
            tag: "RC1".to_string(),
            sequence: 1,
            has_next,
        })
    }

    fn derive(release: &Release, cycle: Option<CycleSnapshot>) -> PhaseResolution {
        derive_phase(&PhaseInput { release, cycle }).unwrap()
    }

    #[test]
    fn test_archived_wins_over_everything() {
        let mut r = release();
        r.archive(Utc::now());
        let resolution = derive(&r, None);
        assert_eq!(resolution.phase, Phase::Archived);
        assert!(resolution.actions.is_empty());
    }

    #[test]
    fn test_pending_release_awaits_kickoff() {
        let r = release();
        let resolution = derive(&r, None);
        assert_eq!(resolution.phase, Phase::PendingKickoff);
        assert_eq!(
            resolution.actions,
            vec![ReleaseAction::Start, ReleaseAction::Archive]
        );
    }

    #[test]
    fn test_paused_by_user() {
        let mut r = release();
        r.status = ReleaseStatus::InProgress;
        r.cron.resume();
        r.pause(orchestrator_domain::PauseType::UserRequested, Utc::now())
            .unwrap();

        let resolution = derive(&r, None);
        assert_eq!(resolution.phase, Phase::PausedByUser);
        assert_eq!(
            resolution.actions,
            vec![ReleaseAction::Resume, ReleaseAction::Archive]
        );
    }

    #[test]
    fn test_paused_by_failure_offers_retry_and_skip() {
        let mut r = release();
        r.status = ReleaseStatus::InProgress;
        r.cron.resume();
        r.set_stage_status(Stage::Kickoff, StageStatus::InProgress, Utc::now());
        r.pause(orchestrator_domain::PauseType::TaskFailure, Utc::now())
            .unwrap();

        let resolution = derive(&r, None);
        assert_eq!(resolution.phase, Phase::PausedByFailure);
        assert!(resolution.actions.contains(&ReleaseAction::RetryTask));
        assert!(resolution.actions.contains(&ReleaseAction::SkipTask));
    }

    #[test]
    fn test_awaiting_stage_triggers() {
        let mut r = release();
        r.status = ReleaseStatus::InProgress;
        r.cron.resume();
        r.set_stage_status(Stage::Kickoff, StageStatus::Completed, Utc::now());
        r.pause(orchestrator_domain::PauseType::AwaitingStageTrigger, Utc::now())
            .unwrap();
        assert_eq!(derive(&r, None).phase, Phase::AwaitingRegressionTrigger);

        r.set_stage_status(Stage::Regression, StageStatus::Completed, Utc::now());
        assert_eq!(derive(&r, None).phase, Phase::AwaitingDistributionTrigger);
    }

    #[test]
    fn test_regression_cycle_starting() {
        let r = in_regression_release();
        // 周期尚未创建
        assert_eq!(derive(&r, None).phase, Phase::RegressionCycleStarting);
        // 周期已创建但未开始
        assert_eq!(
            derive(&r, cycle(RegressionCycleStatus::NotStarted, true)).phase,
            Phase::RegressionCycleStarting
        );
    }

    #[test]
    fn test_regression_cycle_running() {
        let r = in_regression_release();
        let resolution = derive(&r, cycle(RegressionCycleStatus::InProgress, true));
        assert_eq!(resolution.phase, Phase::RegressionCycleRunning);
        assert!(resolution.actions.contains(&ReleaseAction::AbandonCycle));
    }

    #[test]
    fn test_regression_awaiting_next_cycle_exact_actions() {
        // stage1完成、stage2进行中、当前周期DONE、还有下一周期
        let r = in_regression_release();
        let resolution = derive(&r, cycle(RegressionCycleStatus::Done, true));
        assert_eq!(resolution.phase, Phase::RegressionAwaitingNextCycle);
        assert_eq!(
            resolution.actions,
            vec![ReleaseAction::Pause, ReleaseAction::SkipRemainingCycles]
        );
    }

    #[test]
    fn test_last_cycle_done_without_next_stays_running_phase() {
        let r = in_regression_release();
        let resolution = derive(&r, cycle(RegressionCycleStatus::Done, false));
        assert_eq!(resolution.phase, Phase::RegressionCycleRunning);
    }

    #[test]
    fn test_submitted_and_completed() {
        let mut r = release();
        r.set_stage_status(Stage::Kickoff, StageStatus::Completed, Utc::now());
        r.set_stage_status(Stage::Regression, StageStatus::Completed, Utc::now());
        r.set_stage_status(Stage::Distribution, StageStatus::Completed, Utc::now());
        r.cron.complete();

        r.status = ReleaseStatus::Submitted;
        assert_eq!(derive(&r, None).phase, Phase::Submitted);

        r.status = ReleaseStatus::Completed;
        assert_eq!(derive(&r, None).phase, Phase::Completed);
    }

    #[test]
    fn test_inconsistent_cron_block_raises_invalid_state() {
        let mut r = release();
        r.status = ReleaseStatus::InProgress;
        r.cron.status = CronStatus::Running;
        r.cron.pause_type = orchestrator_domain::PauseType::TaskFailure;

        let err = derive_phase(&PhaseInput {
            release: &r,
            cycle: None,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            orchestrator_errors::OrchestratorError::InvalidState(_)
        ));
    }

    #[test]
    fn test_unmatchable_combination_raises_invalid_state() {
        // IN_PROGRESS 但没有任何阶段处于进行中，也不满足任何行
        let mut r = release();
        r.status = ReleaseStatus::InProgress;
        r.cron.resume();

        let err = derive_phase(&PhaseInput {
            release: &r,
            cycle: None,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            orchestrator_errors::OrchestratorError::InvalidState(_)
        ));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let r = in_regression_release();
        let a = derive(&r, cycle(RegressionCycleStatus::InProgress, true));
        let b = derive(&r, cycle(RegressionCycleStatus::InProgress, true));
        assert_eq!(a.phase, b.phase);
        assert_eq!(a.display_text, b.display_text);
        assert_eq!(a.actions, b.actions);
    }
}
