//! 状态视图
//!
//! 把持久化实体组装为对外暴露的只读DTO：派生阶段、展示文案、
//! 当前可用操作、阶段/任务/周期明细。字段命名面向前端使用camelCase。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orchestrator_domain::{
    ActivityLogEntry, CronStatus, EntityType, PauseType, Phase, RegressionCycle,
    RegressionCycleStatus, Release, ReleaseAction, ReleaseConfig, ReleaseStatus, ReleaseTask,
    Stage, StageStatus, TaskError, TaskStatus, TaskType, VersionTarget,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

use crate::context::OrchestrationContext;
use crate::phase_deriver::{derive_phase, CycleSnapshot, PhaseInput};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageView {
    pub number: u8,
    pub stage: Stage,
    pub status: StageStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleView {
    pub cycle_id: i64,
    pub sequence: i32,
    pub tag: String,
    pub status: RegressionCycleStatus,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// 调度开关的对外快照：是否在跑、因何暂停
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronView {
    pub status: CronStatus,
    pub pause_type: PauseType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub task_id: i64,
    pub stage: Stage,
    pub task_type: TaskType,
    pub name: String,
    pub sequence: i32,
    pub status: TaskStatus,
    pub optional: bool,
    pub retry_count: i32,
    pub external_ref: Option<String>,
    pub error: Option<TaskError>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStatusView {
    pub release_id: i64,
    pub tenant_id: String,
    pub config_id: i64,
    pub status: ReleaseStatus,
    pub cron: CronView,
    pub phase: Phase,
    pub phase_display: String,
    pub available_actions: Vec<ReleaseAction>,
    pub version_targets: Vec<VersionTarget>,
    pub stages: Vec<StageView>,
    pub kickoff_at: DateTime<Utc>,
    pub kickoff_reminder_at: Option<DateTime<Utc>>,
    pub target_release_at: DateTime<Utc>,
    pub current_cycle: Option<CycleView>,
    pub cycles: Vec<CycleView>,
    pub tasks: Vec<TaskView>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ReleaseStatusService {
    ctx: OrchestrationContext,
}

impl ReleaseStatusService {
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self { ctx }
    }

    pub async fn get_status(&self, release_id: i64) -> OrchestratorResult<ReleaseStatusView> {
        let release = self
            .ctx
            .releases
            .get_by_id(release_id)
            .await?
            .ok_or(OrchestratorError::ReleaseNotFound { id: release_id })?;
        let config = self
            .ctx
            .configs
            .get_by_id(release.config_id)
            .await?
            .ok_or(OrchestratorError::ReleaseConfigNotFound {
                id: release.config_id,
            })?;

        let cycles = self.ctx.cycles.list_for_release(release.id).await?;
        let tasks = self.ctx.tasks.list_for_release(release.id).await?;

        let snapshot = cycle_snapshot(&release, &config, &cycles);
        let resolution = derive_phase(&PhaseInput {
            release: &release,
            cycle: snapshot,
        })?;

        let current_cycle = cycles
            .iter()
            .find(|c| !c.is_terminal())
            .or_else(|| cycles.last())
            .map(cycle_view);

        Ok(ReleaseStatusView {
            release_id: release.id,
            tenant_id: release.tenant_id.clone(),
            config_id: release.config_id,
            status: release.status,
            cron: CronView {
                status: release.cron.status,
                pause_type: release.cron.pause_type,
            },
            phase: resolution.phase,
            phase_display: resolution.display_text,
            available_actions: resolution.actions,
            version_targets: release.version_targets.clone(),
            stages: vec![
                stage_view(&release, Stage::Kickoff),
                stage_view(&release, Stage::Regression),
                stage_view(&release, Stage::Distribution),
            ],
            kickoff_at: release.kickoff_at,
            kickoff_reminder_at: release.kickoff_reminder_at,
            target_release_at: release.target_release_at,
            current_cycle,
            cycles: cycles.iter().map(cycle_view).collect(),
            tasks: tasks.iter().map(task_view).collect(),
            updated_at: release.updated_at,
        })
    }

    pub async fn list_for_tenant(
        &self,
        tenant_id: &str,
    ) -> OrchestratorResult<Vec<ReleaseStatusView>> {
        let releases = self.ctx.releases.list_for_tenant(tenant_id).await?;
        let mut views = Vec::with_capacity(releases.len());
        for release in releases {
            views.push(self.get_status(release.id).await?);
        }
        Ok(views)
    }

    /// 发布的审计时间线
    pub async fn activity_history(
        &self,
        release_id: i64,
    ) -> OrchestratorResult<Vec<ActivityLogEntry>> {
        self.ctx
            .releases
            .get_by_id(release_id)
            .await?
            .ok_or(OrchestratorError::ReleaseNotFound { id: release_id })?;
        self.ctx
            .activity
            .list_for_entity(EntityType::Release, release_id)
            .await
    }
}

fn stage_view(release: &Release, stage: Stage) -> StageView {
    StageView {
        number: stage.number(),
        stage,
        status: release.stage_status(stage),
    }
}

fn cycle_view(cycle: &RegressionCycle) -> CycleView {
    CycleView {
        cycle_id: cycle.id,
        sequence: cycle.sequence,
        tag: cycle.tag.clone(),
        status: cycle.status,
        scheduled_at: cycle.scheduled_at,
        started_at: cycle.started_at,
        finished_at: cycle.finished_at,
    }
}

fn task_view(task: &ReleaseTask) -> TaskView {
    TaskView {
        task_id: task.id,
        stage: task.stage,
        task_type: task.task_type,
        name: task.name.clone(),
        sequence: task.sequence,
        status: task.status,
        optional: task.optional,
        retry_count: task.retry_count,
        external_ref: task.external_ref.clone(),
        error: task.error.clone(),
        dispatched_at: task.dispatched_at,
        completed_at: task.completed_at,
    }
}

/// 从已建周期与配置时段推导阶段派生所需的周期快照。
///
/// 取首个未终结的周期（没有则取最后一个）；`has_next` 表示它之后
/// 还有已建周期或未消化的时段（且未被跳过）。
pub fn cycle_snapshot(
    release: &Release,
    config: &ReleaseConfig,
    cycles: &[RegressionCycle],
) -> Option<CycleSnapshot> {
    if cycles.is_empty() {
        return None;
    }
    let index = cycles
        .iter()
        .position(|c| !c.is_terminal())
        .unwrap_or(cycles.len() - 1);
    let cycle = &cycles[index];

    let more_created = index + 1 < cycles.len();
    let more_slots = cycles.len() < config.schedule.regression_slots.len();
    let has_next = !release.skip_remaining_cycles && (more_created || more_slots);

    Some(CycleSnapshot {
        status: cycle.status,
        tag: cycle.tag.clone(),
        sequence: cycle.sequence,
        has_next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_testing_utils::builders::{ReleaseBuilder, ReleaseConfigBuilder};

    fn cycle(sequence: i32, status: RegressionCycleStatus) -> RegressionCycle {
        let mut c = RegressionCycle::new(1, sequence, Utc::now());
        c.id = sequence as i64;
        c.status = status;
        c
    }

    #[test]
    fn test_cron_view_wire_format() {
        let view = CronView {
            status: CronStatus::Paused,
            pause_type: PauseType::UserRequested,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "PAUSED");
        assert_eq!(json["pauseType"], "USER_REQUESTED");
    }

    #[test]
    fn test_snapshot_empty_cycles() {
        let release = ReleaseBuilder::new().build();
        let config = ReleaseConfigBuilder::new().build();
        assert!(cycle_snapshot(&release, &config, &[]).is_none());
    }

    #[test]
    fn test_snapshot_prefers_open_cycle() {
        let release = ReleaseBuilder::new().build();
        let config = ReleaseConfigBuilder::new()
            .with_regression_slots(3)
            .build();
        let cycles = vec![
            cycle(1, RegressionCycleStatus::Done),
            cycle(2, RegressionCycleStatus::InProgress),
        ];
        let snapshot = cycle_snapshot(&release, &config, &cycles).unwrap();
        assert_eq!(snapshot.sequence, 2);
        assert_eq!(snapshot.status, RegressionCycleStatus::InProgress);
        // 还剩一个未消化的时段
        assert!(snapshot.has_next);
    }

    #[test]
    fn test_snapshot_last_cycle_has_no_next() {
        let release = ReleaseBuilder::new().build();
        let config = ReleaseConfigBuilder::new()
            .with_regression_slots(2)
            .build();
        let cycles = vec![
            cycle(1, RegressionCycleStatus::Done),
            cycle(2, RegressionCycleStatus::Done),
        ];
        let snapshot = cycle_snapshot(&release, &config, &cycles).unwrap();
        assert_eq!(snapshot.sequence, 2);
        assert!(!snapshot.has_next);
    }

    #[test]
    fn test_snapshot_skip_remaining_clears_next() {
        let mut release = ReleaseBuilder::new().build();
        release.skip_remaining_cycles = true;
        let config = ReleaseConfigBuilder::new()
            .with_regression_slots(3)
            .build();
        let cycles = vec![cycle(1, RegressionCycleStatus::Done)];
        let snapshot = cycle_snapshot(&release, &config, &cycles).unwrap();
        assert!(!snapshot.has_next);
    }
}
