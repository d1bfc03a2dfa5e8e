//! 阶段流转
//!
//! 调度循环与人工操作共用的状态跃迁实现：进入阶段时生成任务计划、
//! 完成阶段时决定下一步（直接推进、等待人工触发、或提交发布）。
//! 任务计划只为已配置的集成生成任务，未配置的集成视为未启用。

use chrono::{DateTime, Utc};
use tracing::info;

use orchestrator_domain::{
    Actor, PauseType, RegressionCycle, Release, ReleaseConfig, ReleaseStatus, ReleaseTask, Stage,
    StageStatus, TaskType,
};
use orchestrator_errors::OrchestratorResult;

use crate::activity_log::ActivityLogRecorder;
use crate::context::OrchestrationContext;

/// 任务计划中的一项；依赖以计划内下标表示，落库时换算为任务ID
struct TaskSpec {
    task_type: TaskType,
    name: String,
    sequence: i32,
    deps: Vec<usize>,
    optional: bool,
    parameters: serde_json::Value,
}

/// 启动发布：PENDING → IN_PROGRESS，进入kickoff阶段并生成任务
pub async fn start_release(
    ctx: &OrchestrationContext,
    recorder: &ActivityLogRecorder,
    release: &mut Release,
    config: &ReleaseConfig,
    actor: Actor,
    now: DateTime<Utc>,
) -> OrchestratorResult<()> {
    let previous = release.status;
    release.status = ReleaseStatus::InProgress;
    release.cron.resume();
    release.touch(now);

    recorder
        .record_release_status(release, "release.status", previous, release.status, actor.clone())
        .await;

    enter_stage(ctx, recorder, release, config, Stage::Kickoff, actor, now).await
}

/// 进入一个阶段：置为IN_PROGRESS并生成该阶段的任务计划
pub async fn enter_stage(
    ctx: &OrchestrationContext,
    recorder: &ActivityLogRecorder,
    release: &mut Release,
    config: &ReleaseConfig,
    stage: Stage,
    actor: Actor,
    now: DateTime<Utc>,
) -> OrchestratorResult<()> {
    let previous = release.stage_status(stage);
    release.set_stage_status(stage, StageStatus::InProgress, now);

    let specs = match stage {
        Stage::Kickoff => kickoff_plan(config),
        // 回归测试阶段的任务按周期生成，见 create_cycle_tasks
        Stage::Regression => Vec::new(),
        Stage::Distribution => distribution_plan(config),
    };
    let created = materialize(ctx, release.id, stage, specs).await?;

    ctx.releases.update(release).await?;
    recorder
        .record(
            orchestrator_domain::EntityType::Release,
            release.id,
            &release.tenant_id,
            &format!("release.stage{}", stage.number()),
            serde_json::to_value(previous).unwrap_or(serde_json::Value::Null),
            serde_json::to_value(StageStatus::InProgress).unwrap_or(serde_json::Value::Null),
            actor,
        )
        .await;

    info!(
        release_id = release.id,
        stage = stage.number(),
        task_count = created,
        "进入阶段并生成任务计划"
    );
    Ok(())
}

/// 完成一个阶段并决定下一步。
///
/// - 最后一个阶段完成 → 发布进入SUBMITTED，cron收尾
/// - 下一阶段需要人工触发 → 暂停等待阶段触发
/// - 否则直接进入下一阶段
pub async fn complete_stage(
    ctx: &OrchestrationContext,
    recorder: &ActivityLogRecorder,
    release: &mut Release,
    config: &ReleaseConfig,
    stage: Stage,
    actor: Actor,
    now: DateTime<Utc>,
) -> OrchestratorResult<()> {
    let previous = release.stage_status(stage);
    release.set_stage_status(stage, StageStatus::Completed, now);
    recorder
        .record(
            orchestrator_domain::EntityType::Release,
            release.id,
            &release.tenant_id,
            &format!("release.stage{}", stage.number()),
            serde_json::to_value(previous).unwrap_or(serde_json::Value::Null),
            serde_json::to_value(StageStatus::Completed).unwrap_or(serde_json::Value::Null),
            actor.clone(),
        )
        .await;

    match stage.next() {
        None => submit_release(ctx, recorder, release, actor, now).await,
        Some(next_stage) => {
            let requires_trigger = match next_stage {
                Stage::Regression => config.schedule.require_stage2_trigger,
                Stage::Distribution => config.schedule.require_stage3_trigger,
                Stage::Kickoff => false,
            };
            if requires_trigger {
                let previous_status = release.status;
                release.pause(PauseType::AwaitingStageTrigger, now)?;
                ctx.releases.update(release).await?;
                recorder
                    .record_release_status(
                        release,
                        "release.status",
                        previous_status,
                        release.status,
                        actor,
                    )
                    .await;
                info!(
                    release_id = release.id,
                    next_stage = next_stage.number(),
                    "阶段完成，等待人工触发下一阶段"
                );
                Ok(())
            } else {
                enter_stage(ctx, recorder, release, config, next_stage, actor, now).await
            }
        }
    }
}

/// 全部阶段完成后提交发布
pub async fn submit_release(
    ctx: &OrchestrationContext,
    recorder: &ActivityLogRecorder,
    release: &mut Release,
    actor: Actor,
    now: DateTime<Utc>,
) -> OrchestratorResult<()> {
    let previous = release.status;
    release.status = ReleaseStatus::Submitted;
    release.cron.complete();
    release.touch(now);
    ctx.releases.update(release).await?;
    recorder
        .record_release_status(release, "release.status", previous, release.status, actor)
        .await;
    info!(release_id = release.id, "发布已提交");
    Ok(())
}

/// 为一个回归测试周期生成任务（进入该周期时调用）
pub async fn create_cycle_tasks(
    ctx: &OrchestrationContext,
    release: &Release,
    config: &ReleaseConfig,
    cycle: &RegressionCycle,
) -> OrchestratorResult<usize> {
    let specs = cycle_plan(config, cycle);
    materialize(ctx, release.id, Stage::Regression, specs).await
}

fn kickoff_plan(config: &ReleaseConfig) -> Vec<TaskSpec> {
    let mut specs = Vec::new();
    let integrations = &config.integrations;

    let has_scm = integrations.scm_repo.is_some() && integrations.base_branch.is_some();
    let mut fork_index = None;
    if has_scm {
        fork_index = Some(specs.len());
        specs.push(TaskSpec {
            task_type: TaskType::ForkBranch,
            name: "切出发布分支".to_string(),
            sequence: 1,
            deps: vec![],
            optional: false,
            parameters: serde_json::json!({}),
        });
    }

    let use_ci_build = matches!(
        config.build_upload_mode,
        orchestrator_domain::BuildUploadMode::CiPipeline
    );
    if use_ci_build {
        if let Some(workflow) = &integrations.ci_workflow {
            specs.push(TaskSpec {
                task_type: TaskType::TriggerBuild,
                name: "触发RC构建".to_string(),
                sequence: 2,
                deps: fork_index.into_iter().collect(),
                optional: false,
                parameters: serde_json::json!({ "workflow": workflow }),
            });
        }
    }

    if integrations.ticketing_config.is_some() {
        specs.push(TaskSpec {
            task_type: TaskType::CreateTickets,
            name: "创建发布工单".to_string(),
            sequence: 3,
            deps: vec![],
            optional: true,
            parameters: serde_json::json!({}),
        });
    }

    if integrations.messaging_config.is_some() {
        specs.push(TaskSpec {
            task_type: TaskType::NotifyChannel,
            name: "通知kickoff启动".to_string(),
            sequence: 4,
            deps: fork_index.into_iter().collect(),
            optional: true,
            parameters: serde_json::json!({ "message_kind": "KICKOFF_STARTED" }),
        });
    }

    specs
}

fn distribution_plan(config: &ReleaseConfig) -> Vec<TaskSpec> {
    let mut specs = Vec::new();
    let integrations = &config.integrations;

    let mut tag_index = None;
    if integrations.scm_repo.is_some() {
        tag_index = Some(specs.len());
        specs.push(TaskSpec {
            task_type: TaskType::CreateReleaseTag,
            name: "创建发布tag".to_string(),
            sequence: 1,
            deps: vec![],
            optional: false,
            parameters: serde_json::json!({}),
        });
    }

    let use_ci_build = matches!(
        config.build_upload_mode,
        orchestrator_domain::BuildUploadMode::CiPipeline
    );
    if use_ci_build {
        if let Some(workflow) = &integrations.ci_release_workflow {
            specs.push(TaskSpec {
                task_type: TaskType::TriggerBuild,
                name: "触发发布构建".to_string(),
                sequence: 2,
                deps: tag_index.into_iter().collect(),
                optional: false,
                parameters: serde_json::json!({ "workflow": workflow }),
            });
        }
    }

    if integrations.messaging_config.is_some() {
        specs.push(TaskSpec {
            task_type: TaskType::NotifyChannel,
            name: "通知发布提交".to_string(),
            sequence: 3,
            deps: vec![],
            optional: true,
            parameters: serde_json::json!({ "message_kind": "RELEASE_SUBMITTED" }),
        });
    }

    specs
}

fn cycle_plan(config: &ReleaseConfig, cycle: &RegressionCycle) -> Vec<TaskSpec> {
    let mut specs = Vec::new();
    let integrations = &config.integrations;
    // 同阶段内多个周期的任务共存，以周期序号拉开序号区间
    let base = cycle.sequence * 10;

    if integrations.test_management_config.is_some() {
        specs.push(TaskSpec {
            task_type: TaskType::CreateTestRuns,
            name: format!("创建回归测试批次 {}", cycle.tag),
            sequence: base + 1,
            deps: vec![],
            optional: false,
            parameters: serde_json::json!({ "cycle_id": cycle.id, "cycle_tag": cycle.tag }),
        });
    }

    if integrations.messaging_config.is_some() {
        specs.push(TaskSpec {
            task_type: TaskType::NotifyChannel,
            name: format!("通知回归测试周期 {} 开始", cycle.tag),
            sequence: base + 2,
            deps: vec![],
            optional: true,
            parameters: serde_json::json!({
                "message_kind": "REGRESSION_CYCLE_STARTED",
                "cycle_tag": cycle.tag,
            }),
        });
    }

    specs
}

/// 依序落库任务计划，把计划内下标换算为已分配的任务ID
async fn materialize(
    ctx: &OrchestrationContext,
    release_id: i64,
    stage: Stage,
    specs: Vec<TaskSpec>,
) -> OrchestratorResult<usize> {
    let mut created_ids: Vec<i64> = Vec::with_capacity(specs.len());
    for spec in specs {
        let dependencies: Vec<i64> = spec.deps.iter().map(|&i| created_ids[i]).collect();
        let task = ReleaseTask::new(
            release_id,
            stage,
            spec.task_type,
            spec.name,
            spec.sequence,
            dependencies,
            spec.optional,
            spec.parameters,
        );
        let created = ctx.tasks.create(&task).await?;
        created_ids.push(created.id);
    }
    Ok(created_ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::BuildUploadMode;
    use orchestrator_testing_utils::builders::ReleaseConfigBuilder;

    #[test]
    fn test_kickoff_plan_full_integrations() {
        let config = ReleaseConfigBuilder::new().build();
        let specs = kickoff_plan(&config);
        let types: Vec<TaskType> = specs.iter().map(|s| s.task_type).collect();
        assert_eq!(
            types,
            vec![
                TaskType::ForkBranch,
                TaskType::TriggerBuild,
                TaskType::NotifyChannel,
            ]
        );
        // 构建与通知都依赖切分支
        assert_eq!(specs[1].deps, vec![0]);
        assert_eq!(specs[2].deps, vec![0]);
        assert!(!specs[1].optional);
        assert!(specs[2].optional);
    }

    #[test]
    fn test_kickoff_plan_manual_upload_skips_build() {
        let config = ReleaseConfigBuilder::new()
            .with_build_upload_mode(BuildUploadMode::Manual)
            .build();
        let specs = kickoff_plan(&config);
        assert!(specs.iter().all(|s| s.task_type != TaskType::TriggerBuild));
    }

    #[test]
    fn test_kickoff_plan_without_integrations_is_empty() {
        let config = ReleaseConfigBuilder::new()
            .without_scm()
            .without_messaging()
            .with_ci_workflow(None)
            .build();
        assert!(kickoff_plan(&config).is_empty());
    }

    #[test]
    fn test_distribution_plan_orders_tag_before_build() {
        let config = ReleaseConfigBuilder::new().build();
        let specs = distribution_plan(&config);
        assert_eq!(specs[0].task_type, TaskType::CreateReleaseTag);
        assert_eq!(specs[1].task_type, TaskType::TriggerBuild);
        assert_eq!(specs[1].deps, vec![0]);
        assert_eq!(
            specs[1].parameters["workflow"],
            config.integrations.ci_release_workflow.clone().unwrap()
        );
    }

    #[test]
    fn test_cycle_plan_carries_cycle_tag() {
        let config = ReleaseConfigBuilder::new()
            .with_test_management(Some("tm-1"))
            .build();
        let cycle = RegressionCycle::new(1, 2, chrono::Utc::now());
        let specs = cycle_plan(&config, &cycle);
        assert_eq!(specs[0].task_type, TaskType::CreateTestRuns);
        assert_eq!(specs[0].parameters["cycle_tag"], "RC2");
        assert_eq!(specs[0].sequence, 21);
    }
}
