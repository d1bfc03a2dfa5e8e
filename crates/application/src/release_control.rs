//! 发布操作服务
//!
//! 处理人工操作：先抢占发布锁与调度循环互斥，锁内重读并派生当前
//! 阶段，只有当前阶段允许的操作才会被执行，其余一律拒绝。
//! 每个被接受的操作都写入活动日志，执行者为发起用户。

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use orchestrator_domain::{
    release_lock_key, Actor, PauseType, Release, ReleaseAction, ReleaseTask, Stage, TaskStatus,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

use crate::activity_log::ActivityLogRecorder;
use crate::context::OrchestrationContext;
use crate::phase_deriver::{derive_phase, PhaseInput, PhaseResolution};
use crate::status_view::cycle_snapshot;
use crate::transitions;

/// 一次人工操作请求
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: ReleaseAction,
    /// RETRY_TASK / SKIP_TASK 必须指定目标任务
    pub task_id: Option<i64>,
    pub actor: Actor,
}

#[derive(Clone)]
pub struct ReleaseControlService {
    ctx: OrchestrationContext,
    recorder: ActivityLogRecorder,
    /// 锁持有者标识，与调度实例区分开
    owner: String,
    lock_ttl: Duration,
}

impl ReleaseControlService {
    pub fn new(ctx: OrchestrationContext, owner: String, lock_ttl: Duration) -> Self {
        let recorder = ActivityLogRecorder::new(ctx.activity.clone());
        Self {
            ctx,
            recorder,
            owner,
            lock_ttl,
        }
    }

    /// 对发布执行一个人工操作，返回操作后的阶段
    pub async fn apply(
        &self,
        release_id: i64,
        request: ActionRequest,
    ) -> OrchestratorResult<PhaseResolution> {
        let lock_key = release_lock_key(release_id);
        let acquired = self
            .ctx
            .lock
            .try_acquire(&lock_key, &self.owner, self.lock_ttl)
            .await?;
        if !acquired {
            return Err(OrchestratorError::LockConflict {
                release_id,
                holder: "scheduler".to_string(),
            });
        }

        let result = self.apply_locked(release_id, request).await;
        if let Err(e) = self.ctx.lock.release(&lock_key, &self.owner).await {
            warn!(release_id, error = %e, "释放发布锁失败，等待TTL过期");
        }
        result
    }

    async fn apply_locked(
        &self,
        release_id: i64,
        request: ActionRequest,
    ) -> OrchestratorResult<PhaseResolution> {
        let mut release = self
            .ctx
            .releases
            .get_by_id(release_id)
            .await?
            .ok_or(OrchestratorError::ReleaseNotFound { id: release_id })?;
        release.validate_invariants()?;
        let config = self
            .ctx
            .configs
            .get_by_id(release.config_id)
            .await?
            .ok_or(OrchestratorError::ReleaseConfigNotFound {
                id: release.config_id,
            })?;

        let cycles = self.ctx.cycles.list_for_release(release.id).await?;
        let snapshot = cycle_snapshot(&release, &config, &cycles);
        let resolution = derive_phase(&PhaseInput {
            release: &release,
            cycle: snapshot,
        })?;

        if !resolution.actions.contains(&request.action) {
            return Err(OrchestratorError::ActionNotAllowed {
                action: request.action.to_string(),
                phase: resolution.phase.to_string(),
            });
        }

        info!(
            release_id,
            action = %request.action,
            phase = %resolution.phase,
            "执行人工操作"
        );

        let actor = request.actor.clone();
        // 人工操作的逻辑时刻就是请求时刻
        let now = Utc::now();
        match request.action {
            ReleaseAction::Start => {
                transitions::start_release(
                    &self.ctx,
                    &self.recorder,
                    &mut release,
                    &config,
                    actor,
                    now,
                )
                .await?;
            }
            ReleaseAction::Pause => {
                let previous = release.status;
                release.pause(PauseType::UserRequested, now)?;
                self.ctx.releases.update(&release).await?;
                self.recorder
                    .record_release_status(&release, "release.status", previous, release.status, actor)
                    .await;
            }
            ReleaseAction::Resume => {
                let previous = release.status;
                release.resume(now);
                self.ctx.releases.update(&release).await?;
                self.recorder
                    .record_release_status(&release, "release.status", previous, release.status, actor)
                    .await;
            }
            ReleaseAction::TriggerStage2 => {
                let previous = release.status;
                release.resume(now);
                self.recorder
                    .record_release_status(
                        &release,
                        "release.status",
                        previous,
                        release.status,
                        actor.clone(),
                    )
                    .await;
                transitions::enter_stage(
                    &self.ctx,
                    &self.recorder,
                    &mut release,
                    &config,
                    Stage::Regression,
                    actor,
                    now,
                )
                .await?;
            }
            ReleaseAction::TriggerStage3 => {
                let previous = release.status;
                release.resume(now);
                self.recorder
                    .record_release_status(
                        &release,
                        "release.status",
                        previous,
                        release.status,
                        actor.clone(),
                    )
                    .await;
                transitions::enter_stage(
                    &self.ctx,
                    &self.recorder,
                    &mut release,
                    &config,
                    Stage::Distribution,
                    actor,
                    now,
                )
                .await?;
            }
            ReleaseAction::RetryTask => {
                let task = self.load_failed_task(&release, request.task_id).await?;
                self.retry_task(&mut release, task, actor, now).await?;
            }
            ReleaseAction::SkipTask => {
                let task = self.load_failed_task(&release, request.task_id).await?;
                self.skip_task(&mut release, task, actor, now).await?;
            }
            ReleaseAction::AbandonCycle => {
                self.abandon_current_cycle(&release, actor, now).await?;
            }
            ReleaseAction::SkipRemainingCycles => {
                release.skip_remaining_cycles = true;
                release.touch(now);
                self.ctx.releases.update(&release).await?;
                self.recorder
                    .record_release_status(
                        &release,
                        "release.skip_remaining_cycles",
                        false,
                        true,
                        actor,
                    )
                    .await;
            }
            ReleaseAction::Archive => {
                let previous = release.status;
                release.archive(now);
                self.ctx.releases.update(&release).await?;
                self.recorder
                    .record_release_status(&release, "release.status", previous, release.status, actor)
                    .await;
            }
        }

        // 操作后重新派生，返回最新阶段
        let release = self
            .ctx
            .releases
            .get_by_id(release_id)
            .await?
            .ok_or(OrchestratorError::ReleaseNotFound { id: release_id })?;
        let cycles = self.ctx.cycles.list_for_release(release.id).await?;
        let snapshot = cycle_snapshot(&release, &config, &cycles);
        derive_phase(&PhaseInput {
            release: &release,
            cycle: snapshot,
        })
    }

    async fn load_failed_task(
        &self,
        release: &Release,
        task_id: Option<i64>,
    ) -> OrchestratorResult<ReleaseTask> {
        let task_id = task_id.ok_or_else(|| {
            OrchestratorError::InvalidRequest("该操作必须指定任务ID".to_string())
        })?;
        let task = self
            .ctx
            .tasks
            .get_by_id(task_id)
            .await?
            .ok_or(OrchestratorError::TaskNotFound { id: task_id })?;
        if task.release_id != release.id {
            return Err(OrchestratorError::InvalidRequest(format!(
                "任务 {} 不属于发布 {}",
                task_id, release.id
            )));
        }
        if task.status != TaskStatus::Failed {
            return Err(OrchestratorError::InvalidRequest(format!(
                "任务 {} 当前状态为{:?}，只有FAILED任务可以重试或跳过",
                task_id, task.status
            )));
        }
        Ok(task)
    }

    async fn retry_task(
        &self,
        release: &mut Release,
        mut task: ReleaseTask,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        let previous = task.status;
        // 人工重试立即生效，不设退避窗口
        task.reset_for_retry(None, now);
        self.ctx.tasks.update(&task).await?;
        self.recorder
            .record_task_status(&release.tenant_id, &task, previous, task.status, actor.clone())
            .await;
        self.resume_if_unblocked(release, actor, now).await
    }

    async fn skip_task(
        &self,
        release: &mut Release,
        mut task: ReleaseTask,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        let previous = task.status;
        task.skip(now);
        self.ctx.tasks.update(&task).await?;
        self.recorder
            .record_task_status(&release.tenant_id, &task, previous, task.status, actor.clone())
            .await;
        self.resume_if_unblocked(release, actor, now).await
    }

    /// 失败任务处理完毕且没有其他失败的必选任务时恢复发布
    async fn resume_if_unblocked(
        &self,
        release: &mut Release,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        if release.cron.pause_type != PauseType::TaskFailure {
            return Ok(());
        }
        let tasks = self.ctx.tasks.list_for_release(release.id).await?;
        if crate::task_sequencer::first_failed_required(&tasks).is_some() {
            return Ok(());
        }
        let previous = release.status;
        release.resume(now);
        self.ctx.releases.update(release).await?;
        self.recorder
            .record_release_status(release, "release.status", previous, release.status, actor)
            .await;
        info!(release_id = release.id, "失败任务已处理，发布恢复运行");
        Ok(())
    }

    async fn abandon_current_cycle(
        &self,
        release: &Release,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        let cycles = self.ctx.cycles.list_for_release(release.id).await?;
        let mut cycle = cycles
            .into_iter()
            .find(|c| !c.is_terminal())
            .ok_or_else(|| {
                OrchestratorError::invalid_state("当前没有可放弃的回归测试周期")
            })?;
        let previous = cycle.status;
        cycle.abandon(now);
        self.ctx.cycles.update(&cycle).await?;
        self.recorder
            .record_cycle_status(&release.tenant_id, &cycle, previous, cycle.status, actor.clone())
            .await;

        // 被放弃周期的未结束任务一并跳过，不再阻塞阶段收口
        let tasks = self
            .ctx
            .tasks
            .list_for_stage(release.id, Stage::Regression)
            .await?;
        for mut task in tasks {
            let belongs = task.parameters.get("cycle_id").and_then(|v| v.as_i64()) == Some(cycle.id);
            if belongs && !task.is_terminal() {
                let previous = task.status;
                task.skip(now);
                self.ctx.tasks.update(&task).await?;
                self.recorder
                    .record_task_status(
                        &release.tenant_id,
                        &task,
                        previous,
                        task.status,
                        actor.clone(),
                    )
                    .await;
            }
        }

        info!(release_id = release.id, cycle_tag = %cycle.tag, "回归测试周期已放弃");
        Ok(())
    }
}
