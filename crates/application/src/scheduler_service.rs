//! 调度循环
//!
//! 引擎的心跳：每个tick先排期新发布，再逐个推进在途发布。对每个
//! 发布先抢占分布式锁，锁内重读状态后按当前状态推进：
//!
//! - PENDING     到达kickoff时刻则启动
//! - IN_PROGRESS 轮询回调、管理回归测试周期、派发就绪任务、收口阶段
//! - PAUSED      不推进（人工暂停、任务失败、等待阶段触发统一尊重）
//! - SUBMITTED   到达目标发布时刻后落为COMPLETED
//!
//! 任何单个发布的失败只计数，不中断整个tick。

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, error, info, instrument, warn};

use orchestrator_domain::{
    release_lock_key, Actor, MessageKind, PauseType, RegressionCycle, Release, ReleaseConfig,
    ReleaseStatus, Stage, TaskError, TaskErrorKind, TaskStatus,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

use crate::activity_log::ActivityLogRecorder;
use crate::calendar::WorkingCalendar;
use crate::context::OrchestrationContext;
use crate::release_planner::{PlanReport, ReleasePlannerService};
use crate::task_executor::{TaskExecutionService, TaskOutcome};
use crate::task_sequencer;
use crate::transitions;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// 锁的持有者标识，多实例部署时必须互不相同
    pub instance_id: String,
    pub lock_ttl: Duration,
    /// AWAITING_CALLBACK任务的最长等待时间，超时按timeout失败
    pub callback_timeout: Duration,
    pub max_transient_retries: i32,
    /// 瞬时重试的退避基数（指数退避加抖动）
    pub retry_backoff_base_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            instance_id: "scheduler-1".to_string(),
            lock_ttl: Duration::from_secs(60),
            callback_timeout: Duration::from_secs(2 * 60 * 60),
            max_transient_retries: 3,
            retry_backoff_base_secs: 30,
        }
    }
}

/// 一个tick的处理统计
#[derive(Debug, Default, Clone)]
pub struct TickReport {
    pub plan: PlanReport,
    pub releases_scanned: usize,
    pub releases_processed: usize,
    pub skipped_locked: usize,
    pub tasks_dispatched: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub cycles_started: usize,
    pub reminders_sent: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct ReleaseSchedulerService {
    ctx: OrchestrationContext,
    recorder: ActivityLogRecorder,
    executor: TaskExecutionService,
    planner: ReleasePlannerService,
    settings: SchedulerSettings,
}

impl ReleaseSchedulerService {
    pub fn new(ctx: OrchestrationContext, settings: SchedulerSettings) -> Self {
        let recorder = ActivityLogRecorder::new(ctx.activity.clone());
        let executor = TaskExecutionService::new(ctx.clone());
        let planner = ReleasePlannerService::new(
            ctx.clone(),
            recorder.clone(),
            settings.instance_id.clone(),
            settings.lock_ttl,
        );
        Self {
            ctx,
            recorder,
            executor,
            planner,
            settings,
        }
    }

    /// 执行一个完整的调度tick
    #[instrument(skip(self))]
    pub async fn run_tick(&self, now: DateTime<Utc>) -> OrchestratorResult<TickReport> {
        let mut report = TickReport {
            plan: self.planner.plan_due_releases(now).await?,
            ..Default::default()
        };

        for release in self.ctx.releases.list_in_flight().await? {
            report.releases_scanned += 1;

            let lock_key = release_lock_key(release.id);
            let acquired = self
                .ctx
                .lock
                .try_acquire(&lock_key, &self.settings.instance_id, self.settings.lock_ttl)
                .await?;
            if !acquired {
                debug!(release_id = release.id, "发布正被其他实例处理，跳过");
                report.skipped_locked += 1;
                continue;
            }

            let result = self.process_release(release.id, now, &mut report).await;
            if let Err(e) = self
                .ctx
                .lock
                .release(&lock_key, &self.settings.instance_id)
                .await
            {
                warn!(release_id = release.id, error = %e, "释放发布锁失败，等待TTL过期");
            }

            match result {
                Ok(()) => report.releases_processed += 1,
                Err(e) => {
                    report.errors += 1;
                    metrics::counter!("orchestrator_release_process_errors_total").increment(1);
                    error!(release_id = release.id, error = %e, "推进发布失败");
                }
            }
        }

        metrics::counter!("orchestrator_ticks_total").increment(1);
        metrics::gauge!("orchestrator_releases_in_flight").set(report.releases_scanned as f64);
        Ok(report)
    }

    async fn process_release(
        &self,
        release_id: i64,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> OrchestratorResult<()> {
        // 锁内重读，扫描时拿到的快照可能已过期
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

        self.send_reminder_if_due(&mut release, &config, now, report)
            .await?;

        match release.status {
            ReleaseStatus::Pending => {
                if now >= release.kickoff_at {
                    transitions::start_release(
                        &self.ctx,
                        &self.recorder,
                        &mut release,
                        &config,
                        Actor::Scheduler,
                        now,
                    )
                    .await?;
                }
            }
            ReleaseStatus::InProgress => {
                self.advance(&mut release, &config, now, report).await?;
            }
            // 暂停原因（人工、失败、等待触发）都由操作侧解除，调度循环只尊重
            ReleaseStatus::Paused => {}
            ReleaseStatus::Submitted => {
                if now >= release.target_release_at {
                    let previous = release.status;
                    release.status = ReleaseStatus::Completed;
                    release.touch(now);
                    self.ctx.releases.update(&release).await?;
                    self.recorder
                        .record_release_status(
                            &release,
                            "release.status",
                            previous,
                            release.status,
                            Actor::Scheduler,
                        )
                        .await;
                    info!(release_id = release.id, "发布到达目标时刻，已完成");
                }
            }
            ReleaseStatus::Completed | ReleaseStatus::Archived => {}
        }

        Ok(())
    }

    /// 推进一个IN_PROGRESS发布的当前阶段
    async fn advance(
        &self,
        release: &mut Release,
        config: &ReleaseConfig,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> OrchestratorResult<()> {
        let stage = release.current_stage().ok_or_else(|| {
            OrchestratorError::invalid_state(format!(
                "发布 {} 为IN_PROGRESS但没有进行中的阶段",
                release.id
            ))
        })?;

        // 1. 轮询等待回调的任务
        let tasks = self.ctx.tasks.list_for_stage(release.id, stage).await?;
        for task in tasks.into_iter().filter(|t| t.is_awaiting_callback()) {
            self.poll_awaiting_task(release, task, now, report).await?;
            if release.status != ReleaseStatus::InProgress {
                return Ok(());
            }
        }

        // 2. 回归测试阶段的周期生命周期
        if stage == Stage::Regression {
            self.advance_regression_cycles(release, config, now, report)
                .await?;
        }

        // 3. 派发就绪任务
        let tasks = self.ctx.tasks.list_for_stage(release.id, stage).await?;
        let eligible_ids: Vec<i64> = task_sequencer::eligible_tasks(&tasks, now)
            .into_iter()
            .map(|t| t.id)
            .collect();
        for task_id in eligible_ids {
            let task = tasks
                .iter()
                .find(|t| t.id == task_id)
                .cloned()
                .ok_or(OrchestratorError::TaskNotFound { id: task_id })?;
            report.tasks_dispatched += 1;
            let outcome = self.executor.execute_task(release, config, &task).await;
            self.apply_outcome(release, task, outcome, now, report)
                .await?;
            if release.status != ReleaseStatus::InProgress {
                return Ok(());
            }
        }

        // 4. 阶段收口
        let tasks = self.ctx.tasks.list_for_stage(release.id, stage).await?;
        let stage_done = match stage {
            Stage::Regression => {
                task_sequencer::is_stage_complete(&tasks)
                    && self.all_cycles_settled(release, config).await?
            }
            _ => task_sequencer::is_stage_complete(&tasks),
        };
        if stage_done {
            transitions::complete_stage(
                &self.ctx,
                &self.recorder,
                release,
                config,
                stage,
                Actor::Scheduler,
                now,
            )
            .await?;
        } else {
            self.ctx.releases.update(release).await?;
        }

        Ok(())
    }

    async fn poll_awaiting_task(
        &self,
        release: &mut Release,
        task: orchestrator_domain::ReleaseTask,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> OrchestratorResult<()> {
        // 回调超时检查先于轮询
        if let Some(dispatched_at) = task.dispatched_at {
            let waited = now.signed_duration_since(dispatched_at);
            let timeout = chrono::Duration::from_std(self.settings.callback_timeout)
                .unwrap_or_else(|_| chrono::Duration::hours(2));
            if waited > timeout {
                let error = TaskError::new(
                    TaskErrorKind::Timeout,
                    format!("等待外部回调超过 {} 秒", timeout.num_seconds()),
                );
                return self
                    .apply_outcome(release, task, TaskOutcome::Failed(error), now, report)
                    .await;
            }
        }

        let outcome = self.executor.poll_task(release, &task).await;
        if matches!(outcome, TaskOutcome::AwaitingCallback { .. }) {
            // 仍在等待，无需写库
            return Ok(());
        }
        self.apply_outcome(release, task, outcome, now, report).await
    }

    /// 把执行/轮询结果落到任务与发布上
    async fn apply_outcome(
        &self,
        release: &mut Release,
        mut task: orchestrator_domain::ReleaseTask,
        outcome: TaskOutcome,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> OrchestratorResult<()> {
        let previous = task.status;
        match outcome {
            TaskOutcome::Completed {
                external_ref,
                external_data,
            } => {
                if external_ref.is_some() {
                    task.external_ref = external_ref;
                }
                task.complete(external_data, now);
                self.ctx.tasks.update(&task).await?;
                self.recorder
                    .record_task_status(
                        &release.tenant_id,
                        &task,
                        previous,
                        task.status,
                        Actor::Scheduler,
                    )
                    .await;
                report.tasks_completed += 1;
                metrics::counter!("orchestrator_tasks_completed_total").increment(1);
                debug!(task_id = task.id, "任务完成: {}", task.entity_description());
            }
            TaskOutcome::AwaitingCallback { external_ref } => {
                task.mark_dispatched(TaskStatus::AwaitingCallback, Some(external_ref), now);
                self.ctx.tasks.update(&task).await?;
                self.recorder
                    .record_task_status(
                        &release.tenant_id,
                        &task,
                        previous,
                        task.status,
                        Actor::Scheduler,
                    )
                    .await;
            }
            TaskOutcome::Failed(error) => {
                self.handle_task_failure(release, task, error, now, report)
                    .await?;
            }
        }
        Ok(())
    }

    /// 失败处理：瞬时错误退避重试，否则落FAILED并视需要暂停发布
    async fn handle_task_failure(
        &self,
        release: &mut Release,
        mut task: orchestrator_domain::ReleaseTask,
        error: TaskError,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> OrchestratorResult<()> {
        let previous = task.status;

        if error.is_retryable() && task.retry_count < self.settings.max_transient_retries {
            let next_attempt = now + self.backoff_after(task.retry_count);
            warn!(
                task_id = task.id,
                retry_count = task.retry_count + 1,
                next_attempt = %next_attempt,
                "任务瞬时失败，安排重试: {}",
                error.message
            );
            task.reset_for_retry(Some(next_attempt), now);
            self.ctx.tasks.update(&task).await?;
            self.recorder
                .record_task_status(
                    &release.tenant_id,
                    &task,
                    previous,
                    task.status,
                    Actor::Scheduler,
                )
                .await;
            metrics::counter!("orchestrator_task_retries_total").increment(1);
            return Ok(());
        }

        error!(
            task_id = task.id,
            kind = ?error.kind,
            "任务失败: {} - {}",
            task.entity_description(),
            error.message
        );
        task.fail(error, now);
        self.ctx.tasks.update(&task).await?;
        self.recorder
            .record_task_status(
                &release.tenant_id,
                &task,
                previous,
                task.status,
                Actor::Scheduler,
            )
            .await;
        report.tasks_failed += 1;
        metrics::counter!("orchestrator_tasks_failed_total").increment(1);

        if !task.optional {
            let previous_status = release.status;
            release.pause(PauseType::TaskFailure, now)?;
            self.ctx.releases.update(release).await?;
            self.recorder
                .record_release_status(
                    release,
                    "release.status",
                    previous_status,
                    release.status,
                    Actor::Scheduler,
                )
                .await;
            warn!(release_id = release.id, "必选任务失败，发布已暂停");
        }
        Ok(())
    }

    /// 回归测试周期的生命周期：开始到期周期、结束收口周期、创建下一周期
    async fn advance_regression_cycles(
        &self,
        release: &mut Release,
        config: &ReleaseConfig,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> OrchestratorResult<()> {
        let calendar = WorkingCalendar::new(
            &config.schedule.working_days,
            config.schedule.utc_offset_minutes,
        )?;
        let kickoff_date = calendar.local_date(release.kickoff_at);
        let slots = &config.schedule.regression_slots;

        let mut cycles = self.ctx.cycles.list_for_release(release.id).await?;

        // 下一个时段到期：结束当前周期（如有），创建新周期
        if !release.skip_remaining_cycles && cycles.len() < slots.len() {
            let next_slot = &slots[cycles.len()];
            let slot_date = calendar.add_working_days(kickoff_date, next_slot.offset_days);
            let slot_time = orchestrator_domain::parse_time_of_day(&next_slot.start_time)?;
            let scheduled_at = calendar.at_time(slot_date, slot_time);

            if now >= scheduled_at {
                if let Some(current) = cycles.iter_mut().find(|c| !c.is_terminal()) {
                    self.finish_cycle(release, current, now, "cycle超期，被下一时段接管")
                        .await?;
                }
                let cycle =
                    RegressionCycle::new(release.id, cycles.len() as i32 + 1, scheduled_at);
                let created = self.ctx.cycles.create(&cycle).await?;
                self.recorder
                    .record_cycle_status(
                        &release.tenant_id,
                        &created,
                        serde_json::Value::Null,
                        created.status,
                        Actor::Scheduler,
                    )
                    .await;
                info!(
                    release_id = release.id,
                    cycle_tag = %created.tag,
                    scheduled_at = %created.scheduled_at,
                    "已创建回归测试周期"
                );
                cycles.push(created);
            }
        }

        // 推进当前未终结的周期
        if let Some(current) = cycles.iter_mut().find(|c| !c.is_terminal()) {
            match current.status {
                orchestrator_domain::RegressionCycleStatus::NotStarted => {
                    if now >= current.scheduled_at {
                        current.start(now);
                        self.ctx.cycles.update(current).await?;
                        transitions::create_cycle_tasks(&self.ctx, release, config, current)
                            .await?;
                        self.recorder
                            .record_cycle_status(
                                &release.tenant_id,
                                current,
                                orchestrator_domain::RegressionCycleStatus::NotStarted,
                                current.status,
                                Actor::Scheduler,
                            )
                            .await;
                        report.cycles_started += 1;
                        metrics::counter!("orchestrator_cycles_started_total").increment(1);
                        info!(release_id = release.id, cycle_tag = %current.tag, "回归测试周期开始");
                    }
                }
                orchestrator_domain::RegressionCycleStatus::InProgress => {
                    let tasks = self
                        .ctx
                        .tasks
                        .list_for_stage(release.id, Stage::Regression)
                        .await?;
                    let cycle_tasks: Vec<_> = tasks
                        .iter()
                        .filter(|t| {
                            t.parameters.get("cycle_id").and_then(|v| v.as_i64())
                                == Some(current.id)
                        })
                        .collect();
                    let settled = cycle_tasks
                        .iter()
                        .filter(|t| !t.optional)
                        .all(|t| t.satisfies_dependency());
                    if settled {
                        self.finish_cycle(release, current, now, "周期任务全部收口")
                            .await?;
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    async fn finish_cycle(
        &self,
        release: &Release,
        cycle: &mut RegressionCycle,
        now: DateTime<Utc>,
        reason: &str,
    ) -> OrchestratorResult<()> {
        let previous = cycle.status;
        cycle.finish(now);
        self.ctx.cycles.update(cycle).await?;
        self.recorder
            .record_cycle_status(
                &release.tenant_id,
                cycle,
                previous,
                cycle.status,
                Actor::Scheduler,
            )
            .await;
        info!(release_id = release.id, cycle_tag = %cycle.tag, "回归测试周期结束: {reason}");
        Ok(())
    }

    /// 阶段2可以收口：所有时段都已消化（或被跳过）且周期全部终结
    async fn all_cycles_settled(
        &self,
        release: &Release,
        config: &ReleaseConfig,
    ) -> OrchestratorResult<bool> {
        let cycles = self.ctx.cycles.list_for_release(release.id).await?;
        let all_terminal = cycles.iter().all(|c| c.is_terminal());
        let all_slots_consumed = release.skip_remaining_cycles
            || cycles.len() >= config.schedule.regression_slots.len();
        Ok(all_terminal && all_slots_consumed)
    }

    async fn send_reminder_if_due(
        &self,
        release: &mut Release,
        config: &ReleaseConfig,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> OrchestratorResult<()> {
        if release.reminder_sent || release.status != ReleaseStatus::Pending {
            return Ok(());
        }
        let Some(reminder_at) = release.kickoff_reminder_at else {
            return Ok(());
        };
        if now < reminder_at {
            return Ok(());
        }

        if let Some(config_ref) = &config.integrations.messaging_config {
            let params = serde_json::json!({
                "release": release.entity_description(),
                "kickoff_at": release.kickoff_at.to_rfc3339(),
            });
            match self
                .ctx
                .messaging
                .send_message(config_ref, MessageKind::KickoffReminder, &params, None)
                .await
            {
                Ok(_) => {}
                // 发送失败留到下一个tick重试，不置位
                Err(e) => {
                    warn!(release_id = release.id, error = %e, "kickoff提醒发送失败");
                    return Ok(());
                }
            }
        }

        release.reminder_sent = true;
        release.touch(now);
        self.ctx.releases.update(release).await?;
        self.recorder
            .record_release_status(
                release,
                "release.reminder",
                false,
                true,
                Actor::Scheduler,
            )
            .await;
        report.reminders_sent += 1;
        info!(release_id = release.id, "kickoff提醒已发送");
        Ok(())
    }

    fn backoff_after(&self, retry_count: i32) -> chrono::Duration {
        let base = self.settings.retry_backoff_base_secs.max(1);
        let exp = base.saturating_mul(1u64 << retry_count.clamp(0, 16) as u32);
        let jitter = rand::rng().random_range(0..=base / 2);
        chrono::Duration::seconds((exp + jitter) as i64)
    }
}
