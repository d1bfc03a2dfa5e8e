//! 发布排期器
//!
//! 扫描启用的发布配置，按发布节奏创建新的发布记录：推导版本号、
//! kickoff时刻、提醒时刻与目标发布时刻。同一配置同时只允许一个
//! 在途发布，节奏到期但上一班次未结束时跳过本次排期。

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use orchestrator_domain::{
    config_lock_key, Actor, Platform, Release, ReleaseConfig, VersionTarget,
};
use orchestrator_errors::OrchestratorResult;

use crate::activity_log::ActivityLogRecorder;
use crate::cadence::CadenceSchedule;
use crate::calendar::WorkingCalendar;
use crate::context::OrchestrationContext;
use crate::versioning::resolve_version_for_first_scheduled_release;

/// 一次排期扫描的统计
#[derive(Debug, Default, Clone)]
pub struct PlanReport {
    pub configs_scanned: usize,
    pub releases_created: usize,
    pub skipped_in_flight: usize,
    pub skipped_locked: usize,
    pub config_errors: usize,
}

enum PlanOutcome {
    Created,
    SkippedInFlight,
    SkippedLocked,
    NotDue,
}

#[derive(Clone)]
pub struct ReleasePlannerService {
    ctx: OrchestrationContext,
    recorder: ActivityLogRecorder,
    /// 排期锁的持有者标识，多实例部署时互不相同
    owner: String,
    lock_ttl: Duration,
}

impl ReleasePlannerService {
    pub fn new(
        ctx: OrchestrationContext,
        recorder: ActivityLogRecorder,
        owner: String,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            ctx,
            recorder,
            owner,
            lock_ttl,
        }
    }

    /// 扫描全部启用配置，创建节奏到期的新发布
    #[instrument(skip(self))]
    pub async fn plan_due_releases(&self, now: DateTime<Utc>) -> OrchestratorResult<PlanReport> {
        let mut report = PlanReport::default();

        for config in self.ctx.configs.list_enabled().await? {
            report.configs_scanned += 1;
            match self.plan_for_config(&config, now).await {
                Ok(PlanOutcome::Created) => report.releases_created += 1,
                Ok(PlanOutcome::SkippedInFlight) => report.skipped_in_flight += 1,
                Ok(PlanOutcome::SkippedLocked) => report.skipped_locked += 1,
                Ok(PlanOutcome::NotDue) => {}
                // 单个配置的错误不影响其他配置的排期
                Err(e) => {
                    report.config_errors += 1;
                    metrics::counter!("orchestrator_plan_config_errors_total").increment(1);
                    error!(config_id = config.id, error = %e, "发布配置无法排期");
                }
            }
        }

        if report.releases_created > 0 {
            info!(
                created = report.releases_created,
                scanned = report.configs_scanned,
                "排期扫描创建了新发布"
            );
        }
        Ok(report)
    }

    /// 配置粒度加锁后再排期，防止多实例为同一配置重复建发布
    async fn plan_for_config(
        &self,
        config: &ReleaseConfig,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<PlanOutcome> {
        config.validate()?;

        let lock_key = config_lock_key(config.id);
        let acquired = self
            .ctx
            .lock
            .try_acquire(&lock_key, &self.owner, self.lock_ttl)
            .await?;
        if !acquired {
            debug!(config_id = config.id, "配置正被其他实例排期，跳过");
            return Ok(PlanOutcome::SkippedLocked);
        }

        let outcome = self.plan_locked(config, now).await;
        if let Err(e) = self.ctx.lock.release(&lock_key, &self.owner).await {
            warn!(config_id = config.id, error = %e, "释放排期锁失败，等待TTL过期");
        }
        outcome
    }

    async fn plan_locked(
        &self,
        config: &ReleaseConfig,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<PlanOutcome> {
        let cadence = CadenceSchedule::new(&config.schedule.cadence_cron)?;

        // 锁内读取最新发布，扫描前的快照可能已经被别的实例改写
        let latest = self.ctx.releases.latest_for_config(config.id).await?;
        if let Some(latest) = &latest {
            if latest.is_in_flight() {
                warn!(
                    config_id = config.id,
                    release_id = latest.id,
                    "上一班次仍在途，跳过本次排期"
                );
                return Ok(PlanOutcome::SkippedInFlight);
            }
        }

        let last_kickoff = latest.as_ref().map(|r| r.kickoff_at);
        if !cadence.should_trigger(last_kickoff, now) {
            return Ok(PlanOutcome::NotDue);
        }

        let release = self.build_release(config, latest.as_ref(), now)?;
        let created = self.ctx.releases.create(&release).await?;

        self.recorder
            .record_release_status(
                &created,
                "release.created",
                serde_json::Value::Null,
                created.status,
                Actor::Scheduler,
            )
            .await;
        metrics::counter!("orchestrator_releases_created_total").increment(1);
        info!(
            release_id = created.id,
            config_id = config.id,
            kickoff_at = %created.kickoff_at,
            "已创建排期发布: {}",
            created.entity_description()
        );
        Ok(PlanOutcome::Created)
    }

    /// 根据配置与历史发布推导新发布的版本与日程
    fn build_release(
        &self,
        config: &ReleaseConfig,
        latest: Option<&Release>,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<Release> {
        let calendar = WorkingCalendar::new(
            &config.schedule.working_days,
            config.schedule.utc_offset_minutes,
        )?;
        let kickoff_time = orchestrator_domain::parse_time_of_day(&config.schedule.kickoff_time)?;
        let release_time = orchestrator_domain::parse_time_of_day(&config.schedule.release_time)?;

        // kickoff日 = 节奏候选日吸附到最近的工作日
        let kickoff_date = calendar.add_working_days(calendar.local_date(now), 0);
        let kickoff_at = calendar.at_time(kickoff_date, kickoff_time);

        let reminder_at = match config.schedule.kickoff_reminder_offset_days {
            0 => None,
            offset => {
                let reminder_date = calendar.subtract_working_days(kickoff_date, offset);
                Some(calendar.at_time(reminder_date, kickoff_time))
            }
        };

        let target_date =
            calendar.add_working_days(kickoff_date, config.schedule.target_release_offset_days);
        let target_release_at = calendar.at_time(target_date, release_time);

        let version_targets = config
            .platforms
            .iter()
            .map(|platform| {
                let latest_version = latest.and_then(|r| {
                    r.version_targets
                        .iter()
                        .find(|t| t.platform == *platform)
                        .map(|t| t.version.clone())
                });
                VersionTarget {
                    platform: *platform,
                    target: default_target(*platform).to_string(),
                    version: resolve_version_for_first_scheduled_release(
                        config.initial_version.clone(),
                        latest_version,
                        config.release_type,
                    ),
                }
            })
            .collect();

        Ok(Release::new(
            config.tenant_id.clone(),
            config.id,
            version_targets,
            kickoff_at,
            reminder_at,
            target_release_at,
        ))
    }
}

fn default_target(platform: Platform) -> &'static str {
    match platform {
        Platform::Android => "play-store",
        Platform::Ios => "app-store",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use orchestrator_domain::ReleaseStatus;
    use orchestrator_infrastructure::memory::{
        InMemoryActivityLogRepository, InMemoryRegressionCycleRepository, InMemoryReleaseConfigRepository,
        InMemoryReleaseLock, InMemoryReleaseRepository, InMemoryReleaseTaskRepository,
    };
    use orchestrator_testing_utils::builders::ReleaseConfigBuilder;
    use orchestrator_testing_utils::mocks::{
        MockCiService, MockMessagingService, MockScmService, MockTestManagementService,
        MockTicketingService,
    };

    fn planner() -> (
        ReleasePlannerService,
        OrchestrationContext,
        Arc<InMemoryReleaseConfigRepository>,
    ) {
        let configs = Arc::new(InMemoryReleaseConfigRepository::new());
        let ctx = OrchestrationContext {
            releases: Arc::new(InMemoryReleaseRepository::new()),
            tasks: Arc::new(InMemoryReleaseTaskRepository::new()),
            cycles: Arc::new(InMemoryRegressionCycleRepository::new()),
            activity: Arc::new(InMemoryActivityLogRepository::new()),
            configs: configs.clone(),
            lock: Arc::new(InMemoryReleaseLock::new()),
            scm: Arc::new(MockScmService::new()),
            ci: Arc::new(MockCiService::new()),
            test_management: Arc::new(MockTestManagementService::new()),
            ticketing: Arc::new(MockTicketingService::new()),
            messaging: Arc::new(MockMessagingService::new()),
        };
        let recorder = ActivityLogRecorder::new(ctx.activity.clone());
        let planner = ReleasePlannerService::new(
            ctx.clone(),
            recorder,
            "planner-test".to_string(),
            Duration::from_secs(30),
        );
        (planner, ctx, configs)
    }

    // 2026-08-24 是周一
    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 24, 9, 30, 0).single().unwrap()
    }

    #[tokio::test]
    async fn test_first_release_uses_initial_version() {
        let (planner, ctx, configs) = planner();
        configs.insert(ReleaseConfigBuilder::new().build());

        let report = planner.plan_due_releases(monday_morning()).await.unwrap();
        assert_eq!(report.releases_created, 1);

        let releases = ctx.releases.list_in_flight().await.unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].version_targets[0].version.to_string(), "1.0.0");
        assert_eq!(releases[0].status, ReleaseStatus::Pending);
    }

    #[tokio::test]
    async fn test_in_flight_release_blocks_new_plan() {
        let (planner, ctx, configs) = planner();
        configs.insert(ReleaseConfigBuilder::new().build());

        planner.plan_due_releases(monday_morning()).await.unwrap();
        let report = planner.plan_due_releases(monday_morning()).await.unwrap();
        assert_eq!(report.releases_created, 0);
        assert_eq!(report.skipped_in_flight, 1);
        assert_eq!(ctx.releases.list_in_flight().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_next_train_bumps_previous_version() {
        let (planner, ctx, configs) = planner();
        configs.insert(ReleaseConfigBuilder::new().build());

        planner.plan_due_releases(monday_morning()).await.unwrap();
        let mut first = ctx.releases.list_in_flight().await.unwrap().remove(0);
        first.version_targets[0].version = "1.2.0".parse().unwrap();
        first.status = ReleaseStatus::Archived;
        ctx.releases.update(&first).await.unwrap();

        // 下一个周一
        let next_week = Utc.with_ymd_and_hms(2026, 8, 31, 9, 30, 0).single().unwrap();
        let report = planner.plan_due_releases(next_week).await.unwrap();
        assert_eq!(report.releases_created, 1);

        let releases = ctx.releases.list_in_flight().await.unwrap();
        assert_eq!(releases[0].version_targets[0].version.to_string(), "1.3.0");
    }

    #[tokio::test]
    async fn test_schedule_dates_follow_working_calendar() {
        let (planner, ctx, configs) = planner();
        // 提前1个工作日提醒，kickoff后10个工作日发布
        configs.insert(ReleaseConfigBuilder::new().build());

        planner.plan_due_releases(monday_morning()).await.unwrap();
        let release = ctx.releases.list_in_flight().await.unwrap().remove(0);

        assert_eq!(release.kickoff_at.to_rfc3339(), "2026-08-24T09:00:00+00:00");
        // 周一往前1个工作日是上周五
        assert_eq!(
            release.kickoff_reminder_at.unwrap().to_rfc3339(),
            "2026-08-21T09:00:00+00:00"
        );
        // 10个工作日后是9月7日周一
        assert_eq!(
            release.target_release_at.to_rfc3339(),
            "2026-09-07T17:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_config_locked_by_peer_skips_planning() {
        let (planner, ctx, configs) = planner();
        let config = ReleaseConfigBuilder::new().build();
        let lock_key = config_lock_key(config.id);
        configs.insert(config);

        // 另一个调度实例正持有该配置的排期锁
        assert!(ctx
            .lock
            .try_acquire(&lock_key, "peer-instance", Duration::from_secs(300))
            .await
            .unwrap());

        let report = planner.plan_due_releases(monday_morning()).await.unwrap();
        assert_eq!(report.releases_created, 0);
        assert_eq!(report.skipped_locked, 1);
        assert!(ctx.releases.list_in_flight().await.unwrap().is_empty());

        // 对端释放后下一轮扫描才建发布，且只建一个
        ctx.lock.release(&lock_key, "peer-instance").await.unwrap();
        let report = planner.plan_due_releases(monday_morning()).await.unwrap();
        assert_eq!(report.releases_created, 1);
        assert_eq!(ctx.releases.list_in_flight().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_does_not_abort_scan() {
        let (planner, _ctx, configs) = planner();
        let mut bad = ReleaseConfigBuilder::new().build();
        bad.schedule.working_days.clear();
        configs.insert(bad);
        configs.insert(ReleaseConfigBuilder::new().with_id(2).build());

        let report = planner.plan_due_releases(monday_morning()).await.unwrap();
        assert_eq!(report.config_errors, 1);
        assert_eq!(report.releases_created, 1);
    }
}
