use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use orchestrator_api::{create_routes, AppState};
use orchestrator_application::{
    OrchestrationContext, ReleaseControlService, ReleaseSchedulerService, ReleaseStatusService,
    SchedulerSettings,
};
use orchestrator_domain::{
    BuildUploadMode, IntegrationSettings, Platform, RegressionSlot, ReleaseConfig, ReleaseLock,
    ReleaseType, ScheduleSettings, SemanticVersion, WeekDay,
};
use orchestrator_infrastructure::memory::{
    InMemoryActivityLogRepository, InMemoryRegressionCycleRepository, InMemoryReleaseConfigRepository,
    InMemoryReleaseLock, InMemoryReleaseRepository, InMemoryReleaseTaskRepository,
};
use orchestrator_infrastructure::simulation::{
    SimulatedCi, SimulatedMessaging, SimulatedScm, SimulatedTestManagement, SimulatedTicketing,
};
use orchestrator_infrastructure::{AppConfig, RedisReleaseLock};

use crate::shutdown::ShutdownSignal;

/// 应用运行模式
#[derive(Debug, Clone)]
pub enum AppMode {
    /// 仅运行调度循环
    Scheduler,
    /// 仅运行API服务器
    Api,
    /// 运行所有组件
    All,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    scheduler: ReleaseSchedulerService,
    api_state: AppState,
}

impl Application {
    /// 创建新的应用实例
    ///
    /// 当前为嵌入模式：存储走内存仓储，外部集成走模拟实现；多实例
    /// 部署时配置redis.url切到分布式锁。
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let lock: Arc<dyn ReleaseLock> = match &config.redis.url {
            Some(url) => {
                info!("使用Redis分布式锁: {}", mask_redis_url(url));
                Arc::new(
                    RedisReleaseLock::connect(url)
                        .await
                        .context("连接Redis失败")?,
                )
            }
            None => {
                info!("未配置Redis，使用进程内锁（仅单实例部署）");
                Arc::new(InMemoryReleaseLock::new())
            }
        };

        let configs = Arc::new(InMemoryReleaseConfigRepository::new());
        configs.insert(demo_release_config());
        info!("已载入演示发布配置");

        let ctx = OrchestrationContext {
            releases: Arc::new(InMemoryReleaseRepository::new()),
            tasks: Arc::new(InMemoryReleaseTaskRepository::new()),
            cycles: Arc::new(InMemoryRegressionCycleRepository::new()),
            activity: Arc::new(InMemoryActivityLogRepository::new()),
            configs,
            lock,
            scm: Arc::new(SimulatedScm),
            ci: Arc::new(SimulatedCi::new(Duration::from_secs(90))),
            test_management: Arc::new(SimulatedTestManagement::new(Duration::from_secs(300))),
            ticketing: Arc::new(SimulatedTicketing),
            messaging: Arc::new(SimulatedMessaging),
        };

        let instance_id = config
            .scheduler
            .instance_id
            .clone()
            .unwrap_or_else(default_instance_id);
        info!("调度实例标识: {instance_id}");

        let settings = SchedulerSettings {
            instance_id: instance_id.clone(),
            lock_ttl: Duration::from_secs(config.scheduler.lock_ttl_secs),
            callback_timeout: Duration::from_secs(config.scheduler.callback_timeout_secs),
            max_transient_retries: config.scheduler.max_transient_retries,
            retry_backoff_base_secs: config.scheduler.retry_backoff_base_secs,
        };

        let scheduler = ReleaseSchedulerService::new(ctx.clone(), settings);
        let api_state = AppState {
            status: ReleaseStatusService::new(ctx.clone()),
            control: ReleaseControlService::new(
                ctx,
                format!("api-{instance_id}"),
                Duration::from_secs(config.scheduler.lock_ttl_secs),
            ),
        };

        // Prometheus指标导出
        PrometheusBuilder::new()
            .install()
            .context("启动Prometheus指标导出失败")?;

        Ok(Self {
            config,
            mode,
            scheduler,
            api_state,
        })
    }

    /// 运行应用程序
    pub async fn run(&self, shutdown: ShutdownSignal) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        match self.mode {
            AppMode::Scheduler => {
                self.run_scheduler(shutdown).await?;
            }
            AppMode::Api => {
                self.run_api(shutdown).await?;
            }
            AppMode::All => {
                self.run_all_components(shutdown).await?;
            }
        }

        Ok(())
    }

    /// 运行调度循环
    async fn run_scheduler(&self, mut shutdown: ShutdownSignal) -> Result<()> {
        let tick_interval = Duration::from_secs(self.config.scheduler.tick_interval_secs);
        info!("启动调度循环，tick间隔: {}秒", tick_interval.as_secs());

        let mut interval = tokio::time::interval(tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.scheduler.run_tick(Utc::now()).await {
                        Ok(report) => {
                            debug!(
                                scanned = report.releases_scanned,
                                dispatched = report.tasks_dispatched,
                                errors = report.errors,
                                "tick完成"
                            );
                        }
                        Err(e) => {
                            error!("调度tick失败: {e}");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("调度循环收到关闭信号");
                    break;
                }
            }
        }

        info!("调度循环已停止");
        Ok(())
    }

    /// 运行API服务器，收到关闭信号后排空在途请求再退出
    async fn run_api(&self, mut shutdown: ShutdownSignal) -> Result<()> {
        let bind_address = self.config.server.bind_address();
        info!("启动API服务器: {bind_address}");

        let app = create_routes(self.api_state.clone());
        let listener = TcpListener::bind(&bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {bind_address}"))?;

        info!("API服务器启动在 http://{bind_address}");

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }

    /// 运行所有组件
    async fn run_all_components(&self, shutdown: ShutdownSignal) -> Result<()> {
        info!("启动所有组件");

        let (scheduler_result, api_result) = tokio::join!(
            self.run_scheduler(shutdown.branch()),
            self.run_api(shutdown)
        );
        scheduler_result?;
        api_result?;

        info!("所有组件已停止");
        Ok(())
    }
}

/// 调度实例缺省标识：主机名加随机后缀
fn default_instance_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "orchestrator".to_string());
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{host}-{}", &suffix[..8])
}

/// 屏蔽Redis URL中的敏感信息
fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}

/// 嵌入模式的演示配置：每周一发车的Android小版本发布
fn demo_release_config() -> ReleaseConfig {
    let now = Utc::now();
    ReleaseConfig {
        id: 1,
        tenant_id: "demo".to_string(),
        name: "demo-weekly-train".to_string(),
        platforms: vec![Platform::Android],
        release_type: ReleaseType::Minor,
        initial_version: SemanticVersion::new(1, 0, 0),
        build_upload_mode: BuildUploadMode::CiPipeline,
        schedule: ScheduleSettings {
            cadence_cron: "0 0 9 * * Mon".to_string(),
            working_days: vec![
                WeekDay::Mon,
                WeekDay::Tue,
                WeekDay::Wed,
                WeekDay::Thu,
                WeekDay::Fri,
            ],
            kickoff_time: "09:00".to_string(),
            release_time: "17:00".to_string(),
            kickoff_reminder_offset_days: 1,
            target_release_offset_days: 10,
            regression_slots: vec![
                RegressionSlot {
                    offset_days: 2,
                    start_time: "10:00".to_string(),
                },
                RegressionSlot {
                    offset_days: 5,
                    start_time: "10:00".to_string(),
                },
            ],
            utc_offset_minutes: 0,
            require_stage2_trigger: false,
            require_stage3_trigger: false,
        },
        integrations: IntegrationSettings {
            scm_repo: Some("demo/app".to_string()),
            base_branch: Some("main".to_string()),
            ci_workflow: Some("rc-build".to_string()),
            ci_release_workflow: Some("release-build".to_string()),
            test_management_config: Some("sim-test-plan".to_string()),
            ticketing_config: Some("sim-tickets".to_string()),
            messaging_config: Some("sim-chat".to_string()),
        },
        enabled: true,
        created_at: now,
        updated_at: now,
    }
}
