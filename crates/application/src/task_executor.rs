//! 任务执行器
//!
//! 把单个编排任务翻译成对外部集成端口的调用，并把结果归一化为
//! [`TaskOutcome`]。执行器本身不写库：状态落盘由调度循环统一处理，
//! 保证"先记外部引用、再派发"的顺序由调用方控制。
//!
//! 错误分类规则：
//! - 集成未配置、参数缺失        → `configuration`（不重试）
//! - 网络/超时/存储抖动          → `transient`（指数退避重试）
//! - 外部系统明确拒绝            → `rejected`（不重试）

use tracing::{debug, instrument};

use orchestrator_domain::{
    ExternalJobStatus, MessageKind, Platform, Release, ReleaseConfig, ReleaseTask, SemanticVersion,
    TaskError, TaskErrorKind, TaskType,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

use crate::context::OrchestrationContext;

/// 一次执行或轮询的归一化结果
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// 同步完成
    Completed {
        external_ref: Option<String>,
        external_data: serde_json::Value,
    },
    /// 已派发，等待外部系统结束后由轮询收口
    AwaitingCallback { external_ref: String },
    /// 执行失败，携带分类后的错误
    Failed(TaskError),
}

#[derive(Clone)]
pub struct TaskExecutionService {
    ctx: OrchestrationContext,
}

impl TaskExecutionService {
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self { ctx }
    }

    /// 首次派发一个PENDING任务
    #[instrument(skip(self, release, config, task), fields(task_id = task.id, task_type = %task.task_type))]
    pub async fn execute_task(
        &self,
        release: &Release,
        config: &ReleaseConfig,
        task: &ReleaseTask,
    ) -> TaskOutcome {
        let result = match task.task_type {
            TaskType::ForkBranch => self.fork_branch(release, config).await,
            TaskType::TriggerBuild => self.trigger_build(release, task).await,
            TaskType::CreateTestRuns => self.create_test_runs(release, config, task).await,
            TaskType::CreateTickets => self.create_tickets(release, config, task).await,
            TaskType::NotifyChannel => self.notify_channel(config, task).await,
            TaskType::CreateReleaseTag => self.create_release_tag(release, config).await,
        };
        match result {
            Ok(outcome) => outcome,
            Err(e) => TaskOutcome::Failed(classify_error(&e)),
        }
    }

    /// 轮询一个AWAITING_CALLBACK任务的外部状态
    #[instrument(skip(self, release, task), fields(task_id = task.id, task_type = %task.task_type))]
    pub async fn poll_task(&self, release: &Release, task: &ReleaseTask) -> TaskOutcome {
        let external_ref = match &task.external_ref {
            Some(r) => r.clone(),
            None => {
                return TaskOutcome::Failed(TaskError::new(
                    TaskErrorKind::Rejected,
                    "任务处于等待回调状态但没有外部引用",
                ))
            }
        };

        let status = match task.task_type {
            TaskType::TriggerBuild => {
                self.ctx
                    .ci
                    .get_run_status(&release.tenant_id, &external_ref)
                    .await
            }
            TaskType::CreateTestRuns => {
                self.ctx
                    .test_management
                    .get_test_run_status(&release.tenant_id, &external_ref)
                    .await
            }
            other => Err(OrchestratorError::invalid_state(format!(
                "任务类型 {other} 不支持轮询"
            ))),
        };

        match status {
            Ok(ExternalJobStatus::Completed) => TaskOutcome::Completed {
                external_ref: Some(external_ref),
                external_data: serde_json::json!({ "status": "COMPLETED" }),
            },
            Ok(ExternalJobStatus::Failed) => TaskOutcome::Failed(TaskError::new(
                TaskErrorKind::Rejected,
                format!("外部作业 {external_ref} 执行失败"),
            )),
            Ok(ExternalJobStatus::Cancelled) => TaskOutcome::Failed(TaskError::new(
                TaskErrorKind::Rejected,
                format!("外部作业 {external_ref} 已被取消"),
            )),
            Ok(ExternalJobStatus::Pending) | Ok(ExternalJobStatus::Running) => {
                debug!(external_ref = %external_ref, "外部作业尚未结束");
                TaskOutcome::AwaitingCallback { external_ref }
            }
            Err(e) => TaskOutcome::Failed(classify_error(&e)),
        }
    }

    async fn fork_branch(
        &self,
        release: &Release,
        config: &ReleaseConfig,
    ) -> OrchestratorResult<TaskOutcome> {
        let repo = require_integration(&config.integrations.scm_repo, "SCM仓库")?;
        let base = require_integration(&config.integrations.base_branch, "SCM基础分支")?;
        let version = primary_version(release)?;
        let branch = release_branch_name(version);

        let branch_ref = self
            .ctx
            .scm
            .fork_branch(&release.tenant_id, repo, base, &branch)
            .await?;
        Ok(TaskOutcome::Completed {
            external_ref: Some(branch_ref),
            external_data: serde_json::json!({ "branch": branch }),
        })
    }

    async fn trigger_build(
        &self,
        release: &Release,
        task: &ReleaseTask,
    ) -> OrchestratorResult<TaskOutcome> {
        let workflow = task
            .parameters
            .get("workflow")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                OrchestratorError::integration_not_configured("ci", "任务参数缺少workflow")
            })?;

        let run_id = self
            .ctx
            .ci
            .trigger(&release.tenant_id, workflow, &task.parameters)
            .await?;
        Ok(TaskOutcome::AwaitingCallback {
            external_ref: run_id,
        })
    }

    async fn create_test_runs(
        &self,
        release: &Release,
        config: &ReleaseConfig,
        task: &ReleaseTask,
    ) -> OrchestratorResult<TaskOutcome> {
        let config_ref =
            require_integration(&config.integrations.test_management_config, "测试管理")?;
        let cycle_tag = task
            .parameters
            .get("cycle_tag")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                OrchestratorError::integration_not_configured(
                    "test_management",
                    "任务参数缺少cycle_tag",
                )
            })?;

        let batch_ref = self
            .ctx
            .test_management
            .create_test_runs(&release.tenant_id, config_ref, cycle_tag, &task.parameters)
            .await?;
        Ok(TaskOutcome::AwaitingCallback {
            external_ref: batch_ref,
        })
    }

    async fn create_tickets(
        &self,
        release: &Release,
        config: &ReleaseConfig,
        task: &ReleaseTask,
    ) -> OrchestratorResult<TaskOutcome> {
        let config_ref = require_integration(&config.integrations.ticketing_config, "工单系统")?;

        let batch_ref = self
            .ctx
            .ticketing
            .create_tickets(&release.tenant_id, config_ref, &task.parameters)
            .await?;
        Ok(TaskOutcome::Completed {
            external_ref: Some(batch_ref),
            external_data: serde_json::Value::Null,
        })
    }

    async fn notify_channel(
        &self,
        config: &ReleaseConfig,
        task: &ReleaseTask,
    ) -> OrchestratorResult<TaskOutcome> {
        let config_ref = require_integration(&config.integrations.messaging_config, "消息通知")?;
        let kind: MessageKind = task
            .parameters
            .get("message_kind")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| {
                OrchestratorError::integration_not_configured(
                    "messaging",
                    "任务参数缺少message_kind",
                )
            })?;
        let platform: Option<Platform> = task
            .parameters
            .get("platform")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());

        let deliveries = self
            .ctx
            .messaging
            .send_message(config_ref, kind, &task.parameters, platform)
            .await?;

        // 只要有一个频道投递成功就算完成；全部失败按瞬时错误重试
        let any_delivered = deliveries.iter().any(|d| d.delivered);
        if deliveries.is_empty() || any_delivered {
            Ok(TaskOutcome::Completed {
                external_ref: None,
                external_data: serde_json::to_value(&deliveries)
                    .unwrap_or(serde_json::Value::Null),
            })
        } else {
            Ok(TaskOutcome::Failed(TaskError::new(
                TaskErrorKind::Transient,
                "所有消息频道投递失败",
            )))
        }
    }

    async fn create_release_tag(
        &self,
        release: &Release,
        config: &ReleaseConfig,
    ) -> OrchestratorResult<TaskOutcome> {
        let repo = require_integration(&config.integrations.scm_repo, "SCM仓库")?;
        let version = primary_version(release)?;
        let branch = release_branch_name(version);
        let tag = format!("v{version}");

        let tag_ref = self
            .ctx
            .scm
            .create_release_tag(&release.tenant_id, repo, &branch, &tag)
            .await?;
        Ok(TaskOutcome::Completed {
            external_ref: Some(tag_ref),
            external_data: serde_json::json!({ "tag": tag }),
        })
    }
}

fn require_integration<'a>(
    value: &'a Option<String>,
    name: &str,
) -> OrchestratorResult<&'a str> {
    value.as_deref().ok_or_else(|| {
        OrchestratorError::integration_not_configured(name, format!("{name}未配置"))
    })
}

fn primary_version(release: &Release) -> OrchestratorResult<&SemanticVersion> {
    release
        .version_targets
        .first()
        .map(|t| &t.version)
        .ok_or_else(|| {
            OrchestratorError::invalid_state(format!("发布 {} 没有任何目标版本", release.id))
        })
}

fn release_branch_name(version: &SemanticVersion) -> String {
    format!("release/{version}")
}

/// 把编排错误映射为任务错误分类
pub fn classify_error(error: &OrchestratorError) -> TaskError {
    let kind = match error {
        OrchestratorError::Timeout(_) => TaskErrorKind::Timeout,
        OrchestratorError::Configuration(_) | OrchestratorError::IntegrationNotConfigured { .. } => {
            TaskErrorKind::Configuration
        }
        OrchestratorError::ExternalRejection(_) => TaskErrorKind::Rejected,
        e if e.is_retryable() => TaskErrorKind::Transient,
        _ => TaskErrorKind::Rejected,
    };
    TaskError::new(kind, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use orchestrator_domain::{Stage, TaskStatus, VersionTarget};
    use orchestrator_infrastructure::memory::{
        InMemoryActivityLogRepository, InMemoryRegressionCycleRepository, InMemoryReleaseConfigRepository,
        InMemoryReleaseLock, InMemoryReleaseRepository, InMemoryReleaseTaskRepository,
    };
    use orchestrator_testing_utils::builders::{ReleaseBuilder, ReleaseConfigBuilder};
    use orchestrator_testing_utils::mocks::{
        MockCiService, MockMessagingService, MockScmService, MockTestManagementService,
        MockTicketingService,
    };

    struct Harness {
        ctx: OrchestrationContext,
        ci: Arc<MockCiService>,
        messaging: Arc<MockMessagingService>,
    }

    fn harness() -> Harness {
        let ci = Arc::new(MockCiService::new());
        let messaging = Arc::new(MockMessagingService::new());
        let ctx = OrchestrationContext {
            releases: Arc::new(InMemoryReleaseRepository::new()),
            tasks: Arc::new(InMemoryReleaseTaskRepository::new()),
            cycles: Arc::new(InMemoryRegressionCycleRepository::new()),
            activity: Arc::new(InMemoryActivityLogRepository::new()),
            configs: Arc::new(InMemoryReleaseConfigRepository::new()),
            lock: Arc::new(InMemoryReleaseLock::new()),
            scm: Arc::new(MockScmService::new()),
            ci: ci.clone(),
            test_management: Arc::new(MockTestManagementService::new()),
            ticketing: Arc::new(MockTicketingService::new()),
            messaging: messaging.clone(),
        };
        Harness { ctx, ci, messaging }
    }

    fn service() -> (TaskExecutionService, Harness) {
        let h = harness();
        (TaskExecutionService::new(h.ctx.clone()), h)
    }

    fn task(task_type: TaskType, parameters: serde_json::Value) -> ReleaseTask {
        let mut t = ReleaseTask::new(
            1,
            Stage::Kickoff,
            task_type,
            "t".to_string(),
            1,
            vec![],
            false,
            parameters,
        );
        t.id = 1;
        t
    }

    #[tokio::test]
    async fn test_fork_branch_completes_with_branch_ref() {
        let (service, _h) = service();
        let release = ReleaseBuilder::new().with_version("1.2.0").build();
        let config = ReleaseConfigBuilder::new().build();

        let outcome = service
            .execute_task(&release, &config, &task(TaskType::ForkBranch, serde_json::json!({})))
            .await;
        match outcome {
            TaskOutcome::Completed { external_ref, external_data } => {
                assert_eq!(external_ref.as_deref(), Some("refs/heads/release/1.2.0"));
                assert_eq!(external_data["branch"], "release/1.2.0");
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fork_branch_without_scm_is_configuration_error() {
        let (service, _h) = service();
        let release = ReleaseBuilder::new().build();
        let config = ReleaseConfigBuilder::new().without_scm().build();

        let outcome = service
            .execute_task(&release, &config, &task(TaskType::ForkBranch, serde_json::json!({})))
            .await;
        match outcome {
            TaskOutcome::Failed(error) => assert_eq!(error.kind, TaskErrorKind::Configuration),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trigger_build_awaits_callback() {
        let (service, _h) = service();
        let release = ReleaseBuilder::new().build();
        let config = ReleaseConfigBuilder::new().build();

        let outcome = service
            .execute_task(
                &release,
                &config,
                &task(TaskType::TriggerBuild, serde_json::json!({"workflow": "rc-build"})),
            )
            .await;
        assert!(matches!(outcome, TaskOutcome::AwaitingCallback { .. }));
    }

    #[tokio::test]
    async fn test_poll_build_maps_external_status() {
        let (service, h) = service();
        let release = ReleaseBuilder::new().build();
        let config = ReleaseConfigBuilder::new().build();

        let mut t = task(TaskType::TriggerBuild, serde_json::json!({"workflow": "rc-build"}));
        let outcome = service.execute_task(&release, &config, &t).await;
        let run_id = match outcome {
            TaskOutcome::AwaitingCallback { external_ref } => external_ref,
            other => panic!("expected AwaitingCallback, got {other:?}"),
        };
        t.mark_dispatched(TaskStatus::AwaitingCallback, Some(run_id.clone()), Utc::now());

        // 仍在运行
        assert!(matches!(
            service.poll_task(&release, &t).await,
            TaskOutcome::AwaitingCallback { .. }
        ));

        // 外部完成
        h.ci.set_run_status(&run_id, ExternalJobStatus::Completed);
        assert!(matches!(
            service.poll_task(&release, &t).await,
            TaskOutcome::Completed { .. }
        ));

        // 外部失败
        h.ci.set_run_status(&run_id, ExternalJobStatus::Failed);
        match service.poll_task(&release, &t).await {
            TaskOutcome::Failed(error) => assert_eq!(error.kind, TaskErrorKind::Rejected),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_notify_channel_all_failures_are_transient() {
        let (service, h) = service();
        h.messaging.fail_all_channels();

        let release = ReleaseBuilder::new().build();
        let config = ReleaseConfigBuilder::new().build();
        let outcome = service
            .execute_task(
                &release,
                &config,
                &task(
                    TaskType::NotifyChannel,
                    serde_json::json!({"message_kind": "KICKOFF_STARTED"}),
                ),
            )
            .await;
        match outcome {
            TaskOutcome::Failed(error) => assert_eq!(error.kind, TaskErrorKind::Transient),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_release_tag_uses_primary_version() {
        let (service, _h) = service();
        let release = ReleaseBuilder::new().with_version("2.0.0").build();
        let config = ReleaseConfigBuilder::new().build();

        let outcome = service
            .execute_task(&release, &config, &task(TaskType::CreateReleaseTag, serde_json::json!({})))
            .await;
        match outcome {
            TaskOutcome::Completed { external_ref, external_data } => {
                assert_eq!(external_ref.as_deref(), Some("refs/tags/v2.0.0"));
                assert_eq!(external_data["tag"], "v2.0.0");
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_error_taxonomy() {
        assert_eq!(
            classify_error(&OrchestratorError::Network("conn reset".into())).kind,
            TaskErrorKind::Transient
        );
        assert_eq!(
            classify_error(&OrchestratorError::Timeout("deadline".into())).kind,
            TaskErrorKind::Timeout
        );
        assert_eq!(
            classify_error(&OrchestratorError::ExternalRejection("403".into())).kind,
            TaskErrorKind::Rejected
        );
        assert_eq!(
            classify_error(&OrchestratorError::integration_not_configured("ci", "缺少配置")).kind,
            TaskErrorKind::Configuration
        );
    }

    #[test]
    fn test_release_without_version_targets_is_invalid() {
        let mut release = ReleaseBuilder::new().build();
        release.version_targets = vec![];
        assert!(primary_version(&release).is_err());

        release.version_targets = vec![VersionTarget {
            platform: orchestrator_domain::Platform::Ios,
            target: "app-store".to_string(),
            version: "3.1.0".parse().unwrap(),
        }];
        assert_eq!(primary_version(&release).unwrap().to_string(), "3.1.0");
    }
}
