//! 外部集成端口
//!
//! SCM/CI/测试管理/工单/消息的抽象边界。
//! 具体的厂商客户端（GitHub、Jenkins、Jira、Slack等）不在本仓库范围内，
//! 由宿主环境注入实现；嵌入模式使用 infrastructure 的模拟实现。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use orchestrator_errors::OrchestratorResult;

use crate::value_objects::Platform;

/// 外部异步作业的状态（CI构建、测试批次、工单批次共用）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExternalJobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl ExternalJobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ExternalJobStatus::Completed | ExternalJobStatus::Failed | ExternalJobStatus::Cancelled
        )
    }
}

/// 代码托管服务
#[async_trait]
pub trait ScmService: Send + Sync {
    /// 从基础分支切出发布分支，返回分支引用
    async fn fork_branch(
        &self,
        tenant_id: &str,
        repo: &str,
        base_branch: &str,
        release_branch: &str,
    ) -> OrchestratorResult<String>;

    /// 在发布分支上打tag，返回tag引用
    async fn create_release_tag(
        &self,
        tenant_id: &str,
        repo: &str,
        branch: &str,
        tag: &str,
    ) -> OrchestratorResult<String>;
}

/// CI/CD服务
#[async_trait]
pub trait CiService: Send + Sync {
    /// 触发工作流，返回run id
    async fn trigger(
        &self,
        tenant_id: &str,
        workflow_ref: &str,
        params: &serde_json::Value,
    ) -> OrchestratorResult<String>;

    async fn get_run_status(
        &self,
        tenant_id: &str,
        run_id: &str,
    ) -> OrchestratorResult<ExternalJobStatus>;
}

/// 测试管理服务
#[async_trait]
pub trait TestManagementService: Send + Sync {
    /// 为一个回归测试周期创建测试批次，返回批次引用
    async fn create_test_runs(
        &self,
        tenant_id: &str,
        config_ref: &str,
        cycle_tag: &str,
        params: &serde_json::Value,
    ) -> OrchestratorResult<String>;

    async fn get_test_run_status(
        &self,
        tenant_id: &str,
        run_ref: &str,
    ) -> OrchestratorResult<ExternalJobStatus>;
}

/// 工单服务
///
/// 工单批次创建后即视为完成，编排侧不回查批次状态。
#[async_trait]
pub trait TicketingService: Send + Sync {
    /// 创建发布相关工单批次，返回批次引用
    async fn create_tickets(
        &self,
        tenant_id: &str,
        config_ref: &str,
        params: &serde_json::Value,
    ) -> OrchestratorResult<String>;
}

/// 消息通知的业务类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageKind {
    #[serde(rename = "KICKOFF_REMINDER")]
    KickoffReminder,
    #[serde(rename = "KICKOFF_STARTED")]
    KickoffStarted,
    #[serde(rename = "REGRESSION_CYCLE_STARTED")]
    RegressionCycleStarted,
    #[serde(rename = "RELEASE_SUBMITTED")]
    ReleaseSubmitted,
}

/// 单个频道的投递结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub channel: String,
    pub delivered: bool,
    pub error: Option<String>,
}

/// 消息服务
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// 发送消息，返回逐频道的投递结果
    async fn send_message(
        &self,
        config_ref: &str,
        kind: MessageKind,
        params: &serde_json::Value,
        platform: Option<Platform>,
    ) -> OrchestratorResult<Vec<DeliveryResult>>;
}
