use thiserror::Error;


#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("集成配置缺失: {integration} - {message}")]
    IntegrationNotConfigured {
        integration: String,
        message: String,
    },
    #[error("网络错误: {0}")]
    Network(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("外部系统拒绝: {0}")]
    ExternalRejection(String),
    #[error("非法状态: {0}")]
    InvalidState(String),
    #[error("发布未找到: {id}")]
    ReleaseNotFound { id: i64 },
    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },
    #[error("回归测试周期未找到: {id}")]
    RegressionCycleNotFound { id: i64 },
    #[error("发布配置未找到: {id}")]
    ReleaseConfigNotFound { id: i64 },
    #[error("操作 {action} 在当前阶段 {phase} 不可用")]
    ActionNotAllowed { action: String, phase: String },
    #[error("无效的版本号: {0}")]
    InvalidVersion(String),
    #[error("无效的请求参数: {0}")]
    InvalidRequest(String),
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("锁冲突: 发布 {release_id} 正在被 {holder} 处理")]
    LockConflict { release_id: i64, holder: String },
    #[error("存储错误: {0}")]
    Storage(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn integration_not_configured<S: Into<String>, M: Into<String>>(
        integration: S,
        message: M,
    ) -> Self {
        Self::IntegrationNotConfigured {
            integration: integration.into(),
            message: message.into(),
        }
    }
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }
    pub fn release_not_found(id: i64) -> Self {
        Self::ReleaseNotFound { id }
    }
    pub fn task_not_found(id: i64) -> Self {
        Self::TaskNotFound { id }
    }
    pub fn storage_error<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// 瞬时故障，允许调度循环进行有限次自动重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Network(_)
                | OrchestratorError::Timeout(_)
                | OrchestratorError::Storage(_)
                | OrchestratorError::LockConflict { .. }
        )
    }

    /// 致命错误，不应自动重试，必须人工介入
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Configuration(_)
                | OrchestratorError::IntegrationNotConfigured { .. }
                | OrchestratorError::InvalidState(_)
                | OrchestratorError::Internal(_)
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            OrchestratorError::ReleaseNotFound { .. } => "请求的发布不存在",
            OrchestratorError::TaskNotFound { .. } => "请求的任务不存在",
            OrchestratorError::RegressionCycleNotFound { .. } => "请求的回归测试周期不存在",
            OrchestratorError::ReleaseConfigNotFound { .. } => "请求的发布配置不存在",
            OrchestratorError::ActionNotAllowed { .. } => "当前发布阶段不允许执行此操作",
            OrchestratorError::Configuration(_)
            | OrchestratorError::IntegrationNotConfigured { .. } => {
                "发布配置有误，请检查集成配置后重试"
            }
            OrchestratorError::InvalidVersion(_) => "版本号格式有误",
            OrchestratorError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
