use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use orchestrator_errors::OrchestratorError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("编排器错误: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type) = match &self {
            ApiError::Orchestrator(e) => match e {
                OrchestratorError::ReleaseNotFound { id } => (
                    StatusCode::NOT_FOUND,
                    format!("发布 {} 不存在", id),
                    "RELEASE_NOT_FOUND",
                ),
                OrchestratorError::TaskNotFound { id } => (
                    StatusCode::NOT_FOUND,
                    format!("任务 {} 不存在", id),
                    "TASK_NOT_FOUND",
                ),
                OrchestratorError::RegressionCycleNotFound { id } => (
                    StatusCode::NOT_FOUND,
                    format!("回归测试周期 {} 不存在", id),
                    "CYCLE_NOT_FOUND",
                ),
                OrchestratorError::ReleaseConfigNotFound { id } => (
                    StatusCode::NOT_FOUND,
                    format!("发布配置 {} 不存在", id),
                    "CONFIG_NOT_FOUND",
                ),
                OrchestratorError::ActionNotAllowed { action, phase } => (
                    StatusCode::CONFLICT,
                    format!("当前阶段 {} 不允许操作 {}", phase, action),
                    "ACTION_NOT_ALLOWED",
                ),
                OrchestratorError::LockConflict { release_id, .. } => (
                    StatusCode::CONFLICT,
                    format!("发布 {} 正在被处理，请稍后重试", release_id),
                    "LOCK_CONFLICT",
                ),
                OrchestratorError::InvalidRequest(msg) => {
                    (StatusCode::BAD_REQUEST, msg.clone(), "INVALID_REQUEST")
                }
                OrchestratorError::InvalidVersion(msg) => (
                    StatusCode::BAD_REQUEST,
                    format!("版本号无效: {}", msg),
                    "INVALID_VERSION",
                ),
                OrchestratorError::InvalidCron { expr, message } => (
                    StatusCode::BAD_REQUEST,
                    format!("Cron表达式 '{}' 无效: {}", expr, message),
                    "INVALID_CRON_EXPRESSION",
                ),
                OrchestratorError::Configuration(_)
                | OrchestratorError::IntegrationNotConfigured { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    e.user_message().to_string(),
                    "CONFIGURATION_ERROR",
                ),
                OrchestratorError::InvalidState(_) => (
                    StatusCode::CONFLICT,
                    e.user_message().to_string(),
                    "INVALID_STATE",
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "系统内部错误，请稍后重试".to_string(),
                    "INTERNAL_ERROR",
                ),
            },
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone(), "BAD_REQUEST")
            }
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::Orchestrator(OrchestratorError::ReleaseNotFound { id: 1 }),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Orchestrator(OrchestratorError::ActionNotAllowed {
                    action: "START".into(),
                    phase: "COMPLETED".into(),
                }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Orchestrator(OrchestratorError::InvalidRequest("缺参数".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Orchestrator(OrchestratorError::Storage("db down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
