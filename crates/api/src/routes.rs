use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use orchestrator_application::{ReleaseControlService, ReleaseStatusService};

use crate::handlers::{
    health::health_check,
    releases::{apply_action, get_release_activity, get_release_status, list_tenant_releases},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub status: ReleaseStatusService,
    pub control: ReleaseControlService,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 发布状态与操作API
        .route("/api/releases/{id}/status", get(get_release_status))
        .route("/api/releases/{id}/activity", get(get_release_activity))
        .route("/api/releases/{id}/actions", post(apply_action))
        .route("/api/tenants/{tenant_id}/releases", get(list_tenant_releases))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
