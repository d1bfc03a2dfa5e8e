//! 发布状态查询与人工操作

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use orchestrator_application::ActionRequest;
use orchestrator_domain::{Actor, Phase, ReleaseAction};

use crate::error::ApiResult;
use crate::response::success;
use crate::routes::AppState;

/// 人工操作请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBody {
    pub action: ReleaseAction,
    pub task_id: Option<i64>,
    /// 发起用户标识，缺省记为 "api"
    pub actor: Option<String>,
}

/// 操作结果：操作后的最新阶段
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub phase: Phase,
    pub phase_display: String,
    pub available_actions: Vec<ReleaseAction>,
}

pub async fn get_release_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let view = state.status.get_status(id).await?;
    Ok(success(view))
}

pub async fn get_release_activity(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let entries = state.status.activity_history(id).await?;
    Ok(success(entries))
}

pub async fn list_tenant_releases(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let views = state.status.list_for_tenant(&tenant_id).await?;
    Ok(success(views))
}

pub async fn apply_action(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ActionBody>,
) -> ApiResult<impl IntoResponse> {
    let actor = Actor::User(body.actor.unwrap_or_else(|| "api".to_string()));
    info!(release_id = id, action = %body.action, "收到人工操作请求");

    let resolution = state
        .control
        .apply(
            id,
            ActionRequest {
                action: body.action,
                task_id: body.task_id,
                actor,
            },
        )
        .await?;

    Ok(success(ActionResult {
        phase: resolution.phase,
        phase_display: resolution.display_text,
        available_actions: resolution.actions,
    }))
}
