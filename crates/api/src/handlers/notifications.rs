use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

use jobcore_core::models::StatusChange;

use crate::{error::ApiResult, routes::AppState};

/// 任务状态回调
pub async fn task_hook(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(change): Json<StatusChange>,
) -> ApiResult<StatusCode> {
    debug!("任务 {} 回调: {} rev={}", id, change.status, change.revision);
    state.hooks.handle_task_hook(id, &change).await?;
    Ok(StatusCode::OK)
}

pub async fn admin_job_hook(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(change): Json<StatusChange>,
) -> ApiResult<StatusCode> {
    state.hooks.handle_admin_job_hook(id, &change).await?;
    Ok(StatusCode::OK)
}

/// 周期调度回调
pub async fn schedule_hook(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(change): Json<StatusChange>,
) -> ApiResult<StatusCode> {
    debug!("调度 {} 回调: {} rev={}", id, change.status, change.revision);
    state.hooks.handle_schedule_hook(id, &change).await?;
    Ok(StatusCode::OK)
}

pub async fn webhook_job_hook(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(change): Json<StatusChange>,
) -> ApiResult<StatusCode> {
    state.hooks.handle_webhook_hook(id, &change).await?;
    Ok(StatusCode::OK)
}
