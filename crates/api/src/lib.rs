//! # 状态回调 API
//!
//! worker pool 通过这里的 HTTP 端点把作业状态变更回传给核心。
//!
//! ## API 端点
//!
//! - `POST /service/notifications/tasks/{id}` - 任务状态与 check-in
//! - `POST /service/notifications/jobs/adminjob/{id}` - 旧版作业回调，与任务回调相同
//! - `POST /service/notifications/schedules/{id}` - 周期调度触发
//! - `POST /service/notifications/jobs/webhook/{id}` - webhook 投递状态
//! - `GET /health` - 健康检查
//!
//! 回调的消息体为 `{job_id, status, metadata: {upstream_job_id?}, check_in, revision}`。
//! 过期的回调同样返回 200，调用方无需重试。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState};

use axum::Router;
use std::sync::Arc;

use jobcore_dispatcher::HookHandler;

/// 创建带中间件的应用
pub fn create_app(hooks: Arc<HookHandler>) -> Router {
    create_routes(AppState { hooks })
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(middleware::trace_layer())
}
