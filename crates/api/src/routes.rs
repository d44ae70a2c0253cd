use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use jobcore_dispatcher::HookHandler;

use crate::handlers::{
    health::health_check,
    notifications::{admin_job_hook, schedule_hook, task_hook, webhook_job_hook},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub hooks: Arc<HookHandler>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/service/notifications/tasks/{id}", post(task_hook))
        .route("/service/notifications/jobs/adminjob/{id}", post(admin_job_hook))
        .route("/service/notifications/schedules/{id}", post(schedule_hook))
        .route("/service/notifications/jobs/webhook/{id}", post(webhook_job_hook))
        .with_state(state)
}
