//! Test helper utilities
//!
//! A migrated in-memory SQLite database with every store wired up, and a
//! polling helper for asynchronous assertions.

use jobcore_core::traits::{ExecutionRepository, ScheduleRepository, TaskRepository};
use jobcore_domain::repositories::{
    ImmutableRuleRepository, RetentionPolicyRepository, WebhookJobRepository,
    WebhookPolicyRepository,
};
use jobcore_infrastructure::database::{
    DatabaseManager, SqliteExecutionRepository, SqliteImmutableRuleRepository,
    SqliteRetentionPolicyRepository, SqliteScheduleRepository, SqliteTaskRepository,
    SqliteWebhookJobRepository, SqliteWebhookPolicyRepository,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Migrated in-memory database with all stores
pub struct TestDatabase {
    pub pool: SqlitePool,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub immutable_rules: Arc<dyn ImmutableRuleRepository>,
    pub retention_policies: Arc<dyn RetentionPolicyRepository>,
    pub webhook_policies: Arc<dyn WebhookPolicyRepository>,
    pub webhook_jobs: Arc<dyn WebhookJobRepository>,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let manager = DatabaseManager::in_memory()
            .await
            .expect("create in-memory database");
        manager.migrate().await.expect("run migrations");
        let pool = manager.pool().clone();
        Self {
            schedules: Arc::new(SqliteScheduleRepository::new(pool.clone())),
            executions: Arc::new(SqliteExecutionRepository::new(pool.clone())),
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
            immutable_rules: Arc::new(SqliteImmutableRuleRepository::new(pool.clone())),
            retention_policies: Arc::new(SqliteRetentionPolicyRepository::new(pool.clone())),
            webhook_policies: Arc::new(SqliteWebhookPolicyRepository::new(pool.clone())),
            webhook_jobs: Arc::new(SqliteWebhookJobRepository::new(pool.clone())),
            pool,
        }
    }
}

/// Wait for a condition to be true with timeout
pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}
