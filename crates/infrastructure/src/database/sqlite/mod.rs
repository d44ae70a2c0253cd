pub mod sqlite_execution_repository;
pub mod sqlite_immutable_rule_repository;
pub mod sqlite_retention_policy_repository;
pub mod sqlite_schedule_repository;
pub mod sqlite_task_repository;
pub mod sqlite_webhook_repository;

pub use sqlite_execution_repository::SqliteExecutionRepository;
pub use sqlite_immutable_rule_repository::SqliteImmutableRuleRepository;
pub use sqlite_retention_policy_repository::SqliteRetentionPolicyRepository;
pub use sqlite_schedule_repository::SqliteScheduleRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
pub use sqlite_webhook_repository::{SqliteWebhookJobRepository, SqliteWebhookPolicyRepository};

#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    let manager = crate::database::DatabaseManager::in_memory().await.unwrap();
    manager.migrate().await.unwrap();
    manager.pool().clone()
}
