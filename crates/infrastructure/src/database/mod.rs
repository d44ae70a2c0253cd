pub mod manager;
pub mod mapping;
pub mod sqlite;

pub use manager::{DatabaseManager, DbPool};
pub use mapping::MappingHelpers;
pub use sqlite::{
    SqliteExecutionRepository, SqliteImmutableRuleRepository, SqliteRetentionPolicyRepository,
    SqliteScheduleRepository, SqliteTaskRepository, SqliteWebhookJobRepository,
    SqliteWebhookPolicyRepository,
};
