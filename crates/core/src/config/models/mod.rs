pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod jobservice;
pub mod scheduler;

// Re-export main types for easier imports
pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use jobservice::{CoreConfig, JobServiceConfig, RegistryConfig};
pub use scheduler::{ExecutionConfig, SchedulerConfig, WebhookConfig, MAX_WEBHOOK_TIMEOUT_SECONDS};
