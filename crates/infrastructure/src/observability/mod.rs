//! Observability module
//!
//! Named structured log events and metrics for schedules, executions,
//! tasks, webhook jobs and the schedule sync worker.

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
