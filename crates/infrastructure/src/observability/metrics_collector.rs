//! Metrics collector
//!
//! Thin wrapper over the `metrics` facade. Without an installed recorder
//! every call is a no-op, so the collector is safe to use in tests.

use metrics::{counter, gauge, histogram};

/// Metrics collector for schedules, executions and webhook delivery
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    pub fn record_schedule_created(&self, vendor_type: &str) {
        counter!("jobcore_schedules_created_total", "vendor_type" => vendor_type.to_string())
            .increment(1);
    }

    pub fn record_schedule_fired(&self, callback: &str) {
        counter!("jobcore_schedules_fired_total", "callback" => callback.to_string()).increment(1);
    }

    pub fn record_execution_created(&self, vendor_type: &str) {
        counter!("jobcore_executions_created_total", "vendor_type" => vendor_type.to_string())
            .increment(1);
    }

    pub fn record_executions_swept(&self, vendor_type: &str, count: usize) {
        counter!("jobcore_executions_swept_total", "vendor_type" => vendor_type.to_string())
            .increment(count as u64);
    }

    /// Record one task status callback, applied or dropped as stale
    pub fn record_task_status(&self, status: &str, applied: bool) {
        let outcome = if applied { "applied" } else { "stale" };
        counter!(
            "jobcore_task_status_updates_total",
            "status" => status.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }

    pub fn record_webhook_submitted(&self, event_type: &str) {
        counter!("jobcore_webhook_jobs_submitted_total", "event_type" => event_type.to_string())
            .increment(1);
    }

    pub fn record_webhook_failed(&self, event_type: &str) {
        counter!("jobcore_webhook_jobs_failed_total", "event_type" => event_type.to_string())
            .increment(1);
    }

    pub fn record_sync_round(&self, restored: usize, cleared: usize) {
        counter!("jobcore_schedule_sync_restored_total").increment(restored as u64);
        counter!("jobcore_schedule_sync_cleared_total").increment(cleared as u64);
        gauge!("jobcore_schedule_sync_last_restored").set(restored as f64);
    }

    /// Record how long a worker-pool call took
    pub fn record_jobservice_call(&self, operation: &'static str, duration_seconds: f64) {
        histogram!("jobcore_jobservice_call_duration_seconds", "operation" => operation)
            .record(duration_seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = MetricsCollector::new();
        metrics.record_schedule_created("RETENTION");
        metrics.record_task_status("Success", true);
        metrics.record_sync_round(1, 2);
        metrics.record_jobservice_call("submit_job", 0.01);
    }
}
