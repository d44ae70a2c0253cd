//! Structured logging utilities
//!
//! Every helper emits one named event (`event = "..."`) so that log
//! pipelines can filter on lifecycle transitions without parsing messages.

use tracing::{debug, error, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log a schedule registration
    pub fn log_schedule_created(schedule_id: i64, vendor_type: &str, vendor_id: i64, cron: &str) {
        info!(
            event = "schedule_created",
            schedule.id = schedule_id,
            schedule.vendor_type = vendor_type,
            schedule.vendor_id = vendor_id,
            schedule.cron = cron,
            "周期调度已注册"
        );
    }

    pub fn log_schedule_removed(schedule_id: i64, vendor_type: &str, vendor_id: i64) {
        info!(
            event = "schedule_removed",
            schedule.id = schedule_id,
            schedule.vendor_type = vendor_type,
            schedule.vendor_id = vendor_id,
            "周期调度已移除"
        );
    }

    /// Log a periodic firing handed to a callback
    pub fn log_schedule_fired(schedule_id: i64, callback: &str, revision: i64) {
        info!(
            event = "schedule_fired",
            schedule.id = schedule_id,
            schedule.callback = callback,
            schedule.revision = revision,
            "周期调度触发回调"
        );
    }

    pub fn log_execution_created(execution_id: i64, vendor_type: &str, vendor_id: i64, trigger: &str) {
        info!(
            event = "execution_created",
            execution.id = execution_id,
            execution.vendor_type = vendor_type,
            execution.vendor_id = vendor_id,
            execution.trigger = trigger,
            "执行已创建"
        );
    }

    /// Log an execution reaching a terminal or explicitly set status
    pub fn log_execution_status(execution_id: i64, status: &str, message: &str) {
        if status == "Error" {
            error!(
                event = "execution_status",
                execution.id = execution_id,
                execution.status = status,
                execution.message = message,
                "执行状态变更"
            );
        } else {
            info!(
                event = "execution_status",
                execution.id = execution_id,
                execution.status = status,
                execution.message = message,
                "执行状态变更"
            );
        }
    }

    pub fn log_task_submitted(task_id: i64, execution_id: i64, job_id: &str) {
        info!(
            event = "task_submitted",
            task.id = task_id,
            task.execution_id = execution_id,
            task.job_id = job_id,
            "任务已提交到worker pool"
        );
    }

    /// Log a status callback dropped because of an older revision
    pub fn log_stale_status(task_id: i64, status: &str, revision: i64) {
        debug!(
            event = "task_status_stale",
            task.id = task_id,
            task.status = status,
            task.revision = revision,
            "丢弃过期的状态回调"
        );
    }

    pub fn log_webhook_submitted(job_id: i64, policy_id: i64, event_type: &str, uuid: &str) {
        info!(
            event = "webhook_submitted",
            webhook_job.id = job_id,
            webhook_job.policy_id = policy_id,
            webhook_job.event_type = event_type,
            webhook_job.uuid = uuid,
            "webhook投递作业已提交"
        );
    }

    pub fn log_webhook_failed(job_id: i64, policy_id: i64, error_message: &str) {
        error!(
            event = "webhook_failed",
            webhook_job.id = job_id,
            webhook_job.policy_id = policy_id,
            webhook_job.error = error_message,
            "webhook投递作业提交失败"
        );
    }

    /// Log the outcome of one schedule sync round
    pub fn log_sync_round(round: u32, restored: usize, cleared: usize, error_message: Option<&str>) {
        match error_message {
            None => info!(
                event = "schedule_sync_round",
                sync.round = round,
                sync.restored = restored,
                sync.cleared = cleared,
                "调度同步完成"
            ),
            Some(err) => warn!(
                event = "schedule_sync_round",
                sync.round = round,
                sync.restored = restored,
                sync.cleared = cleared,
                sync.error = err,
                "调度同步出现错误"
            ),
        }
    }

    pub fn log_sweep(vendor_type: &str, vendor_id: i64, deleted: usize) {
        debug!(
            event = "execution_sweep",
            sweep.vendor_type = vendor_type,
            sweep.vendor_id = vendor_id,
            sweep.deleted = deleted,
            "清理历史执行"
        );
    }
}
