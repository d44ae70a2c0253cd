use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ExtraAttrs;
use crate::errors::CoreError;

/// 执行记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Error,
    Stopped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Success => "Success",
            ExecutionStatus::Error => "Error",
            ExecutionStatus::Stopped => "Stopped",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Error | ExecutionStatus::Stopped
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ExecutionStatus::Pending),
            "Running" => Ok(ExecutionStatus::Running),
            "Success" => Ok(ExecutionStatus::Success),
            "Error" => Ok(ExecutionStatus::Error),
            "Stopped" => Ok(ExecutionStatus::Stopped),
            _ => Err(CoreError::invalid(format!("无效的执行状态: {s}"))),
        }
    }
}

crate::impl_sqlite_text_enum!(ExecutionStatus);

/// 执行的触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    #[serde(rename = "MANUAL")]
    Manual,
    #[serde(rename = "SCHEDULE")]
    Scheduled,
    #[serde(rename = "EVENT")]
    Event,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "MANUAL",
            Trigger::Scheduled => "SCHEDULE",
            Trigger::Event => "EVENT",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(Trigger::Manual),
            "SCHEDULE" => Ok(Trigger::Scheduled),
            "EVENT" => Ok(Trigger::Event),
            _ => Err(CoreError::invalid(format!("无效的触发方式: {s}"))),
        }
    }
}

crate::impl_sqlite_text_enum!(Trigger);

/// 一次执行下各状态任务的数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub task_count: i64,
    pub success_task_count: i64,
    pub error_task_count: i64,
    pub pending_task_count: i64,
    pub running_task_count: i64,
    pub scheduled_task_count: i64,
    pub stopped_task_count: i64,
}

impl ExecutionMetrics {
    /// 根据任务状态汇总执行状态，没有任务时返回 None
    ///
    /// 仍有未结束的任务时执行保持 Running，保证执行终态时所有任务均已终态。
    pub fn rollup(&self) -> Option<ExecutionStatus> {
        if self.task_count == 0 {
            return None;
        }
        if self.pending_task_count + self.scheduled_task_count + self.running_task_count > 0 {
            return Some(ExecutionStatus::Running);
        }
        if self.error_task_count > 0 {
            return Some(ExecutionStatus::Error);
        }
        if self.stopped_task_count > 0 {
            return Some(ExecutionStatus::Stopped);
        }
        Some(ExecutionStatus::Success)
    }
}

/// 一次 vendor 操作的触发实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: i64,
    pub vendor_type: String,
    pub vendor_id: i64,
    pub status: ExecutionStatus,
    pub status_message: String,
    pub trigger: Trigger,
    pub extra_attrs: ExtraAttrs,
    pub revision: i64,
    pub start_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub metrics: Option<ExecutionMetrics>,
}

impl Execution {
    pub fn new(
        vendor_type: impl Into<String>,
        vendor_id: i64,
        trigger: Trigger,
        extra_attrs: ExtraAttrs,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            vendor_type: vendor_type.into(),
            vendor_id,
            status: ExecutionStatus::Running,
            status_message: String::new(),
            trigger,
            extra_attrs,
            revision: 0,
            start_time: now,
            update_time: now,
            end_time: None,
            metrics: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(success: i64, error: i64, stopped: i64, running: i64) -> ExecutionMetrics {
        ExecutionMetrics {
            task_count: success + error + stopped + running,
            success_task_count: success,
            error_task_count: error,
            stopped_task_count: stopped,
            running_task_count: running,
            ..Default::default()
        }
    }

    #[test]
    fn test_rollup_without_tasks() {
        assert_eq!(ExecutionMetrics::default().rollup(), None);
    }

    #[test]
    fn test_rollup_waits_for_unfinished_tasks() {
        assert_eq!(metrics(1, 1, 0, 1).rollup(), Some(ExecutionStatus::Running));
    }

    #[test]
    fn test_rollup_error_wins_over_stopped() {
        assert_eq!(metrics(2, 1, 1, 0).rollup(), Some(ExecutionStatus::Error));
        assert_eq!(metrics(2, 0, 1, 0).rollup(), Some(ExecutionStatus::Stopped));
        assert_eq!(metrics(3, 0, 0, 0).rollup(), Some(ExecutionStatus::Success));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Stopped".parse::<ExecutionStatus>().unwrap(), ExecutionStatus::Stopped);
        assert!("stopped".parse::<ExecutionStatus>().is_err());
        assert!(ExecutionStatus::Error.is_final());
        assert!(!ExecutionStatus::Running.is_final());
        assert_eq!("SCHEDULE".parse::<Trigger>().unwrap(), Trigger::Scheduled);
    }
}
