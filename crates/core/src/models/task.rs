use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::job::JobStatus;
use super::ExtraAttrs;
use crate::errors::CoreError;

/// 任务状态，与 worker pool 的作业生命周期一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Stopped,
    Error,
    Success,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Scheduled => "Scheduled",
            TaskStatus::Running => "Running",
            TaskStatus::Stopped => "Stopped",
            TaskStatus::Error => "Error",
            TaskStatus::Success => "Success",
        }
    }

    /// 状态序号：Pending 0 < Scheduled 1 < Running 2 < 终态 3
    pub fn code(&self) -> i32 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Scheduled => 1,
            TaskStatus::Running => 2,
            TaskStatus::Stopped | TaskStatus::Error | TaskStatus::Success => 3,
        }
    }

    pub fn is_final(&self) -> bool {
        self.code() == 3
    }

    /// 状态码低于 `self` 的全部状态，用于条件更新
    pub fn predecessors(&self) -> Vec<TaskStatus> {
        [
            TaskStatus::Pending,
            TaskStatus::Scheduled,
            TaskStatus::Running,
        ]
        .into_iter()
        .filter(|s| s.code() < self.code())
        .collect()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(TaskStatus::Pending),
            "Scheduled" => Ok(TaskStatus::Scheduled),
            "Running" => Ok(TaskStatus::Running),
            "Stopped" => Ok(TaskStatus::Stopped),
            "Error" => Ok(TaskStatus::Error),
            "Success" => Ok(TaskStatus::Success),
            _ => Err(CoreError::invalid(format!("无效的任务状态: {s}"))),
        }
    }
}

impl From<JobStatus> for TaskStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => TaskStatus::Pending,
            JobStatus::Scheduled => TaskStatus::Scheduled,
            JobStatus::Running => TaskStatus::Running,
            JobStatus::Stopped | JobStatus::Cancelled => TaskStatus::Stopped,
            JobStatus::Error => TaskStatus::Error,
            JobStatus::Success => TaskStatus::Success,
        }
    }
}

crate::impl_sqlite_text_enum!(TaskStatus);

/// 执行内的一个工作单元，对应 worker pool 中的一个作业
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub execution_id: i64,
    pub vendor_type: String,
    pub job_id: Option<String>,
    pub status: TaskStatus,
    pub status_code: i32,
    pub status_revision: i64,
    pub status_message: String,
    pub run_count: i32,
    pub extra_attrs: ExtraAttrs,
    pub check_in_comment: String,
    pub creation_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub update_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(execution_id: i64, vendor_type: impl Into<String>, extra_attrs: ExtraAttrs) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            execution_id,
            vendor_type: vendor_type.into(),
            job_id: None,
            status: TaskStatus::Pending,
            status_code: TaskStatus::Pending.code(),
            status_revision: 0,
            status_message: String::new(),
            run_count: 1,
            extra_attrs,
            check_in_comment: String::new(),
            creation_time: now,
            start_time: None,
            update_time: now,
            end_time: None,
        }
    }

    /// 判断一次状态变更是否应当被接受
    ///
    /// 新版本号更大时接受；版本号相同时只接受状态码更高的变更。
    pub fn accepts(&self, status: TaskStatus, revision: i64) -> bool {
        if revision > self.status_revision {
            return true;
        }
        revision == self.status_revision && status.code() > self.status.code()
    }
}
