use serde::{Deserialize, Serialize};
use std::fmt;

/// worker pool 作业类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Generic,
    Periodic,
    Scheduled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_kind: Option<JobKind>,
    #[serde(rename = "cron_spec", default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default)]
    pub is_unique: bool,
}

impl JobMetadata {
    pub fn generic() -> Self {
        Self {
            job_kind: Some(JobKind::Generic),
            cron: None,
            is_unique: false,
        }
    }

    pub fn periodic(cron: impl Into<String>) -> Self {
        Self {
            job_kind: Some(JobKind::Periodic),
            cron: Some(cron.into()),
            is_unique: false,
        }
    }
}

/// 提交给 worker pool 的作业描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobData {
    pub name: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub metadata: JobMetadata,
    #[serde(default)]
    pub status_hook: String,
}

impl JobData {
    pub fn new(
        name: impl Into<String>,
        parameters: serde_json::Map<String, serde_json::Value>,
        metadata: JobMetadata,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            metadata,
            status_hook: String::new(),
        }
    }
}

/// worker pool 上报的作业状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Scheduled,
    Running,
    Stopped,
    Cancelled,
    Error,
    Success,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "Pending",
            JobStatus::Scheduled => "Scheduled",
            JobStatus::Running => "Running",
            JobStatus::Stopped => "Stopped",
            JobStatus::Cancelled => "Cancelled",
            JobStatus::Error => "Error",
            JobStatus::Success => "Success",
        };
        f.write_str(s)
    }
}

/// 作业控制动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Stop,
    Cancel,
    Retry,
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Stop => "stop",
            JobAction::Cancel => "cancel",
            JobAction::Retry => "retry",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_job_id: Option<String>,
}

/// worker pool 回调的状态变更消息体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub metadata: Option<StatusChangeMetadata>,
    #[serde(default)]
    pub check_in: String,
    #[serde(default)]
    pub revision: i64,
}

/// 作业执行统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub upstream_job_id: Option<String>,
    #[serde(default)]
    pub revision: i64,
}

/// worker pool 中保存的周期作业
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicJob {
    pub id: String,
    pub job_name: String,
    pub cron_spec: String,
    #[serde(default)]
    pub job_params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub status_hook: String,
}

/// 状态回调地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookUrls {
    base: String,
}

impl HookUrls {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn admin_job(&self, id: i64) -> String {
        format!("{}/service/notifications/jobs/adminjob/{id}", self.base)
    }

    pub fn webhook_job(&self, id: i64) -> String {
        format!("{}/service/notifications/jobs/webhook/{id}", self.base)
    }

    pub fn schedule(&self, id: i64) -> String {
        format!("{}/service/notifications/schedules/{id}", self.base)
    }

    pub fn task(&self, id: i64) -> String {
        format!("{}/service/notifications/tasks/{id}", self.base)
    }
}
