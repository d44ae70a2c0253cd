//! Webhook 策略与投递记录

pub mod payload;

use chrono::{DateTime, Utc};
use jobcore_core::models::TaskStatus;
use jobcore_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use payload::{EventData, MediaType, Payload, RepoRecord, RepoType, Resource};

/// webhook 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    PushImage,
    PullImage,
    DeleteImage,
    UploadChart,
    DownloadChart,
    DeleteChart,
    ScanningCompleted,
    ScanningFailed,
    TestEndpoint,
}

impl EventType {
    pub const ALL: [EventType; 9] = [
        EventType::PushImage,
        EventType::PullImage,
        EventType::DeleteImage,
        EventType::UploadChart,
        EventType::DownloadChart,
        EventType::DeleteChart,
        EventType::ScanningCompleted,
        EventType::ScanningFailed,
        EventType::TestEndpoint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PushImage => "pushImage",
            EventType::PullImage => "pullImage",
            EventType::DeleteImage => "deleteImage",
            EventType::UploadChart => "uploadChart",
            EventType::DownloadChart => "downloadChart",
            EventType::DeleteChart => "deleteChart",
            EventType::ScanningCompleted => "scanningCompleted",
            EventType::ScanningFailed => "scanningFailed",
            EventType::TestEndpoint => "testEndpoint",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .find(|e| e.as_str() == s)
            .copied()
            .ok_or_else(|| CoreError::invalid(format!("未知的事件类型: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Http,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Http => "http",
        }
    }
}

/// 投递目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookTarget {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub address: String,
    /// 作为 Authorization 头发送的密钥
    #[serde(default, alias = "secret")]
    pub auth_header: String,
    #[serde(default)]
    pub skip_cert_verify: bool,
}

impl HookTarget {
    pub fn http(address: impl Into<String>) -> Self {
        Self {
            target_type: TargetType::Http,
            address: address.into(),
            auth_header: String::new(),
            skip_cert_verify: false,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        let url = url::Url::parse(&self.address)
            .map_err(|e| CoreError::invalid(format!("无效的目标地址 {}: {e}", self.address)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CoreError::invalid(format!(
                "目标地址必须是http或https: {}",
                self.address
            )));
        }
        Ok(())
    }
}

/// 项目级 webhook 策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPolicy {
    #[serde(default)]
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub targets: Vec<HookTarget>,
    pub event_types: Vec<EventType>,
    #[serde(default)]
    pub creator: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl WebhookPolicy {
    pub fn new(
        project_id: i64,
        name: impl Into<String>,
        targets: Vec<HookTarget>,
        event_types: Vec<EventType>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            project_id,
            name: name.into(),
            description: String::new(),
            targets,
            event_types,
            creator: String::new(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn subscribes(&self, event_type: EventType) -> bool {
        self.event_types.contains(&event_type)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.project_id <= 0 {
            return Err(CoreError::invalid("策略必须属于有效的项目"));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::invalid("策略名称不能为空"));
        }
        if self.targets.is_empty() {
            return Err(CoreError::invalid("策略至少需要一个投递目标"));
        }
        if self.event_types.is_empty() {
            return Err(CoreError::invalid("策略至少需要订阅一个事件类型"));
        }
        self.targets.iter().try_for_each(HookTarget::validate)
    }
}

/// 一次 webhook 投递记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookJob {
    pub id: i64,
    pub policy_id: i64,
    pub event_type: EventType,
    pub notify_type: String,
    /// 序列化后的 payload
    pub job_detail: String,
    pub uuid: Option<String>,
    pub status: TaskStatus,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl WebhookJob {
    pub fn new(policy_id: i64, event_type: EventType, notify_type: &str, job_detail: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            policy_id,
            event_type,
            notify_type: notify_type.to_string(),
            job_detail,
            uuid: None,
            status: TaskStatus::Pending,
            creation_time: now,
            update_time: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookJobQuery {
    pub policy_id: Option<i64>,
    pub event_type: Option<EventType>,
    pub statuses: Vec<TaskStatus>,
}

/// 某事件类型最近一次触发的时间
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTrigger {
    pub event_type: EventType,
    pub last_trigger_time: DateTime<Utc>,
}

/// webhook 投递作业的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryParams {
    pub target: HookTarget,
    /// 序列化后的 payload
    pub payload: String,
}

impl DeliveryParams {
    pub fn new(target: HookTarget, payload: impl Into<String>) -> Self {
        Self {
            target,
            payload: payload.into(),
        }
    }

    pub fn to_params(&self) -> CoreResult<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(CoreError::Internal("投递参数必须序列化为对象".to_string())),
        }
    }

    pub fn from_params(params: &serde_json::Map<String, serde_json::Value>) -> CoreResult<Self> {
        serde_json::from_value(serde_json::Value::Object(params.clone()))
            .map_err(|e| CoreError::invalid(format!("无效的投递参数: {e}")))
    }
}
