//! 领域事件
//!
//! 事件生产方把制品、chart、扫描相关的事件发布到通知总线，由各个处理器消费

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::webhook::EventType;

/// 通知总线上的主题
pub mod topic {
    pub const PUSH_ARTIFACT: &str = "PUSH_ARTIFACT";
    pub const PULL_ARTIFACT: &str = "PULL_ARTIFACT";
    pub const DELETE_ARTIFACT: &str = "DELETE_ARTIFACT";
    pub const UPLOAD_CHART: &str = "UPLOAD_CHART";
    pub const DOWNLOAD_CHART: &str = "DOWNLOAD_CHART";
    pub const DELETE_CHART: &str = "DELETE_CHART";
    pub const SCANNING_COMPLETED: &str = "SCANNING_COMPLETED";
    pub const SCANNING_FAILED: &str = "SCANNING_FAILED";

    pub const IMAGE_TOPICS: [&str; 3] = [PUSH_ARTIFACT, PULL_ARTIFACT, DELETE_ARTIFACT];
    pub const CHART_TOPICS: [&str; 3] = [UPLOAD_CHART, DOWNLOAD_CHART, DELETE_CHART];
    pub const SCAN_TOPICS: [&str; 2] = [SCANNING_COMPLETED, SCANNING_FAILED];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: i64,
    pub name: String,
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub tag: String,
    #[serde(default)]
    pub digest: Option<String>,
}

/// 镜像推送、拉取、删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEvent {
    pub event_type: EventType,
    pub project: ProjectRef,
    pub repository: String,
    /// 仓库创建时间（unix秒）
    pub repo_created_at: i64,
    pub artifacts: Vec<ArtifactRef>,
    pub operator: String,
    pub occur_at: DateTime<Utc>,
}

/// chart 上传、下载、删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartEvent {
    pub event_type: EventType,
    pub project: ProjectRef,
    pub chart_name: String,
    pub versions: Vec<String>,
    pub operator: String,
    pub occur_at: DateTime<Utc>,
}

/// 扫描完成或失败
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub event_type: EventType,
    pub project: ProjectRef,
    pub repository: String,
    pub artifact: ArtifactRef,
    #[serde(default)]
    pub scan_overview: Option<serde_json::Value>,
    pub operator: String,
    pub occur_at: DateTime<Utc>,
}

/// 总线上传递的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Image(ImageEvent),
    Chart(ChartEvent),
    Scan(ScanEvent),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Image(_) => "image",
            Event::Chart(_) => "chart",
            Event::Scan(_) => "scan",
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Event::Image(e) => e.event_type,
            Event::Chart(e) => e.event_type,
            Event::Scan(e) => e.event_type,
        }
    }

    pub fn project_id(&self) -> i64 {
        match self {
            Event::Image(e) => e.project.id,
            Event::Chart(e) => e.project.id,
            Event::Scan(e) => e.project.id,
        }
    }
}
