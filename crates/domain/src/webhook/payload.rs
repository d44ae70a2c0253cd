use chrono::Utc;
use jobcore_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

use super::{EventType, WebhookPolicy};
use crate::events::{ChartEvent, ImageEvent, ProjectRef, ScanEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaType {
    ContainerImage,
    HelmChart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub tag: String,
    pub resource_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_overview: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoRecord {
    pub date_created: i64,
    pub name: String,
    pub namespace: String,
    pub repo_full_name: String,
    pub repo_type: RepoType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub resources: Vec<Resource>,
    pub repository: RepoRecord,
}

/// 发送给 webhook 目标的规范消息体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub occur_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    pub event_data: EventData,
    pub operator: String,
}

/// 去掉协议前缀与末尾斜杠，镜像地址不带协议
fn registry_host(ext_endpoint: &str) -> &str {
    let trimmed = ext_endpoint.trim_end_matches('/');
    trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
}

fn repo_record(project: &ProjectRef, name: &str, date_created: i64) -> CoreResult<RepoRecord> {
    if name.is_empty() {
        return Err(CoreError::invalid("仓库名称不能为空"));
    }
    Ok(RepoRecord {
        date_created,
        name: name.to_string(),
        namespace: project.name.clone(),
        repo_full_name: format!("{}/{}", project.name, name),
        repo_type: if project.public {
            RepoType::Public
        } else {
            RepoType::Private
        },
    })
}

impl Payload {
    pub fn from_image_event(event: &ImageEvent, ext_endpoint: &str) -> CoreResult<Self> {
        let repository = repo_record(&event.project, &event.repository, event.repo_created_at)?;
        let host = registry_host(ext_endpoint);
        let resources = event
            .artifacts
            .iter()
            .filter(|a| !a.tag.is_empty())
            .map(|a| Resource {
                digest: a.digest.clone(),
                tag: a.tag.clone(),
                resource_url: format!("{host}/{}:{}", repository.repo_full_name, a.tag),
                scan_overview: None,
            })
            .collect();

        Ok(Self {
            event_type: event.event_type,
            occur_at: event.occur_at.timestamp(),
            media_type: Some(MediaType::ContainerImage),
            event_data: EventData {
                resources,
                repository,
            },
            operator: event.operator.clone(),
        })
    }

    pub fn from_chart_event(event: &ChartEvent, ext_endpoint: &str) -> CoreResult<Self> {
        let repository = repo_record(&event.project, &event.chart_name, 0)?;
        let base = ext_endpoint.trim_end_matches('/');
        let resources = event
            .versions
            .iter()
            .filter(|v| !v.is_empty())
            .map(|version| Resource {
                digest: None,
                tag: version.clone(),
                resource_url: format!(
                    "{base}/chartrepo/{}/charts/{}-{version}.tgz",
                    event.project.name, event.chart_name
                ),
                scan_overview: None,
            })
            .collect();

        Ok(Self {
            event_type: event.event_type,
            occur_at: event.occur_at.timestamp(),
            media_type: Some(MediaType::HelmChart),
            event_data: EventData {
                resources,
                repository,
            },
            operator: event.operator.clone(),
        })
    }

    pub fn from_scan_event(event: &ScanEvent, ext_endpoint: &str) -> CoreResult<Self> {
        let repository = repo_record(&event.project, &event.repository, 0)?;
        let host = registry_host(ext_endpoint);
        let mut resources = Vec::new();
        if !event.artifact.tag.is_empty() {
            resources.push(Resource {
                digest: event.artifact.digest.clone(),
                tag: event.artifact.tag.clone(),
                resource_url: format!(
                    "{host}/{}:{}",
                    repository.repo_full_name, event.artifact.tag
                ),
                scan_overview: event.scan_overview.clone(),
            });
        }

        Ok(Self {
            event_type: event.event_type,
            occur_at: event.occur_at.timestamp(),
            media_type: Some(MediaType::ContainerImage),
            event_data: EventData {
                resources,
                repository,
            },
            operator: event.operator.clone(),
        })
    }

    /// 测试投递使用的最小消息体
    pub fn test_endpoint(policy: &WebhookPolicy, operator: &str) -> Self {
        Self {
            event_type: EventType::TestEndpoint,
            occur_at: Utc::now().timestamp(),
            media_type: None,
            event_data: EventData {
                resources: Vec::new(),
                repository: RepoRecord {
                    date_created: 0,
                    name: String::new(),
                    namespace: String::new(),
                    repo_full_name: format!("project-{}", policy.project_id),
                    repo_type: RepoType::Private,
                },
            },
            operator: operator.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ArtifactRef;
    use chrono::TimeZone;
    use serde_json::json;

    fn project() -> ProjectRef {
        ProjectRef {
            id: 1,
            name: "library".to_string(),
            public: true,
        }
    }

    fn image_event(repository: &str, tags: &[&str]) -> ImageEvent {
        ImageEvent {
            event_type: EventType::PushImage,
            project: project(),
            repository: repository.to_string(),
            repo_created_at: 1_600_000_000,
            artifacts: tags
                .iter()
                .map(|t| ArtifactRef {
                    tag: t.to_string(),
                    digest: Some(format!("sha256:{t}")),
                })
                .collect(),
            operator: "admin".to_string(),
            occur_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_image_payload_schema() {
        let payload =
            Payload::from_image_event(&image_event("redis", &["latest"]), "https://hub.local/")
                .unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], json!("pushImage"));
        assert_eq!(value["media_type"], json!("containerImage"));
        assert_eq!(value["occur_at"], json!(1_704_067_200));
        assert_eq!(
            value["event_data"]["resources"][0]["resource_url"],
            json!("hub.local/library/redis:latest")
        );
        assert_eq!(value["event_data"]["repository"]["repo_type"], json!("public"));
        assert_eq!(
            value["event_data"]["repository"]["repo_full_name"],
            json!("library/redis")
        );
        assert!(value["event_data"]["resources"][0].get("scan_overview").is_none());
    }

    #[test]
    fn test_empty_tags_are_skipped() {
        let payload =
            Payload::from_image_event(&image_event("redis", &["", "v1"]), "hub.local").unwrap();
        assert_eq!(payload.event_data.resources.len(), 1);
        assert_eq!(payload.event_data.resources[0].tag, "v1");
    }

    #[test]
    fn test_empty_repository_is_error() {
        assert!(Payload::from_image_event(&image_event("", &["v1"]), "hub.local").is_err());
    }

    #[test]
    fn test_chart_resource_url() {
        let event = ChartEvent {
            event_type: EventType::UploadChart,
            project: project(),
            chart_name: "nginx".to_string(),
            versions: vec!["1.2.0".to_string()],
            operator: "admin".to_string(),
            occur_at: Utc::now(),
        };
        let payload = Payload::from_chart_event(&event, "https://hub.local").unwrap();
        assert_eq!(payload.media_type, Some(MediaType::HelmChart));
        assert_eq!(
            payload.event_data.resources[0].resource_url,
            "https://hub.local/chartrepo/library/charts/nginx-1.2.0.tgz"
        );
    }

    #[test]
    fn test_scan_payload_carries_overview() {
        let event = ScanEvent {
            event_type: EventType::ScanningCompleted,
            project: project(),
            repository: "redis".to_string(),
            artifact: ArtifactRef {
                tag: "v1".to_string(),
                digest: None,
            },
            scan_overview: Some(json!({"severity": "High"})),
            operator: "auto".to_string(),
            occur_at: Utc::now(),
        };
        let payload = Payload::from_scan_event(&event, "hub.local").unwrap();
        assert_eq!(
            payload.event_data.resources[0].scan_overview,
            Some(json!({"severity": "High"}))
        );
    }
}
