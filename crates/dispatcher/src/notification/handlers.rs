//! 把制品、chart 与扫描事件转换为 webhook 投递

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use jobcore_core::{
    models::{vendor, JobData, JobMetadata},
    CoreError, CoreResult, RuntimeSettings,
};
use jobcore_domain::{
    events::{topic, Event},
    webhook::{DeliveryParams, Payload, WebhookJob},
};

use super::bus::{EventHandler, NotificationBus};
use crate::webhook::{HookManager, WebhookPolicyManager};

/// 查找相关策略并向每个目标提交一个投递作业
pub struct WebhookNotifier {
    policies: Arc<WebhookPolicyManager>,
    hooks: Arc<HookManager>,
    settings: Arc<RuntimeSettings>,
    external_endpoint: String,
}

impl WebhookNotifier {
    pub fn new(
        policies: Arc<WebhookPolicyManager>,
        hooks: Arc<HookManager>,
        settings: Arc<RuntimeSettings>,
        external_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            policies,
            hooks,
            settings,
            external_endpoint: external_endpoint.into(),
        }
    }

    fn payload(&self, event: &Event) -> CoreResult<Payload> {
        match event {
            Event::Image(e) => Payload::from_image_event(e, &self.external_endpoint),
            Event::Chart(e) => Payload::from_chart_event(e, &self.external_endpoint),
            Event::Scan(e) => Payload::from_scan_event(e, &self.external_endpoint),
        }
    }

    /// 返回提交的投递作业数量，单个目标失败不影响其余目标
    pub async fn notify(&self, event: &Event) -> CoreResult<usize> {
        if !self.settings.notification_enabled() {
            debug!("通知已关闭，忽略 {} 事件", event.event_type());
            return Ok(0);
        }

        let event_type = event.event_type();
        let policies = self
            .policies
            .get_related_policies(event.project_id(), event_type)
            .await?;
        if policies.is_empty() {
            debug!("项目 {} 没有订阅 {} 的策略", event.project_id(), event_type);
            return Ok(0);
        }

        let payload = serde_json::to_string(&self.payload(event)?)?;
        let mut submitted = 0;
        let mut last_err = None;
        for policy in &policies {
            for target in &policy.targets {
                let params = DeliveryParams::new(target.clone(), payload.clone()).to_params()?;
                let job_data = JobData::new(vendor::WEBHOOK, params, JobMetadata::generic());
                let job = WebhookJob::new(
                    policy.id,
                    event_type,
                    target.target_type.as_str(),
                    payload.clone(),
                );
                match self.hooks.start_hook(job, job_data).await {
                    Ok(_) => submitted += 1,
                    Err(e) => {
                        warn!("策略 {} 向 {} 投递失败: {}", policy.id, target.address, e);
                        last_err = Some(e);
                    }
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(submitted),
        }
    }
}

fn mismatch(handler: &str, event: &Event) -> CoreError {
    CoreError::invalid(format!(
        "处理器 {handler} 无法处理 {} 类型的事件",
        event.kind()
    ))
}

macro_rules! webhook_handler {
    ($name:ident, $label:literal, $variant:ident) => {
        pub struct $name {
            notifier: Arc<WebhookNotifier>,
        }

        impl $name {
            pub fn new(notifier: Arc<WebhookNotifier>) -> Self {
                Self { notifier }
            }
        }

        #[async_trait]
        impl EventHandler for $name {
            fn name(&self) -> &str {
                $label
            }

            async fn handle(&self, event: &Event) -> CoreResult<()> {
                if !matches!(event, Event::$variant(_)) {
                    return Err(mismatch($label, event));
                }
                self.notifier.notify(event).await.map(|_| ())
            }
        }
    };
}

webhook_handler!(ArtifactWebhookHandler, "ArtifactWebhook", Image);
webhook_handler!(ChartWebhookHandler, "ChartWebhook", Chart);
webhook_handler!(ScanWebhookHandler, "ScanWebhook", Scan);

/// 为全部制品、chart 与扫描主题注册 webhook 处理器
pub fn register_webhook_handlers(
    bus: &NotificationBus,
    notifier: Arc<WebhookNotifier>,
) -> CoreResult<()> {
    let artifact: Arc<dyn EventHandler> = Arc::new(ArtifactWebhookHandler::new(notifier.clone()));
    for t in topic::IMAGE_TOPICS {
        bus.subscribe(t, artifact.clone())?;
    }
    let chart: Arc<dyn EventHandler> = Arc::new(ChartWebhookHandler::new(notifier.clone()));
    for t in topic::CHART_TOPICS {
        bus.subscribe(t, chart.clone())?;
    }
    let scan: Arc<dyn EventHandler> = Arc::new(ScanWebhookHandler::new(notifier));
    for t in topic::SCAN_TOPICS {
        bus.subscribe(t, scan.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobcore_core::models::{HookUrls, TaskStatus};
    use jobcore_core::ErrorKind;
    use jobcore_domain::events::{ArtifactRef, ImageEvent, ProjectRef};
    use jobcore_domain::webhook::EventType;
    use jobcore_infrastructure::MetricsCollector;
    use jobcore_testing_utils::{
        MockJobServiceClient, RecordingWebhookSender, TestDatabase, WebhookPolicyBuilder,
    };

    struct Fixture {
        db: TestDatabase,
        jobservice: MockJobServiceClient,
        settings: Arc<RuntimeSettings>,
        notifier: Arc<WebhookNotifier>,
        policies: Arc<WebhookPolicyManager>,
    }

    async fn fixture() -> Fixture {
        let db = TestDatabase::new().await;
        let jobservice = MockJobServiceClient::new();
        let policies = Arc::new(WebhookPolicyManager::new(
            db.webhook_policies.clone(),
            db.webhook_jobs.clone(),
            Arc::new(RecordingWebhookSender::new()),
        ));
        let hooks = Arc::new(HookManager::new(
            db.webhook_jobs.clone(),
            Arc::new(jobservice.clone()),
            HookUrls::new("http://core"),
            Arc::new(MetricsCollector::new()),
        ));
        let settings = Arc::new(RuntimeSettings::default());
        let notifier = Arc::new(WebhookNotifier::new(
            policies.clone(),
            hooks,
            settings.clone(),
            "https://registry.local",
        ));
        Fixture {
            db,
            jobservice,
            settings,
            notifier,
            policies,
        }
    }

    fn push_event(project_id: i64) -> Event {
        Event::Image(ImageEvent {
            event_type: EventType::PushImage,
            project: ProjectRef {
                id: project_id,
                name: "library".to_string(),
                public: false,
            },
            repository: "redis".to_string(),
            repo_created_at: 0,
            artifacts: vec![ArtifactRef {
                tag: "7.0".to_string(),
                digest: Some("sha256:abc".to_string()),
            }],
            operator: "admin".to_string(),
            occur_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_push_fans_out_to_every_target() {
        let f = fixture().await;
        f.policies
            .create(
                &WebhookPolicyBuilder::new(1, "p1")
                    .target("http://a.local/hook")
                    .event(EventType::PushImage)
                    .build(),
            )
            .await
            .unwrap();
        f.policies
            .create(
                &WebhookPolicyBuilder::new(1, "p2")
                    .target("http://b.local/hook")
                    .target("http://c.local/hook")
                    .event(EventType::PushImage)
                    .build(),
            )
            .await
            .unwrap();

        let bus = NotificationBus::new();
        register_webhook_handlers(&bus, f.notifier.clone()).unwrap();
        bus.publish(topic::PUSH_ARTIFACT, push_event(1)).await.unwrap();

        let jobs = f.db.webhook_jobs.list(&Default::default()).await.unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.status == TaskStatus::Running));

        let submitted = f.jobservice.submitted_named(vendor::WEBHOOK);
        assert_eq!(submitted.len(), 3);
        let mut hooks: Vec<String> = submitted.iter().map(|(_, j)| j.status_hook.clone()).collect();
        hooks.sort();
        hooks.dedup();
        assert_eq!(hooks.len(), 3);

        let params = DeliveryParams::from_params(&submitted[0].1.parameters).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&params.payload).unwrap();
        assert_eq!(payload["type"], "pushImage");
        assert_eq!(
            payload["event_data"]["resources"][0]["resource_url"],
            "registry.local/library/redis:7.0"
        );
    }

    #[tokio::test]
    async fn test_disabled_notifications_are_ignored() {
        let f = fixture().await;
        f.policies
            .create(
                &WebhookPolicyBuilder::new(1, "p1")
                    .target("http://a.local/hook")
                    .event(EventType::PushImage)
                    .build(),
            )
            .await
            .unwrap();
        f.settings.set_notification_enabled(false).unwrap();

        assert_eq!(f.notifier.notify(&push_event(1)).await.unwrap(), 0);
        assert!(f.jobservice.submitted_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_handler_rejects_mismatched_event() {
        let f = fixture().await;
        let handler = ChartWebhookHandler::new(f.notifier.clone());
        let err = handler.handle(&push_event(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
