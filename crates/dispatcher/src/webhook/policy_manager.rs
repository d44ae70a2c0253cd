use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use jobcore_core::{CoreError, CoreResult};
use jobcore_domain::{
    ports::WebhookSender,
    repositories::{WebhookJobRepository, WebhookPolicyRepository},
    webhook::{EventType, Payload, WebhookPolicy},
};

/// 按事件类型展开的策略视图，附带最近一次触发时间
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyTriggerView {
    pub policy_id: i64,
    pub policy_name: String,
    pub event_type: EventType,
    pub enabled: bool,
    pub creator: String,
    pub creation_time: DateTime<Utc>,
    pub last_trigger_time: Option<DateTime<Utc>>,
}

/// webhook 策略管理
pub struct WebhookPolicyManager {
    policy_repo: Arc<dyn WebhookPolicyRepository>,
    job_repo: Arc<dyn WebhookJobRepository>,
    sender: Arc<dyn WebhookSender>,
}

impl WebhookPolicyManager {
    pub fn new(
        policy_repo: Arc<dyn WebhookPolicyRepository>,
        job_repo: Arc<dyn WebhookJobRepository>,
        sender: Arc<dyn WebhookSender>,
    ) -> Self {
        Self {
            policy_repo,
            job_repo,
            sender,
        }
    }

    #[instrument(skip(self, policy), fields(project_id = policy.project_id, name = %policy.name))]
    pub async fn create(&self, policy: &WebhookPolicy) -> CoreResult<i64> {
        policy.validate()?;
        let id = self.policy_repo.create(policy).await?;
        info!("webhook策略 {} 已创建", id);
        Ok(id)
    }

    pub async fn update(&self, policy: &WebhookPolicy) -> CoreResult<()> {
        policy.validate()?;
        self.policy_repo.update(policy).await
    }

    /// 删除策略及其投递记录
    pub async fn delete(&self, id: i64) -> CoreResult<()> {
        self.policy_repo.get(id).await?;
        self.job_repo.delete_by_policy(id).await?;
        self.policy_repo.delete(id).await
    }

    pub async fn get(&self, id: i64) -> CoreResult<WebhookPolicy> {
        self.policy_repo.get(id).await
    }

    pub async fn get_by_name_and_project(
        &self,
        name: &str,
        project_id: i64,
    ) -> CoreResult<Option<WebhookPolicy>> {
        self.policy_repo.get_by_name(project_id, name).await
    }

    pub async fn list(&self, project_id: i64) -> CoreResult<Vec<WebhookPolicy>> {
        self.policy_repo.list(project_id).await
    }

    /// 项目下已启用且订阅了该事件类型的策略
    pub async fn get_related_policies(
        &self,
        project_id: i64,
        event_type: EventType,
    ) -> CoreResult<Vec<WebhookPolicy>> {
        Ok(self
            .policy_repo
            .list(project_id)
            .await?
            .into_iter()
            .filter(|policy| policy.enabled && policy.subscribes(event_type))
            .collect())
    }

    /// 向策略的每个目标同步发送测试消息，不产生投递记录
    #[instrument(skip(self, policy), fields(name = %policy.name))]
    pub async fn test(&self, policy: &WebhookPolicy, operator: &str) -> CoreResult<()> {
        policy.validate()?;
        let body = serde_json::to_vec(&Payload::test_endpoint(policy, operator))?;
        for target in &policy.targets {
            let response = self.sender.send(target, &body).await?;
            if !response.is_success() {
                return Err(CoreError::Unavailable(format!(
                    "目标 {} 返回状态码 {}",
                    target.address, response.status
                )));
            }
        }
        Ok(())
    }

    /// 项目内每个策略的每个事件类型最近一次触发的时间
    pub async fn list_group_by_event_type(
        &self,
        project_id: i64,
    ) -> CoreResult<Vec<PolicyTriggerView>> {
        let mut views = Vec::new();
        for policy in self.policy_repo.list(project_id).await? {
            let last: HashMap<EventType, DateTime<Utc>> = self
                .job_repo
                .last_triggered(policy.id)
                .await?
                .into_iter()
                .map(|t| (t.event_type, t.last_trigger_time))
                .collect();
            views.extend(policy.event_types.iter().map(|event_type| PolicyTriggerView {
                policy_id: policy.id,
                policy_name: policy.name.clone(),
                event_type: *event_type,
                enabled: policy.enabled,
                creator: policy.creator.clone(),
                creation_time: policy.created_at,
                last_trigger_time: last.get(event_type).copied(),
            }));
        }
        Ok(views)
    }

    /// 删除项目下的全部策略及投递记录
    pub async fn delete_by_project(&self, project_id: i64) -> CoreResult<()> {
        for policy in self.policy_repo.list(project_id).await? {
            self.job_repo.delete_by_policy(policy.id).await?;
        }
        let deleted = self.policy_repo.delete_by_project(project_id).await?;
        info!("项目 {} 的 {} 个webhook策略已删除", project_id, deleted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobcore_core::ErrorKind;
    use jobcore_domain::webhook::WebhookJob;
    use jobcore_testing_utils::{RecordingWebhookSender, TestDatabase, WebhookPolicyBuilder};

    async fn setup() -> (TestDatabase, RecordingWebhookSender, WebhookPolicyManager) {
        let db = TestDatabase::new().await;
        let sender = RecordingWebhookSender::new();
        let manager = WebhookPolicyManager::new(
            db.webhook_policies.clone(),
            db.webhook_jobs.clone(),
            Arc::new(sender.clone()),
        );
        (db, sender, manager)
    }

    #[tokio::test]
    async fn test_related_policies_skip_disabled() {
        let (_db, _sender, manager) = setup().await;
        let enabled = manager
            .create(
                &WebhookPolicyBuilder::new(1, "enabled")
                    .target("http://a.local/hook")
                    .event(EventType::PushImage)
                    .build(),
            )
            .await
            .unwrap();
        manager
            .create(
                &WebhookPolicyBuilder::new(1, "disabled")
                    .target("http://b.local/hook")
                    .event(EventType::PushImage)
                    .enabled(false)
                    .build(),
            )
            .await
            .unwrap();
        manager
            .create(
                &WebhookPolicyBuilder::new(1, "pull-only")
                    .target("http://c.local/hook")
                    .event(EventType::PullImage)
                    .build(),
            )
            .await
            .unwrap();

        let related = manager
            .get_related_policies(1, EventType::PushImage)
            .await
            .unwrap();
        assert_eq!(related.iter().map(|p| p.id).collect::<Vec<_>>(), vec![enabled]);
        assert!(manager
            .get_related_policies(2, EventType::PushImage)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let (_db, _sender, manager) = setup().await;
        let policy = WebhookPolicyBuilder::new(1, "dup")
            .target("http://a.local/hook")
            .event(EventType::PushImage)
            .build();
        manager.create(&policy).await.unwrap();
        assert_eq!(
            manager.create(&policy).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );
        assert!(manager
            .get_by_name_and_project("dup", 1)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_endpoint_does_not_persist_jobs() {
        let (db, sender, manager) = setup().await;
        let policy = WebhookPolicyBuilder::new(1, "t")
            .target("http://a.local/hook")
            .event(EventType::PushImage)
            .build();

        manager.test(&policy, "admin").await.unwrap();
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&sent[0].1).unwrap();
        assert_eq!(body["type"], "testEndpoint");

        sender.respond_with(500);
        assert_eq!(
            manager.test(&policy, "admin").await.unwrap_err().kind(),
            ErrorKind::Unavailable
        );
        sender.fail_next(1);
        assert_eq!(
            manager.test(&policy, "admin").await.unwrap_err().kind(),
            ErrorKind::Unavailable
        );
        assert!(db.webhook_jobs.list(&Default::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_group_by_event_type_and_delete_by_project() {
        let (db, _sender, manager) = setup().await;
        let id = manager
            .create(
                &WebhookPolicyBuilder::new(3, "grouped")
                    .target("http://a.local/hook")
                    .event(EventType::PushImage)
                    .event(EventType::DeleteImage)
                    .build(),
            )
            .await
            .unwrap();
        db.webhook_jobs
            .create(&WebhookJob::new(id, EventType::PushImage, "http", "{}".to_string()))
            .await
            .unwrap();

        let views = manager.list_group_by_event_type(3).await.unwrap();
        assert_eq!(views.len(), 2);
        let push = views.iter().find(|v| v.event_type == EventType::PushImage).unwrap();
        assert!(push.last_trigger_time.is_some());
        let delete = views.iter().find(|v| v.event_type == EventType::DeleteImage).unwrap();
        assert!(delete.last_trigger_time.is_none());

        manager.delete_by_project(3).await.unwrap();
        assert!(manager.list(3).await.unwrap().is_empty());
        assert!(db.webhook_jobs.list(&Default::default()).await.unwrap().is_empty());
    }
}
