//! 领域仓储抽象
//!
//! 不可变规则、保留策略与 webhook 相关的数据访问接口

use async_trait::async_trait;
use jobcore_core::models::TaskStatus;
use jobcore_core::CoreResult;

use crate::immutable::ImmutableRule;
use crate::retention::RetentionPolicy;
use crate::webhook::{LastTrigger, WebhookJob, WebhookJobQuery, WebhookPolicy};

/// 不可变tag规则仓储
#[async_trait]
pub trait ImmutableRuleRepository: Send + Sync {
    /// 同一项目下规则内容重复时返回 Conflict
    async fn create(&self, rule: &ImmutableRule) -> CoreResult<i64>;
    async fn update(&self, rule: &ImmutableRule) -> CoreResult<()>;
    async fn get(&self, id: i64) -> CoreResult<ImmutableRule>;
    async fn delete(&self, id: i64) -> CoreResult<()>;
    async fn list(&self, project_id: i64, only_enabled: bool) -> CoreResult<Vec<ImmutableRule>>;
    async fn set_disabled(&self, id: i64, disabled: bool) -> CoreResult<()>;
    async fn delete_by_project(&self, project_id: i64) -> CoreResult<u64>;
}

/// 保留策略仓储
#[async_trait]
pub trait RetentionPolicyRepository: Send + Sync {
    async fn create(&self, policy: &RetentionPolicy) -> CoreResult<i64>;
    async fn get(&self, id: i64) -> CoreResult<RetentionPolicy>;
    async fn update(&self, policy: &RetentionPolicy) -> CoreResult<()>;
    async fn delete(&self, id: i64) -> CoreResult<()>;
    async fn list_by_project(&self, project_id: i64) -> CoreResult<Vec<RetentionPolicy>>;
}

/// webhook 策略仓储
#[async_trait]
pub trait WebhookPolicyRepository: Send + Sync {
    /// 同一项目下名称重复时返回 Conflict
    async fn create(&self, policy: &WebhookPolicy) -> CoreResult<i64>;
    async fn update(&self, policy: &WebhookPolicy) -> CoreResult<()>;
    async fn delete(&self, id: i64) -> CoreResult<()>;
    async fn get(&self, id: i64) -> CoreResult<WebhookPolicy>;
    async fn get_by_name(&self, project_id: i64, name: &str) -> CoreResult<Option<WebhookPolicy>>;
    async fn list(&self, project_id: i64) -> CoreResult<Vec<WebhookPolicy>>;
    async fn delete_by_project(&self, project_id: i64) -> CoreResult<u64>;
}

/// webhook 投递记录仓储
#[async_trait]
pub trait WebhookJobRepository: Send + Sync {
    async fn create(&self, job: &WebhookJob) -> CoreResult<i64>;
    async fn get(&self, id: i64) -> CoreResult<WebhookJob>;
    async fn list(&self, query: &WebhookJobQuery) -> CoreResult<Vec<WebhookJob>>;
    async fn update_uuid(&self, id: i64, uuid: &str) -> CoreResult<()>;
    /// 仅当当前状态属于 `from` 时更新，返回是否生效
    async fn update_status(&self, id: i64, status: TaskStatus, from: &[TaskStatus])
        -> CoreResult<bool>;
    /// 按事件类型统计最近一次触发时间
    async fn last_triggered(&self, policy_id: i64) -> CoreResult<Vec<LastTrigger>>;
    async fn delete_by_policy(&self, policy_id: i64) -> CoreResult<u64>;
}
