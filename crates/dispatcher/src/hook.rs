//! worker pool 状态回调的分发

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use jobcore_core::{
    models::{StatusChange, Task, TaskStatus},
    traits::TaskService,
    CoreResult,
};

use crate::scheduler::PeriodicScheduler;
use crate::webhook::HookManager;

/// 按 vendor 类型处理任务的 check-in 消息
#[async_trait]
pub trait CheckInProcessor: Send + Sync {
    async fn process(&self, task: &Task, check_in: &str) -> CoreResult<()>;
}

/// 四个回调端点共用的处理器
pub struct HookHandler {
    tasks: Arc<dyn TaskService>,
    scheduler: Arc<PeriodicScheduler>,
    webhooks: Arc<HookManager>,
    check_in_processors: HashMap<String, Arc<dyn CheckInProcessor>>,
}

impl HookHandler {
    pub fn new(
        tasks: Arc<dyn TaskService>,
        scheduler: Arc<PeriodicScheduler>,
        webhooks: Arc<HookManager>,
    ) -> Self {
        Self {
            tasks,
            scheduler,
            webhooks,
            check_in_processors: HashMap::new(),
        }
    }

    pub fn with_check_in_processor(
        mut self,
        vendor_type: &str,
        processor: Arc<dyn CheckInProcessor>,
    ) -> Self {
        self.check_in_processors
            .insert(vendor_type.to_string(), processor);
        self
    }

    /// 通用任务回调：check-in 交给对应的处理器，其余按版本号更新状态
    #[instrument(skip(self, change), fields(status = %change.status, revision = change.revision))]
    pub async fn handle_task_hook(&self, task_id: i64, change: &StatusChange) -> CoreResult<()> {
        if !change.check_in.is_empty() {
            self.tasks.update_check_in(task_id, &change.check_in).await?;
            let task = self.tasks.get(task_id).await?;
            if let Some(processor) = self.check_in_processors.get(&task.vendor_type) {
                processor.process(&task, &change.check_in).await?;
            } else {
                debug!("vendor {} 没有注册check-in处理器", task.vendor_type);
            }
            return Ok(());
        }

        self.tasks
            .update_status(task_id, TaskStatus::from(change.status), change.revision, "")
            .await?;
        Ok(())
    }

    /// 旧版作业回调，与通用任务回调处理方式相同
    pub async fn handle_admin_job_hook(&self, task_id: i64, change: &StatusChange) -> CoreResult<()> {
        self.handle_task_hook(task_id, change).await
    }

    pub async fn handle_schedule_hook(
        &self,
        schedule_id: i64,
        change: &StatusChange,
    ) -> CoreResult<()> {
        self.scheduler.handle_legacy_hook(schedule_id, change).await
    }

    pub async fn handle_webhook_hook(&self, job_id: i64, change: &StatusChange) -> CoreResult<()> {
        self.webhooks
            .update_job_status(job_id, TaskStatus::from(change.status))
            .await?;
        Ok(())
    }
}
