//! 系统制品清理的周期调度与执行

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use jobcore_core::{
    models::{vendor, ExtraAttrs, JobData, JobMetadata, Schedule, ScheduleQuery, Trigger},
    traits::{ExecutionService, SchedulerService, TaskService},
    CoreError, CoreResult,
};

use crate::callback::CallbackRegistry;

/// 系统级清理只有一个调度，vendor_id 固定为0
const CLEANUP_VENDOR_ID: i64 = 0;
const CRON_TYPE_CUSTOM: &str = "Custom";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupCallbackParam {
    pub trigger: Trigger,
}

pub struct SystemArtifactCleanupController {
    scheduler: Arc<dyn SchedulerService>,
    executions: Arc<dyn ExecutionService>,
    tasks: Arc<dyn TaskService>,
}

impl SystemArtifactCleanupController {
    pub fn new(
        scheduler: Arc<dyn SchedulerService>,
        executions: Arc<dyn ExecutionService>,
        tasks: Arc<dyn TaskService>,
    ) -> Self {
        Self {
            scheduler,
            executions,
            tasks,
        }
    }

    pub fn register_callbacks(self: &Arc<Self>, registry: &CallbackRegistry) -> CoreResult<()> {
        let controller: Weak<Self> = Arc::downgrade(self);
        registry.register_typed(
            vendor::SYSTEM_ARTIFACT_CLEANUP,
            move |param: CleanupCallbackParam| {
                let controller = controller.clone();
                async move {
                    let controller = controller
                        .upgrade()
                        .ok_or_else(|| CoreError::Internal("清理控制器已释放".to_string()))?;
                    controller.start(param.trigger).await?;
                    Ok(())
                }
            },
        )
    }

    /// 替换现有的清理调度
    #[instrument(skip(self))]
    pub async fn schedule(&self, cron: &str) -> CoreResult<i64> {
        self.unschedule().await?;
        let param = serde_json::to_value(CleanupCallbackParam {
            trigger: Trigger::Scheduled,
        })?;
        let schedule = Schedule::new(
            vendor::SYSTEM_ARTIFACT_CLEANUP,
            CLEANUP_VENDOR_ID,
            CRON_TYPE_CUSTOM,
            cron,
            vendor::SYSTEM_ARTIFACT_CLEANUP,
            param,
            ExtraAttrs::new(),
        );
        self.scheduler.schedule(schedule).await
    }

    pub async fn unschedule(&self) -> CoreResult<()> {
        self.scheduler
            .unschedule_by_vendor(vendor::SYSTEM_ARTIFACT_CLEANUP, CLEANUP_VENDOR_ID)
            .await
    }

    pub async fn get_schedule(&self) -> CoreResult<Option<Schedule>> {
        let query = ScheduleQuery::by_vendor(vendor::SYSTEM_ARTIFACT_CLEANUP, CLEANUP_VENDOR_ID);
        Ok(self.scheduler.list_schedules(&query).await?.into_iter().next())
    }

    /// 创建一次清理执行及其唯一的任务，返回执行ID
    #[instrument(skip(self))]
    pub async fn start(&self, trigger: Trigger) -> CoreResult<i64> {
        let execution_id = self
            .executions
            .create(
                vendor::SYSTEM_ARTIFACT_CLEANUP,
                CLEANUP_VENDOR_ID,
                trigger,
                ExtraAttrs::new(),
            )
            .await?;

        let job = JobData::new(
            vendor::SYSTEM_ARTIFACT_CLEANUP,
            Default::default(),
            JobMetadata::generic(),
        );
        let mut extra_attrs = ExtraAttrs::new();
        extra_attrs.insert("trigger".to_string(), json!(trigger));

        // 提交失败时任务管理器已将执行标记为 Error
        self.tasks.create(execution_id, job, extra_attrs).await?;

        info!("系统制品清理执行 {} 已启动", execution_id);
        Ok(execution_id)
    }
}
