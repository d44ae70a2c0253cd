use std::sync::Arc;

use tracing::{debug, instrument, warn};

use jobcore_core::{
    models::{HookUrls, JobData, TaskStatus},
    traits::JobServiceClient,
    CoreResult,
};
use jobcore_domain::{repositories::WebhookJobRepository, webhook::WebhookJob};
use jobcore_infrastructure::{MetricsCollector, StructuredLogger};

/// webhook 投递作业的提交与状态跟踪
pub struct HookManager {
    job_repo: Arc<dyn WebhookJobRepository>,
    jobservice: Arc<dyn JobServiceClient>,
    hooks: HookUrls,
    metrics: Arc<MetricsCollector>,
}

impl HookManager {
    pub fn new(
        job_repo: Arc<dyn WebhookJobRepository>,
        jobservice: Arc<dyn JobServiceClient>,
        hooks: HookUrls,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            job_repo,
            jobservice,
            hooks,
            metrics,
        }
    }

    /// 记录投递作业并提交到 worker pool，返回投递记录ID
    ///
    /// 提交成功后只在记录仍为 Pending 时切换到 Running，避免覆盖先到的完成回调。
    #[instrument(skip(self, job, job_data), fields(policy_id = job.policy_id, event_type = %job.event_type))]
    pub async fn start_hook(&self, job: WebhookJob, mut job_data: JobData) -> CoreResult<i64> {
        let id = self.job_repo.create(&job).await?;
        job_data.status_hook = self.hooks.webhook_job(id);

        let uuid = match self.jobservice.submit_job(&job_data).await {
            Ok(uuid) => uuid,
            Err(e) => {
                StructuredLogger::log_webhook_failed(id, job.policy_id, &e.to_string());
                self.metrics.record_webhook_failed(job.event_type.as_str());
                if let Err(update_err) = self
                    .job_repo
                    .update_status(id, TaskStatus::Error, &[TaskStatus::Pending])
                    .await
                {
                    warn!("标记投递记录 {} 失败时出错: {}", id, update_err);
                }
                return Err(e);
            }
        };

        self.job_repo.update_uuid(id, &uuid).await?;
        self.job_repo
            .update_status(id, TaskStatus::Running, &[TaskStatus::Pending])
            .await?;

        StructuredLogger::log_webhook_submitted(id, job.policy_id, job.event_type.as_str(), &uuid);
        self.metrics.record_webhook_submitted(job.event_type.as_str());
        Ok(id)
    }

    /// 按 worker pool 回调更新投递状态，只允许向前推进
    pub async fn update_job_status(&self, id: i64, status: TaskStatus) -> CoreResult<bool> {
        let updated = self
            .job_repo
            .update_status(id, status, &status.predecessors())
            .await?;
        if !updated {
            debug!("投递记录 {} 的状态 {} 未生效", id, status);
        }
        Ok(updated)
    }
}
