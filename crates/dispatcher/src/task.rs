use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use jobcore_core::{
    models::{
        ExecutionStatus, ExtraAttrs, HookUrls, JobAction, JobData, Task, TaskQuery, TaskStatus,
    },
    traits::{ExecutionRepository, JobServiceClient, TaskRepository, TaskService},
    CoreError, CoreResult,
};
use jobcore_infrastructure::{MetricsCollector, StructuredLogger};

/// 扩展属性比较写入的重试次数
const EXTRA_ATTRS_RETRIES: usize = 5;

/// 等待任务终态时的轮询间隔
pub(crate) const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 任务管理器
///
/// 任务先以 Pending 落库再提交到 worker pool，状态只随带版本号的回调前进。
pub struct TaskManager {
    task_repo: Arc<dyn TaskRepository>,
    execution_repo: Arc<dyn ExecutionRepository>,
    jobservice: Arc<dyn JobServiceClient>,
    hooks: HookUrls,
    metrics: Arc<MetricsCollector>,
    stop_timeout: Duration,
}

impl TaskManager {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        execution_repo: Arc<dyn ExecutionRepository>,
        jobservice: Arc<dyn JobServiceClient>,
        hooks: HookUrls,
        metrics: Arc<MetricsCollector>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            task_repo,
            execution_repo,
            jobservice,
            hooks,
            metrics,
            stop_timeout,
        }
    }

    async fn refresh_execution(&self, execution_id: i64) -> CoreResult<()> {
        let status = self.execution_repo.refresh_status(execution_id).await?;
        if status.is_final() {
            StructuredLogger::log_execution_status(execution_id, status.as_str(), "");
        }
        Ok(())
    }

    /// 提交失败时停止执行下其余未结束的任务，有限等待后将执行标记为 Error
    async fn abort_execution(&self, execution_id: i64, message: &str) -> CoreResult<()> {
        let tasks = self
            .task_repo
            .list(&TaskQuery::by_execution(execution_id))
            .await?;
        for task in tasks.iter().filter(|t| !t.status.is_final()) {
            if let Err(e) = self.stop(task.id).await {
                warn!("停止任务 {} 失败: {}", task.id, e);
            }
        }

        let deadline = Instant::now() + self.stop_timeout;
        loop {
            if self.execution_repo.refresh_status(execution_id).await?.is_final() {
                break;
            }
            if Instant::now() >= deadline {
                warn!("等待执行 {} 停止超时", execution_id);
                break;
            }
            sleep(STOP_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))).await;
        }

        self.execution_repo
            .update_status(execution_id, ExecutionStatus::Error, message)
            .await?;
        StructuredLogger::log_execution_status(execution_id, ExecutionStatus::Error.as_str(), message);
        Ok(())
    }
}

#[async_trait]
impl TaskService for TaskManager {
    #[instrument(skip(self, job, extra_attrs), fields(job_name = %job.name))]
    async fn create(
        &self,
        execution_id: i64,
        mut job: JobData,
        extra_attrs: ExtraAttrs,
    ) -> CoreResult<i64> {
        let execution = self.execution_repo.get(execution_id).await?;
        let task = Task::new(execution_id, execution.vendor_type, extra_attrs);
        let id = self.task_repo.create(&task).await?;
        // 新任务使已终态的执行回到 Running
        self.refresh_execution(execution_id).await?;

        job.status_hook = self.hooks.task(id);
        match self.jobservice.submit_job(&job).await {
            Ok(job_id) => {
                self.task_repo.update_job_id(id, &job_id).await?;
                StructuredLogger::log_task_submitted(id, execution_id, &job_id);
                Ok(id)
            }
            Err(e) => {
                warn!("任务 {} 提交失败: {}", id, e);
                self.task_repo
                    .update_status(id, TaskStatus::Error, task.status_revision, &e.to_string())
                    .await?;
                if let Err(abort_err) = self.abort_execution(execution_id, &e.to_string()).await {
                    warn!("标记执行 {} 失败出错: {}", execution_id, abort_err);
                }
                Err(e)
            }
        }
    }

    /// 没有作业句柄的任务直接在本地标记为 Stopped，其余由 worker pool 回调推进
    #[instrument(skip(self))]
    async fn stop(&self, id: i64) -> CoreResult<()> {
        let task = self.task_repo.get(id).await?;
        if task.status.is_final() {
            debug!("任务 {} 已处于终态 {}", id, task.status);
            return Ok(());
        }

        match task.job_id.as_deref() {
            Some(job_id) => self.jobservice.post_action(job_id, JobAction::Stop).await,
            None => {
                self.task_repo
                    .update_status(id, TaskStatus::Stopped, task.status_revision, "任务未提交即被停止")
                    .await?;
                self.refresh_execution(task.execution_id).await
            }
        }
    }

    async fn get(&self, id: i64) -> CoreResult<Task> {
        self.task_repo.get(id).await
    }

    async fn list(&self, query: &TaskQuery) -> CoreResult<Vec<Task>> {
        self.task_repo.list(query).await
    }

    async fn count(&self, query: &TaskQuery) -> CoreResult<i64> {
        self.task_repo.count(query).await
    }

    async fn get_log(&self, id: i64) -> CoreResult<Vec<u8>> {
        let task = self.task_repo.get(id).await?;
        let job_id = task
            .job_id
            .ok_or_else(|| CoreError::not_found("任务日志", id))?;
        self.jobservice.get_job_log(&job_id).await
    }

    #[instrument(skip(self, message))]
    async fn update_status(
        &self,
        id: i64,
        status: TaskStatus,
        revision: i64,
        message: &str,
    ) -> CoreResult<bool> {
        let applied = self
            .task_repo
            .update_status(id, status, revision, message)
            .await?;
        self.metrics.record_task_status(status.as_str(), applied);
        if !applied {
            StructuredLogger::log_stale_status(id, status.as_str(), revision);
            return Ok(false);
        }

        if status.is_final() {
            let task = self.task_repo.get(id).await?;
            self.refresh_execution(task.execution_id).await?;
        }
        Ok(true)
    }

    async fn update_extra_attrs(&self, id: i64, patch: &ExtraAttrs) -> CoreResult<()> {
        for _ in 0..EXTRA_ATTRS_RETRIES {
            let task = self.task_repo.get(id).await?;
            let mut merged = task.extra_attrs.clone();
            merged.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
            if merged == task.extra_attrs {
                return Ok(());
            }
            if self
                .task_repo
                .compare_and_set_extra_attrs(id, &task.extra_attrs, &merged)
                .await?
            {
                return Ok(());
            }
            debug!("任务 {} 的扩展属性被并发修改，重试", id);
        }
        Err(CoreError::Conflict(format!("任务 {id} 的扩展属性被并发修改")))
    }

    async fn update_check_in(&self, id: i64, comment: &str) -> CoreResult<()> {
        self.task_repo.update_check_in(id, comment).await?;
        info!("任务 {} 收到check-in", id);
        Ok(())
    }
}
