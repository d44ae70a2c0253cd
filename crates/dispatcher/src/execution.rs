use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

use jobcore_core::{
    config::models::ExecutionConfig,
    models::{Execution, ExecutionQuery, ExecutionStatus, ExtraAttrs, TaskQuery, Trigger},
    traits::{ExecutionRepository, ExecutionService, TaskService},
    CoreError, CoreResult,
};
use jobcore_infrastructure::{MetricsCollector, StructuredLogger};

use crate::task::STOP_POLL_INTERVAL;

/// 执行记录清理器
///
/// 每个 (vendor_type, vendor_id) 只保留最近的 N 条执行，只删除已终态的执行。
pub struct Sweeper {
    execution_repo: Arc<dyn ExecutionRepository>,
    counts: HashMap<String, u32>,
    permits: Arc<Semaphore>,
    metrics: Arc<MetricsCollector>,
}

impl Sweeper {
    pub fn new(
        execution_repo: Arc<dyn ExecutionRepository>,
        config: &ExecutionConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let counts = config
            .sweep_counts
            .iter()
            .map(|(vendor, count)| (vendor.to_uppercase(), *count))
            .collect();
        Self {
            execution_repo,
            counts,
            permits: Arc::new(Semaphore::new(config.sweep_concurrency.max(1))),
            metrics,
        }
    }

    /// vendor 类型的保留数量，未配置的类型不清理
    pub fn retain_count(&self, vendor_type: &str) -> Option<u32> {
        self.counts.get(&vendor_type.to_uppercase()).copied()
    }

    /// 删除超出保留数量的终态执行，返回删除数量
    #[instrument(skip(self))]
    pub async fn sweep(&self, vendor_type: &str, vendor_id: i64) -> CoreResult<usize> {
        let Some(keep) = self.retain_count(vendor_type) else {
            return Ok(0);
        };

        let executions = self
            .execution_repo
            .list(&ExecutionQuery::by_vendor(vendor_type, vendor_id))
            .await?;
        let mut deleted = 0;
        for execution in executions.iter().skip(keep as usize) {
            if !execution.status.is_final() {
                continue;
            }
            match self.execution_repo.delete(execution.id).await {
                Ok(()) => deleted += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!("清理执行 {} 失败: {}", execution.id, e),
            }
        }

        if deleted > 0 {
            StructuredLogger::log_sweep(vendor_type, vendor_id, deleted);
            self.metrics.record_executions_swept(vendor_type, deleted);
        }
        Ok(deleted)
    }

    /// 在后台执行清理，并发数受信号量限制
    pub fn spawn(self: &Arc<Self>, vendor_type: &str, vendor_id: i64) {
        if self.retain_count(vendor_type).is_none() {
            return;
        }
        let sweeper = self.clone();
        let vendor_type = vendor_type.to_string();
        tokio::spawn(async move {
            let Ok(_permit) = sweeper.permits.clone().acquire_owned().await else {
                return;
            };
            if let Err(e) = sweeper.sweep(&vendor_type, vendor_id).await {
                warn!("清理 {}:{} 的执行记录失败: {}", vendor_type, vendor_id, e);
            }
        });
    }
}

/// 执行管理器
pub struct ExecutionManager {
    execution_repo: Arc<dyn ExecutionRepository>,
    task_service: Arc<dyn TaskService>,
    sweeper: Arc<Sweeper>,
    metrics: Arc<MetricsCollector>,
}

impl ExecutionManager {
    pub fn new(
        execution_repo: Arc<dyn ExecutionRepository>,
        task_service: Arc<dyn TaskService>,
        sweeper: Arc<Sweeper>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            execution_repo,
            task_service,
            sweeper,
            metrics,
        }
    }

    async fn set_status(&self, id: i64, status: ExecutionStatus, message: &str) -> CoreResult<()> {
        self.execution_repo.update_status(id, status, message).await?;
        StructuredLogger::log_execution_status(id, status.as_str(), message);
        Ok(())
    }

    async fn ensure_deletable(&self, execution: &Execution) -> CoreResult<()> {
        let metrics = self.execution_repo.metrics(execution.id).await?;
        let unfinished =
            metrics.pending_task_count + metrics.scheduled_task_count + metrics.running_task_count;
        if unfinished > 0 {
            return Err(CoreError::Conflict(format!(
                "执行 {} 仍有 {} 个未结束的任务",
                execution.id, unfinished
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionService for ExecutionManager {
    #[instrument(skip(self, extra_attrs))]
    async fn create(
        &self,
        vendor_type: &str,
        vendor_id: i64,
        trigger: Trigger,
        extra_attrs: ExtraAttrs,
    ) -> CoreResult<i64> {
        let execution = Execution::new(vendor_type, vendor_id, trigger, extra_attrs);
        let id = self.execution_repo.create(&execution).await?;

        StructuredLogger::log_execution_created(id, vendor_type, vendor_id, trigger.as_str());
        self.metrics.record_execution_created(vendor_type);
        self.sweeper.spawn(vendor_type, vendor_id);
        Ok(id)
    }

    async fn mark_done(&self, id: i64, message: &str) -> CoreResult<()> {
        self.set_status(id, ExecutionStatus::Success, message).await
    }

    async fn mark_error(&self, id: i64, message: &str) -> CoreResult<()> {
        self.set_status(id, ExecutionStatus::Error, message).await
    }

    #[instrument(skip(self))]
    async fn stop(&self, id: i64) -> CoreResult<()> {
        let execution = self.execution_repo.get(id).await?;
        let tasks = self.task_service.list(&TaskQuery::by_execution(id)).await?;

        if tasks.is_empty() {
            if !execution.status.is_final() {
                self.set_status(id, ExecutionStatus::Stopped, "").await?;
            }
            return Ok(());
        }

        let mut last_err = None;
        for task in tasks.iter().filter(|t| !t.status.is_final()) {
            if let Err(e) = self.task_service.stop(task.id).await {
                warn!("停止任务 {} 失败: {}", task.id, e);
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn stop_and_wait(&self, id: i64, timeout: Duration) -> CoreResult<bool> {
        self.stop(id).await?;

        let deadline = Instant::now() + timeout;
        loop {
            let status = self.execution_repo.refresh_status(id).await?;
            if status.is_final() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                warn!("等待执行 {} 停止超时", id);
                return Ok(false);
            }
            sleep(STOP_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }

    async fn stop_and_wait_with_error(
        &self,
        id: i64,
        timeout: Duration,
        message: &str,
    ) -> CoreResult<()> {
        match self.stop_and_wait(id, timeout).await {
            Ok(true) => {}
            Ok(false) => warn!("执行 {} 未能在超时前全部停止", id),
            Err(e) => warn!("停止执行 {} 失败: {}", id, e),
        }
        self.mark_error(id, message).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> CoreResult<()> {
        let execution = self.execution_repo.get(id).await?;
        self.ensure_deletable(&execution).await?;
        self.execution_repo.delete(id).await?;
        debug!("执行 {} 已删除", id);
        Ok(())
    }

    async fn delete_by_vendor(&self, vendor_type: &str, vendor_id: i64) -> CoreResult<()> {
        let executions = self
            .execution_repo
            .list(&ExecutionQuery::by_vendor(vendor_type, vendor_id))
            .await?;
        for execution in &executions {
            self.ensure_deletable(execution).await?;
        }
        for execution in &executions {
            self.execution_repo.delete(execution.id).await?;
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> CoreResult<Execution> {
        self.execution_repo.get(id).await
    }

    async fn list(&self, query: &ExecutionQuery) -> CoreResult<Vec<Execution>> {
        self.execution_repo.list(query).await
    }

    async fn count(&self, query: &ExecutionQuery) -> CoreResult<i64> {
        self.execution_repo.count(query).await
    }

    async fn update_extra_attrs(&self, id: i64, extra_attrs: &ExtraAttrs) -> CoreResult<()> {
        self.execution_repo.update_extra_attrs(id, extra_attrs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskManager;
    use jobcore_core::models::{vendor, HookUrls, JobData, JobMetadata, TaskStatus};
    use jobcore_core::ErrorKind;
    use jobcore_testing_utils::{MockJobServiceClient, TestDatabase};

    struct Fixture {
        db: TestDatabase,
        jobservice: MockJobServiceClient,
        tasks: Arc<TaskManager>,
        executions: ExecutionManager,
        sweeper: Arc<Sweeper>,
    }

    fn config(keep: u32) -> ExecutionConfig {
        let mut config = ExecutionConfig::default();
        config.sweep_counts.insert(vendor::RETENTION.to_string(), keep);
        config
    }

    async fn fixture(keep: u32) -> Fixture {
        let db = TestDatabase::new().await;
        let jobservice = MockJobServiceClient::new();
        let metrics = Arc::new(MetricsCollector::new());
        let tasks = Arc::new(TaskManager::new(
            db.tasks.clone(),
            db.executions.clone(),
            Arc::new(jobservice.clone()),
            HookUrls::new("http://core"),
            metrics.clone(),
            Duration::from_millis(50),
        ));
        let sweeper = Arc::new(Sweeper::new(db.executions.clone(), &config(keep), metrics.clone()));
        let executions =
            ExecutionManager::new(db.executions.clone(), tasks.clone(), sweeper.clone(), metrics);
        Fixture {
            db,
            jobservice,
            tasks,
            executions,
            sweeper,
        }
    }

    fn job() -> JobData {
        JobData::new(vendor::RETENTION, Default::default(), JobMetadata::generic())
    }

    #[tokio::test]
    async fn test_mark_done_and_error() {
        let f = fixture(50).await;
        let done = f
            .executions
            .create(vendor::RETENTION, 1, Trigger::Manual, Default::default())
            .await
            .unwrap();
        f.executions.mark_done(done, "no resources for retention").await.unwrap();
        let execution = f.executions.get(done).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.status_message, "no resources for retention");

        let failed = f
            .executions
            .create(vendor::RETENTION, 1, Trigger::Scheduled, Default::default())
            .await
            .unwrap();
        f.executions.mark_error(failed, "boom").await.unwrap();
        assert_eq!(
            f.executions.get(failed).await.unwrap().status,
            ExecutionStatus::Error
        );
    }

    #[tokio::test]
    async fn test_stop_without_tasks() {
        let f = fixture(50).await;
        let id = f
            .executions
            .create(vendor::RETENTION, 1, Trigger::Manual, Default::default())
            .await
            .unwrap();
        assert!(f.executions.stop_and_wait(id, Duration::from_secs(1)).await.unwrap());
        assert_eq!(
            f.executions.get(id).await.unwrap().status,
            ExecutionStatus::Stopped
        );
    }

    #[tokio::test]
    async fn test_stop_and_wait_follows_callbacks() {
        let f = fixture(50).await;
        let id = f
            .executions
            .create(vendor::RETENTION, 1, Trigger::Manual, Default::default())
            .await
            .unwrap();
        let task_id = f.tasks.create(id, job(), Default::default()).await.unwrap();
        let job_id = f.tasks.get(task_id).await.unwrap().job_id.unwrap();

        // worker pool 没有回调时等待超时
        assert!(!f
            .executions
            .stop_and_wait(id, Duration::from_millis(300))
            .await
            .unwrap());
        assert!(f
            .jobservice
            .actions()
            .iter()
            .any(|(uuid, action)| uuid == &job_id && *action == jobcore_core::models::JobAction::Stop));

        f.tasks
            .update_status(task_id, TaskStatus::Stopped, 1, "")
            .await
            .unwrap();
        assert!(f.executions.stop_and_wait(id, Duration::from_secs(1)).await.unwrap());
        assert_eq!(
            f.executions.get(id).await.unwrap().status,
            ExecutionStatus::Stopped
        );
    }

    #[tokio::test]
    async fn test_delete_requires_final_tasks() {
        let f = fixture(50).await;
        let id = f
            .executions
            .create(vendor::RETENTION, 5, Trigger::Manual, Default::default())
            .await
            .unwrap();
        let task_id = f.tasks.create(id, job(), Default::default()).await.unwrap();

        let err = f.executions.delete(id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            f.executions
                .delete_by_vendor(vendor::RETENTION, 5)
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::Conflict
        );

        f.tasks
            .update_status(task_id, TaskStatus::Success, 1, "")
            .await
            .unwrap();
        f.executions.delete_by_vendor(vendor::RETENTION, 5).await.unwrap();
        assert!(f.executions.get(id).await.unwrap_err().is_not_found());
        assert!(f.db.tasks.get(task_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_sweep_keeps_newest_final_executions() {
        let f = fixture(2).await;
        let mut ids = Vec::new();
        for _ in 0..4 {
            let id = f
                .db
                .executions
                .create(&Execution::new(vendor::RETENTION, 8, Trigger::Manual, Default::default()))
                .await
                .unwrap();
            ids.push(id);
        }
        // 最旧的一条仍在运行，不应被删除
        for id in &ids[1..] {
            f.executions.mark_done(*id, "").await.unwrap();
        }

        let deleted = f.sweeper.sweep(vendor::RETENTION, 8).await.unwrap();
        assert_eq!(deleted, 1);
        let remaining: Vec<i64> = f
            .executions
            .list(&ExecutionQuery::by_vendor(vendor::RETENTION, 8))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(remaining, vec![ids[3], ids[2], ids[0]]);

        assert_eq!(f.sweeper.retain_count("retention"), Some(2));
        assert_eq!(f.sweeper.sweep(vendor::WEBHOOK, 8).await.unwrap(), 0);
    }
}
