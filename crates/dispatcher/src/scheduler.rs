use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use jobcore_core::{
    models::{
        vendor, HookUrls, JobAction, JobData, JobMetadata, JobStatus, Schedule, ScheduleQuery,
        StatusChange,
    },
    traits::{JobServiceClient, ScheduleRepository, SchedulerService},
    validate_cron_expression, CoreError, CoreResult,
};
use jobcore_infrastructure::{MetricsCollector, StructuredLogger};

use crate::callback::CallbackRegistry;

/// 周期调度器
///
/// 调度记录持久化在本地，触发由 worker pool 的周期作业驱动，
/// 触发回调经 `/service/notifications/schedules/{id}` 回到本进程后按回调名称分发。
pub struct PeriodicScheduler {
    schedule_repo: Arc<dyn ScheduleRepository>,
    jobservice: Arc<dyn JobServiceClient>,
    callbacks: Arc<CallbackRegistry>,
    hooks: HookUrls,
    metrics: Arc<MetricsCollector>,
}

impl PeriodicScheduler {
    pub fn new(
        schedule_repo: Arc<dyn ScheduleRepository>,
        jobservice: Arc<dyn JobServiceClient>,
        callbacks: Arc<CallbackRegistry>,
        hooks: HookUrls,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            schedule_repo,
            jobservice,
            callbacks,
            hooks,
            metrics,
        }
    }

    /// 周期作业的描述，参数中只携带调度的身份信息
    fn periodic_job(&self, schedule: &Schedule) -> JobData {
        let mut params = serde_json::Map::new();
        params.insert("schedule_id".to_string(), json!(schedule.id));
        params.insert("vendor_type".to_string(), json!(schedule.vendor_type));
        params.insert("vendor_id".to_string(), json!(schedule.vendor_id));

        let mut job = JobData::new(
            vendor::SCHEDULER,
            params,
            JobMetadata::periodic(schedule.cron.clone()),
        );
        job.status_hook = self.hooks.schedule(schedule.id);
        job
    }

    async fn submit(&self, schedule: &Schedule) -> CoreResult<String> {
        let job_id = self.jobservice.submit_job(&self.periodic_job(schedule)).await?;
        self.schedule_repo.update_job_id(schedule.id, &job_id).await?;
        Ok(job_id)
    }

    /// 重新向 worker pool 提交周期作业，返回新的作业ID
    #[instrument(skip(self, schedule), fields(schedule_id = schedule.id))]
    pub async fn restore(&self, schedule: &Schedule) -> CoreResult<String> {
        let job_id = self.submit(schedule).await?;
        info!(
            "调度 {} 的周期作业已恢复: {} -> {}",
            schedule.id,
            schedule.job_id.as_deref().unwrap_or("-"),
            job_id
        );
        Ok(job_id)
    }

    /// 处理 worker pool 的调度回调
    ///
    /// 只有 Running 状态代表一次触发；带版本号的回调必须比已记录的版本更新。
    #[instrument(skip(self, change), fields(status = %change.status, revision = change.revision))]
    pub async fn handle_legacy_hook(&self, schedule_id: i64, change: &StatusChange) -> CoreResult<()> {
        if change.status != JobStatus::Running {
            debug!("调度 {} 收到状态 {}，无需触发", schedule_id, change.status);
            return Ok(());
        }

        let schedule = self.schedule_repo.get(schedule_id).await?;
        if change.revision > 0
            && !self
                .schedule_repo
                .update_revision(schedule_id, change.revision)
                .await?
        {
            debug!(
                "调度 {} 的回调版本 {} 已过期，忽略",
                schedule_id, change.revision
            );
            return Ok(());
        }

        StructuredLogger::log_schedule_fired(
            schedule_id,
            &schedule.callback_func_name,
            change.revision,
        );
        self.metrics
            .record_schedule_fired(&schedule.callback_func_name);
        self.callbacks
            .invoke(
                &schedule.callback_func_name,
                schedule.callback_func_param.clone(),
            )
            .await
    }
}

#[async_trait]
impl SchedulerService for PeriodicScheduler {
    #[instrument(skip(self, schedule), fields(vendor_type = %schedule.vendor_type, vendor_id = schedule.vendor_id))]
    async fn schedule(&self, mut schedule: Schedule) -> CoreResult<i64> {
        if !self.callbacks.contains(&schedule.callback_func_name) {
            return Err(CoreError::invalid(format!(
                "回调 {} 未注册",
                schedule.callback_func_name
            )));
        }
        validate_cron_expression(&schedule.cron)?;

        let id = self.schedule_repo.create(&schedule).await?;
        schedule.id = id;

        if let Err(e) = self.submit(&schedule).await {
            warn!("调度 {} 提交周期作业失败: {}，回滚调度记录", id, e);
            if let Err(delete_err) = self.schedule_repo.delete(id).await {
                warn!("回滚调度 {} 失败: {}", id, delete_err);
            }
            return Err(e);
        }

        StructuredLogger::log_schedule_created(
            id,
            &schedule.vendor_type,
            schedule.vendor_id,
            &schedule.cron,
        );
        self.metrics.record_schedule_created(&schedule.vendor_type);
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn unschedule(&self, id: i64) -> CoreResult<()> {
        let schedule = self.schedule_repo.get(id).await?;
        if let Some(job_id) = schedule.job_id.as_deref() {
            self.jobservice.post_action(job_id, JobAction::Stop).await?;
        }
        self.schedule_repo.delete(id).await?;

        StructuredLogger::log_schedule_removed(id, &schedule.vendor_type, schedule.vendor_id);
        Ok(())
    }

    async fn unschedule_by_vendor(&self, vendor_type: &str, vendor_id: i64) -> CoreResult<()> {
        let schedules = self
            .schedule_repo
            .list(&ScheduleQuery::by_vendor(vendor_type, vendor_id))
            .await?;
        for schedule in schedules {
            self.unschedule(schedule.id).await?;
        }
        Ok(())
    }

    async fn get_schedule(&self, id: i64) -> CoreResult<Schedule> {
        self.schedule_repo.get(id).await
    }

    async fn list_schedules(&self, query: &ScheduleQuery) -> CoreResult<Vec<Schedule>> {
        self.schedule_repo.list(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobcore_core::models::JobKind;
    use jobcore_core::ErrorKind;
    use jobcore_testing_utils::{MockJobServiceClient, TestDatabase};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        db: TestDatabase,
        jobservice: MockJobServiceClient,
        scheduler: PeriodicScheduler,
        fired: Arc<AtomicUsize>,
    }

    async fn fixture() -> Fixture {
        let db = TestDatabase::new().await;
        let jobservice = MockJobServiceClient::new();
        let callbacks = Arc::new(CallbackRegistry::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        callbacks
            .register_typed("RETENTION", move |_: Value| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();

        let scheduler = PeriodicScheduler::new(
            db.schedules.clone(),
            Arc::new(jobservice.clone()),
            callbacks,
            HookUrls::new("http://core:8080"),
            Arc::new(MetricsCollector::new()),
        );
        Fixture {
            db,
            jobservice,
            scheduler,
            fired,
        }
    }

    fn retention_schedule(vendor_id: i64, cron: &str) -> Schedule {
        Schedule::new(
            vendor::RETENTION,
            vendor_id,
            "Custom",
            cron,
            "RETENTION",
            json!({"policy_id": vendor_id}),
            Default::default(),
        )
    }

    fn running(revision: i64) -> StatusChange {
        StatusChange {
            job_id: "job-1".to_string(),
            status: JobStatus::Running,
            metadata: None,
            check_in: String::new(),
            revision,
        }
    }

    #[tokio::test]
    async fn test_schedule_submits_periodic_job() {
        let f = fixture().await;
        let id = f
            .scheduler
            .schedule(retention_schedule(42, "0 0 0 * * *"))
            .await
            .unwrap();

        let submitted = f.jobservice.submitted_jobs();
        assert_eq!(submitted.len(), 1);
        let (job_id, job) = &submitted[0];
        assert_eq!(job.name, vendor::SCHEDULER);
        assert_eq!(job.metadata.job_kind, Some(JobKind::Periodic));
        assert_eq!(job.metadata.cron.as_deref(), Some("0 0 0 * * *"));
        assert_eq!(
            job.status_hook,
            format!("http://core:8080/service/notifications/schedules/{id}")
        );

        let stored = f.scheduler.get_schedule(id).await.unwrap();
        assert_eq!(stored.job_id.as_ref(), Some(job_id));
    }

    #[tokio::test]
    async fn test_schedule_rejects_bad_input() {
        let f = fixture().await;

        let mut unknown = retention_schedule(1, "0 0 0 * * *");
        unknown.callback_func_name = "UNKNOWN".to_string();
        let err = f.scheduler.schedule(unknown).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = f
            .scheduler
            .schedule(retention_schedule(1, "0 0 * * *"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        f.scheduler
            .schedule(retention_schedule(1, "0 0 0 * * *"))
            .await
            .unwrap();
        let err = f
            .scheduler
            .schedule(retention_schedule(1, "1 0 0 * * *"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_submit_failure_removes_schedule() {
        let f = fixture().await;
        f.jobservice.fail_submissions();

        let err = f
            .scheduler
            .schedule(retention_schedule(7, "0 0 0 * * *"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(f
            .scheduler
            .list_schedules(&ScheduleQuery::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unschedule_then_schedule_again() {
        let f = fixture().await;
        let id = f
            .scheduler
            .schedule(retention_schedule(9, "0 0 0 * * *"))
            .await
            .unwrap();
        let job_id = f.scheduler.get_schedule(id).await.unwrap().job_id.unwrap();

        f.scheduler
            .unschedule_by_vendor(vendor::RETENTION, 9)
            .await
            .unwrap();
        assert_eq!(f.jobservice.actions(), vec![(job_id, JobAction::Stop)]);
        assert!(f.jobservice.periodic_jobs().is_empty());
        assert!(f.db.schedules.get(id).await.unwrap_err().is_not_found());

        f.scheduler
            .schedule(retention_schedule(9, "0 0 0 * * *"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hook_fires_callback_once_per_revision() {
        let f = fixture().await;
        let id = f
            .scheduler
            .schedule(retention_schedule(3, "0 0 0 * * *"))
            .await
            .unwrap();

        f.scheduler.handle_legacy_hook(id, &running(2)).await.unwrap();
        assert_eq!(f.fired.load(Ordering::SeqCst), 1);

        // 同一版本与更旧版本的回调都被丢弃
        f.scheduler.handle_legacy_hook(id, &running(2)).await.unwrap();
        f.scheduler.handle_legacy_hook(id, &running(1)).await.unwrap();
        assert_eq!(f.fired.load(Ordering::SeqCst), 1);

        let mut done = running(3);
        done.status = JobStatus::Success;
        f.scheduler.handle_legacy_hook(id, &done).await.unwrap();
        assert_eq!(f.fired.load(Ordering::SeqCst), 1);

        f.scheduler.handle_legacy_hook(id, &running(3)).await.unwrap();
        assert_eq!(f.fired.load(Ordering::SeqCst), 2);
    }
}
