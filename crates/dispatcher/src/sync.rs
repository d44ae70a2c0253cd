//! 调度同步
//!
//! 启动后比对本地调度与 worker pool 中的周期作业：本地有而 worker pool 缺失的重新提交，
//! worker pool 中无主的调度作业被停止。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use jobcore_core::{
    config::models::SchedulerConfig,
    models::{vendor, JobAction, ScheduleQuery},
    traits::{JobServiceClient, ScheduleRepository},
    CoreError, CoreResult,
};
use jobcore_infrastructure::{MetricsCollector, StructuredLogger};

use crate::scheduler::PeriodicScheduler;

/// 一轮同步的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub restored: usize,
    pub cleared: usize,
}

pub struct ScheduleSyncWorker {
    scheduler: Arc<PeriodicScheduler>,
    schedule_repo: Arc<dyn ScheduleRepository>,
    jobservice: Arc<dyn JobServiceClient>,
    rounds: u32,
    retry_interval: Duration,
    metrics: Arc<MetricsCollector>,
}

impl ScheduleSyncWorker {
    pub fn new(
        scheduler: Arc<PeriodicScheduler>,
        schedule_repo: Arc<dyn ScheduleRepository>,
        jobservice: Arc<dyn JobServiceClient>,
        config: &SchedulerConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            scheduler,
            schedule_repo,
            jobservice,
            rounds: config.sync_rounds,
            retry_interval: Duration::from_secs(config.sync_retry_interval_seconds),
            metrics,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// 执行同步，出错时等待重试间隔后进入下一轮，收到关闭信号立即退出
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        for round in 1..=self.rounds {
            match self.sync_once(round).await {
                Ok(report) => {
                    info!(
                        "调度同步完成: 恢复 {} 个, 清理 {} 个",
                        report.restored, report.cleared
                    );
                    return;
                }
                Err(e) => {
                    warn!("第 {} 轮调度同步失败: {}", round, e);
                    if round == self.rounds {
                        break;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.retry_interval) => {}
                _ = shutdown.recv() => {
                    info!("收到关闭信号，停止调度同步");
                    return;
                }
            }
        }
        warn!("调度同步在 {} 轮后仍未成功", self.rounds);
    }

    /// 同步一轮
    ///
    /// 先读本地调度再读 worker pool，读取期间新建的调度不会被当作缺失而重复提交；
    /// 清理无主作业前重新读取调度，新调度的作业不会被误停。
    /// 单个调度的失败不会中断本轮，最后一个错误在本轮结束后返回。
    #[instrument(skip(self))]
    pub async fn sync_once(&self, round: u32) -> CoreResult<SyncReport> {
        let schedules = self.schedule_repo.list(&ScheduleQuery::default()).await?;
        let periodic_jobs = self.jobservice.list_periodic_jobs().await?;

        let live_jobs: HashSet<&str> = periodic_jobs.iter().map(|job| job.id.as_str()).collect();
        let mut report = SyncReport::default();
        let mut last_err: Option<CoreError> = None;
        let mut owned_jobs: HashSet<String> = HashSet::new();

        for schedule in &schedules {
            let alive = schedule
                .job_id
                .as_deref()
                .is_some_and(|job_id| live_jobs.contains(job_id));
            if alive {
                if let Some(job_id) = &schedule.job_id {
                    owned_jobs.insert(job_id.clone());
                }
                continue;
            }

            match self.scheduler.restore(schedule).await {
                Ok(job_id) => {
                    owned_jobs.insert(job_id);
                    report.restored += 1;
                }
                Err(e) => {
                    warn!("恢复调度 {} 失败: {}", schedule.id, e);
                    last_err = Some(e);
                }
            }
        }

        let current = self.schedule_repo.list(&ScheduleQuery::default()).await?;
        owned_jobs.extend(current.into_iter().filter_map(|schedule| schedule.job_id));

        for job in periodic_jobs
            .iter()
            .filter(|job| job.job_name == vendor::SCHEDULER && !owned_jobs.contains(&job.id))
        {
            match self.jobservice.post_action(&job.id, JobAction::Stop).await {
                Ok(()) => report.cleared += 1,
                Err(e) => {
                    warn!("清理无主周期作业 {} 失败: {}", job.id, e);
                    last_err = Some(e);
                }
            }
        }

        let error_message = last_err.as_ref().map(|e| e.to_string());
        StructuredLogger::log_sync_round(
            round,
            report.restored,
            report.cleared,
            error_message.as_deref(),
        );
        self.metrics
            .record_sync_round(report.restored, report.cleared);

        match last_err {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
