use async_trait::async_trait;

use crate::errors::CoreResult;
use crate::models::{JobAction, JobData, JobStats, PeriodicJob};

/// 外部 worker pool 的访问接口
#[async_trait]
pub trait JobServiceClient: Send + Sync {
    /// 提交作业，返回作业UUID
    async fn submit_job(&self, job: &JobData) -> CoreResult<String>;

    /// 对作业执行控制动作，作业已不存在时视为成功
    async fn post_action(&self, uuid: &str, action: JobAction) -> CoreResult<()>;

    async fn get_job_log(&self, uuid: &str) -> CoreResult<Vec<u8>>;

    /// 获取周期作业触发出的执行
    async fn get_executions(&self, periodic_uuid: &str) -> CoreResult<Vec<JobStats>>;

    /// 列出 worker pool 中保存的全部周期作业
    async fn list_periodic_jobs(&self) -> CoreResult<Vec<PeriodicJob>>;
}
