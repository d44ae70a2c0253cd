use async_trait::async_trait;

use crate::errors::CoreResult;
use crate::models::{
    Execution, ExecutionMetrics, ExecutionQuery, ExecutionStatus, ExtraAttrs, Schedule,
    ScheduleQuery, Task, TaskQuery, TaskStatus,
};

/// 调度记录仓储
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// 同一 vendor 已存在调度时返回 Conflict
    async fn create(&self, schedule: &Schedule) -> CoreResult<i64>;
    async fn get(&self, id: i64) -> CoreResult<Schedule>;
    async fn list(&self, query: &ScheduleQuery) -> CoreResult<Vec<Schedule>>;
    async fn update_job_id(&self, id: i64, job_id: &str) -> CoreResult<()>;
    /// 仅当 `revision` 大于已存储的值时写入，返回是否写入
    async fn update_revision(&self, id: i64, revision: i64) -> CoreResult<bool>;
    async fn delete(&self, id: i64) -> CoreResult<()>;
}

/// 执行记录仓储
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn create(&self, execution: &Execution) -> CoreResult<i64>;
    async fn get(&self, id: i64) -> CoreResult<Execution>;
    async fn list(&self, query: &ExecutionQuery) -> CoreResult<Vec<Execution>>;
    async fn count(&self, query: &ExecutionQuery) -> CoreResult<i64>;
    /// 直接设置状态，终态时记录结束时间
    async fn update_status(
        &self,
        id: i64,
        status: ExecutionStatus,
        message: &str,
    ) -> CoreResult<()>;
    async fn update_extra_attrs(&self, id: i64, extra_attrs: &ExtraAttrs) -> CoreResult<()>;
    async fn metrics(&self, id: i64) -> CoreResult<ExecutionMetrics>;
    /// 按任务状态重新汇总执行状态，返回汇总后的状态
    async fn refresh_status(&self, id: i64) -> CoreResult<ExecutionStatus>;
    /// 删除执行及其全部任务
    async fn delete(&self, id: i64) -> CoreResult<()>;
}

/// 任务仓储
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> CoreResult<i64>;
    async fn get(&self, id: i64) -> CoreResult<Task>;
    async fn list(&self, query: &TaskQuery) -> CoreResult<Vec<Task>>;
    async fn count(&self, query: &TaskQuery) -> CoreResult<i64>;
    async fn update_job_id(&self, id: i64, job_id: &str) -> CoreResult<()>;
    /// 条件写入状态：新版本号更大，或版本号相同且状态码更高。返回是否写入
    async fn update_status(
        &self,
        id: i64,
        status: TaskStatus,
        revision: i64,
        message: &str,
    ) -> CoreResult<bool>;
    async fn update_check_in(&self, id: i64, comment: &str) -> CoreResult<()>;
    /// 仅当当前值等于 `expected` 时写入 `new`，返回是否写入
    async fn compare_and_set_extra_attrs(
        &self,
        id: i64,
        expected: &ExtraAttrs,
        new: &ExtraAttrs,
    ) -> CoreResult<bool>;
}
