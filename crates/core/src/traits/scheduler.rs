use async_trait::async_trait;
use std::time::Duration;

use crate::errors::CoreResult;
use crate::models::{
    Execution, ExecutionQuery, ExtraAttrs, JobData, Schedule, ScheduleQuery, Task, TaskQuery,
    TaskStatus, Trigger,
};

/// 周期调度服务接口
#[async_trait]
pub trait SchedulerService: Send + Sync {
    /// 持久化调度并提交到 worker pool，返回调度ID
    ///
    /// 回调未注册或 cron 非法时返回 InvalidArgument，同一 vendor 已有调度时返回 Conflict。
    async fn schedule(&self, schedule: Schedule) -> CoreResult<i64>;

    /// 停止周期作业并删除调度
    async fn unschedule(&self, id: i64) -> CoreResult<()>;

    /// 删除 vendor 下的全部调度
    async fn unschedule_by_vendor(&self, vendor_type: &str, vendor_id: i64) -> CoreResult<()>;

    async fn get_schedule(&self, id: i64) -> CoreResult<Schedule>;

    async fn list_schedules(&self, query: &ScheduleQuery) -> CoreResult<Vec<Schedule>>;
}

/// 执行管理服务接口
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// 创建状态为 Running 的执行
    async fn create(
        &self,
        vendor_type: &str,
        vendor_id: i64,
        trigger: Trigger,
        extra_attrs: ExtraAttrs,
    ) -> CoreResult<i64>;

    /// 没有任务需要运行时直接标记成功
    async fn mark_done(&self, id: i64, message: &str) -> CoreResult<()>;

    /// 任务创建前失败时直接标记错误
    async fn mark_error(&self, id: i64, message: &str) -> CoreResult<()>;

    async fn stop(&self, id: i64) -> CoreResult<()>;

    /// 停止并等待全部任务终态，返回是否在超时前全部终态
    async fn stop_and_wait(&self, id: i64, timeout: Duration) -> CoreResult<bool>;

    /// 停止并等待后标记错误
    async fn stop_and_wait_with_error(
        &self,
        id: i64,
        timeout: Duration,
        message: &str,
    ) -> CoreResult<()>;

    /// 仍有未结束任务时返回 Conflict
    async fn delete(&self, id: i64) -> CoreResult<()>;

    async fn delete_by_vendor(&self, vendor_type: &str, vendor_id: i64) -> CoreResult<()>;

    async fn get(&self, id: i64) -> CoreResult<Execution>;

    async fn list(&self, query: &ExecutionQuery) -> CoreResult<Vec<Execution>>;

    async fn count(&self, query: &ExecutionQuery) -> CoreResult<i64>;

    async fn update_extra_attrs(&self, id: i64, extra_attrs: &ExtraAttrs) -> CoreResult<()>;
}

/// 任务管理服务接口
#[async_trait]
pub trait TaskService: Send + Sync {
    /// 创建任务并提交到 worker pool，返回任务ID
    async fn create(
        &self,
        execution_id: i64,
        job: JobData,
        extra_attrs: ExtraAttrs,
    ) -> CoreResult<i64>;

    async fn stop(&self, id: i64) -> CoreResult<()>;

    async fn get(&self, id: i64) -> CoreResult<Task>;

    async fn list(&self, query: &TaskQuery) -> CoreResult<Vec<Task>>;

    async fn count(&self, query: &TaskQuery) -> CoreResult<i64>;

    /// 从 worker pool 获取任务日志
    async fn get_log(&self, id: i64) -> CoreResult<Vec<u8>>;

    /// 按版本号条件写入状态，并重新汇总所属执行的状态。返回是否写入
    async fn update_status(
        &self,
        id: i64,
        status: TaskStatus,
        revision: i64,
        message: &str,
    ) -> CoreResult<bool>;

    /// 将 `patch` 合并进扩展属性，并发修改时重试
    async fn update_extra_attrs(&self, id: i64, patch: &ExtraAttrs) -> CoreResult<()>;

    async fn update_check_in(&self, id: i64, comment: &str) -> CoreResult<()>;
}
