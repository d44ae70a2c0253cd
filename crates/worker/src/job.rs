use async_trait::async_trait;
use jobcore_core::CoreResult;
use serde_json::{Map, Value};

use crate::context::JobContext;

/// 作业的运行结果，供日志与测试检查
pub type JobOutput = Value;

/// worker pool 中可运行的作业
#[async_trait]
pub trait Job: Send + Sync {
    /// 与提交时 JobData.name 对应的作业名
    fn name(&self) -> &'static str;

    /// worker pool 允许的最大失败次数
    fn max_fails(&self) -> u32 {
        1
    }

    /// 失败后是否交给 worker pool 重试
    fn should_retry(&self) -> bool {
        false
    }

    /// 在入队前校验参数
    fn validate(&self, params: &Map<String, Value>) -> CoreResult<()>;

    async fn run(&self, ctx: &dyn JobContext, params: &Map<String, Value>) -> CoreResult<JobOutput>;
}
