use std::collections::HashMap;
use std::sync::Arc;

use jobcore_core::{models::JobData, CoreError, CoreResult};
use tracing::{error, info, instrument};

use crate::context::JobContext;
use crate::job::{Job, JobOutput};

/// 按作业名查找并运行作业
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<&'static str, Arc<dyn Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job: Arc<dyn Job>) -> CoreResult<()> {
        let name = job.name();
        if self.jobs.contains_key(name) {
            return Err(CoreError::Conflict(format!("作业 {name} 已注册")));
        }
        self.jobs.insert(name, job);
        Ok(())
    }

    pub fn get(&self, name: &str) -> CoreResult<Arc<dyn Job>> {
        self.jobs
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found("作业", name))
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.jobs.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// 校验参数后运行作业
    #[instrument(skip(self, ctx, job), fields(job = %job.name))]
    pub async fn run(&self, job: &JobData, ctx: &dyn JobContext) -> CoreResult<JobOutput> {
        let runner = self.get(&job.name)?;
        runner.validate(&job.parameters)?;

        match runner.run(ctx, &job.parameters).await {
            Ok(output) => {
                info!("作业 {} 运行完成", job.name);
                Ok(output)
            }
            Err(e) => {
                error!("作业 {} 运行失败: {}", job.name, e);
                Err(e)
            }
        }
    }
}
