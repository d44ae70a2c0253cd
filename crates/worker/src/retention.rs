//! 单仓库的保留作业

use std::sync::Arc;

use async_trait::async_trait;
use jobcore_core::{models::vendor, CoreError, CoreResult};
use jobcore_domain::{
    candidate::Candidate,
    ports::ArtifactDeleter,
    retention::{RetentionResult, RetentionTaskParams, TaskProgress},
};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::context::JobContext;
use crate::job::{Job, JobOutput};

/// 删除（或在 dry run 时只汇报）launcher 计算出的候选
///
/// 受不可变规则保护的候选只记录 ImmutableError，不会交给删除接口；
/// 单个候选的失败记录在结果里，不影响作业本身的状态。
pub struct RetentionJob {
    deleter: Arc<dyn ArtifactDeleter>,
}

impl RetentionJob {
    pub fn new(deleter: Arc<dyn ArtifactDeleter>) -> Self {
        Self { deleter }
    }

    fn result(candidate: &Candidate, error: Option<String>, immutable: bool) -> RetentionResult {
        RetentionResult {
            target: candidate.display_name(),
            digest: candidate.digest.clone(),
            error,
            immutable,
        }
    }
}

#[async_trait]
impl Job for RetentionJob {
    fn name(&self) -> &'static str {
        vendor::RETENTION
    }

    fn validate(&self, params: &Map<String, Value>) -> CoreResult<()> {
        let params = RetentionTaskParams::from_params(params)?;
        if params.repository.is_empty() {
            return Err(CoreError::invalid("保留作业缺少仓库名"));
        }
        Ok(())
    }

    async fn run(&self, ctx: &dyn JobContext, params: &Map<String, Value>) -> CoreResult<JobOutput> {
        let params = RetentionTaskParams::from_params(params)?;
        let mut results = Vec::with_capacity(params.deletes.len() + params.immutable.len());

        for candidate in &params.immutable {
            let err = CoreError::Immutable(format!("{} 受不可变规则保护", candidate.display_name()));
            results.push(Self::result(candidate, Some(err.to_string()), true));
        }

        let mut deleted = 0;
        for candidate in &params.deletes {
            if ctx.is_stopped() {
                warn!("保留作业 {} 收到停止信号", params.repository);
                break;
            }
            if params.dry_run {
                deleted += 1;
                results.push(Self::result(candidate, None, false));
                continue;
            }
            match self.deleter.delete(candidate).await {
                Ok(()) => {
                    deleted += 1;
                    results.push(Self::result(candidate, None, false));
                }
                Err(e) => {
                    warn!("删除 {} 失败: {}", candidate.display_name(), e);
                    let immutable = matches!(e, CoreError::Immutable(_));
                    results.push(Self::result(candidate, Some(e.to_string()), immutable));
                }
            }
        }

        // 按实际删除结果计算保留数，dry run 按计划汇报
        let progress = TaskProgress {
            total: params.total,
            retained: params.total.saturating_sub(deleted),
        };
        ctx.check_in(&serde_json::to_string(&progress)?).await?;

        info!(
            "仓库 {} 保留完成: total={}, retained={}, dry_run={}",
            params.repository, progress.total, progress.retained, params.dry_run
        );
        Ok(serde_json::to_value(results)?)
    }
}
