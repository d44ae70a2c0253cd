use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, instrument};

use jobcore_core::{
    models::{vendor, ExtraAttrs, JobData, JobMetadata},
    traits::TaskService,
    CoreResult,
};
use jobcore_domain::{
    candidate::Candidate,
    immutable::{ImmutableMatcher, ProjectRules},
    ports::ArtifactSource,
    retention::{evaluate_template, Algorithm, RetentionPolicy, RetentionRule, RetentionTaskParams, RuleFilters},
};

/// 把保留策略展开为各仓库的任务
#[async_trait]
pub trait Launcher: Send + Sync {
    /// 返回提交的任务数量
    async fn launch(&self, policy: &RetentionPolicy, execution_id: i64, dry_run: bool)
        -> CoreResult<usize>;
}

/// 单个仓库的评估结果
#[derive(Debug, Default)]
struct RepositoryPlan {
    total: usize,
    selected: usize,
    deletes: Vec<Candidate>,
    immutable: Vec<Candidate>,
}

pub struct RetentionLauncher {
    artifacts: Arc<dyn ArtifactSource>,
    matcher: Arc<dyn ImmutableMatcher>,
    tasks: Arc<dyn TaskService>,
}

impl RetentionLauncher {
    pub fn new(
        artifacts: Arc<dyn ArtifactSource>,
        matcher: Arc<dyn ImmutableMatcher>,
        tasks: Arc<dyn TaskService>,
    ) -> Self {
        Self {
            artifacts,
            matcher,
            tasks,
        }
    }

    /// 按策略算法合并各规则的保留集，规则圈定但未被保留的候选进入删除集
    fn plan(
        algorithm: Algorithm,
        rules: &[(&RetentionRule, RuleFilters)],
        candidates: &[Candidate],
        immutable: &ProjectRules,
        now: i64,
    ) -> CoreResult<RepositoryPlan> {
        let mut selected: Vec<Candidate> = Vec::new();
        let mut selected_hashes = HashSet::new();
        let mut retained: Option<HashSet<String>> = None;

        for (rule, filters) in rules {
            let in_scope = filters.tags.apply(&filters.repository.apply(candidates));
            for candidate in &in_scope {
                if selected_hashes.insert(candidate.hash()) {
                    selected.push(candidate.clone());
                }
            }

            let kept: HashSet<String> = evaluate_template(rule, in_scope, now)?
                .iter()
                .map(Candidate::hash)
                .collect();
            retained = Some(match (retained, algorithm) {
                (None, _) => kept,
                (Some(acc), Algorithm::Or) => acc.union(&kept).cloned().collect(),
                (Some(acc), Algorithm::And) => acc.intersection(&kept).cloned().collect(),
            });
        }

        let retained = retained.unwrap_or_default();
        let mut plan = RepositoryPlan {
            total: candidates.len(),
            selected: selected.len(),
            ..Default::default()
        };
        for candidate in selected {
            if retained.contains(&candidate.hash()) {
                continue;
            }
            if immutable.matches(&candidate) {
                plan.immutable.push(candidate);
            } else {
                plan.deletes.push(candidate);
            }
        }
        Ok(plan)
    }
}

#[async_trait]
impl Launcher for RetentionLauncher {
    #[instrument(skip(self, policy), fields(policy_id = policy.id))]
    async fn launch(
        &self,
        policy: &RetentionPolicy,
        execution_id: i64,
        dry_run: bool,
    ) -> CoreResult<usize> {
        let rules = policy
            .enabled_rules()
            .map(|rule| rule.filters().map(|filters| (rule, filters)))
            .collect::<CoreResult<Vec<_>>>()?;
        if rules.is_empty() {
            debug!("策略 {} 没有启用的规则", policy.id);
            return Ok(0);
        }

        let project_id = policy.project_id();
        let immutable = self.matcher.rules_for(project_id).await?;
        let now = Utc::now().timestamp();
        let mut submitted = 0;

        for repository in self.artifacts.list_repositories(project_id).await? {
            let candidates = self.artifacts.list_candidates(&repository).await?;
            let plan = Self::plan(policy.algorithm, &rules, &candidates, &immutable, now)?;
            if plan.selected == 0 {
                continue;
            }

            let full_name = repository.full_name();
            let params = RetentionTaskParams {
                repository: full_name.clone(),
                dry_run,
                total: plan.total,
                retained: plan.total - plan.deletes.len(),
                deletes: plan.deletes,
                immutable: plan.immutable,
            };
            let job = JobData::new(vendor::RETENTION, params.to_params()?, JobMetadata::generic());

            let mut extra_attrs = ExtraAttrs::new();
            extra_attrs.insert("repository".to_string(), json!(full_name));
            extra_attrs.insert("dry_run".to_string(), json!(dry_run));
            self.tasks.create(execution_id, job, extra_attrs).await?;
            submitted += 1;
        }

        info!("执行 {} 提交了 {} 个保留任务", execution_id, submitted);
        Ok(submitted)
    }
}
