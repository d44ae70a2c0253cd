use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use jobcore_core::{
    models::{
        vendor, Execution, ExecutionQuery, ExecutionStatus, ExtraAttrs, Pagination, Schedule,
        Task, TaskQuery, TaskStatus, Trigger,
    },
    traits::{ExecutionService, SchedulerService, TaskService},
    CoreError, CoreResult,
};
use jobcore_domain::{
    repositories::RetentionPolicyRepository,
    retention::{RetentionPolicy, TaskProgress},
};

use super::launcher::Launcher;
use crate::callback::CallbackRegistry;
use crate::hook::CheckInProcessor;

const CRON_TYPE_CUSTOM: &str = "Custom";
const ACTION_STOP: &str = "stop";

/// 周期触发时回传给控制器的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionCallbackParam {
    pub policy_id: i64,
    pub trigger: Trigger,
}

/// 保留执行的对外视图
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionExecView {
    pub id: i64,
    pub policy_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub trigger: Trigger,
    pub dry_run: bool,
}

impl From<Execution> for RetentionExecView {
    fn from(execution: Execution) -> Self {
        let dry_run = execution
            .extra_attrs
            .get("dry_run")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Self {
            id: execution.id,
            policy_id: execution.vendor_id,
            start_time: execution.start_time,
            end_time: execution.end_time,
            status: execution.status,
            trigger: execution.trigger,
            dry_run,
        }
    }
}

/// 保留任务的对外视图
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionTaskView {
    pub id: i64,
    pub execution_id: i64,
    pub repository: String,
    pub job_id: Option<String>,
    pub status: TaskStatus,
    pub status_code: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total: i64,
    pub retained: i64,
}

impl From<Task> for RetentionTaskView {
    fn from(task: Task) -> Self {
        let attr_i64 = |key: &str| task.extra_attrs.get(key).and_then(|v| v.as_i64()).unwrap_or(0);
        Self {
            id: task.id,
            execution_id: task.execution_id,
            repository: task
                .extra_attrs
                .get("repository")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            total: attr_i64("total"),
            retained: attr_i64("retained"),
            job_id: task.job_id,
            status: task.status,
            status_code: task.status_code,
            start_time: task.start_time,
            end_time: task.end_time,
        }
    }
}

/// 保留策略控制器
///
/// 把策略的触发配置同步到周期调度，并负责执行的创建、停止与查询。
pub struct RetentionController {
    policy_repo: Arc<dyn RetentionPolicyRepository>,
    scheduler: Arc<dyn SchedulerService>,
    executions: Arc<dyn ExecutionService>,
    tasks: Arc<dyn TaskService>,
    launcher: Arc<dyn Launcher>,
    stop_timeout: Duration,
}

impl RetentionController {
    pub fn new(
        policy_repo: Arc<dyn RetentionPolicyRepository>,
        scheduler: Arc<dyn SchedulerService>,
        executions: Arc<dyn ExecutionService>,
        tasks: Arc<dyn TaskService>,
        launcher: Arc<dyn Launcher>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            policy_repo,
            scheduler,
            executions,
            tasks,
            launcher,
            stop_timeout,
        }
    }

    /// 注册 RETENTION 回调，注册表只持有控制器的弱引用
    pub fn register_callbacks(self: &Arc<Self>, registry: &CallbackRegistry) -> CoreResult<()> {
        let controller: Weak<Self> = Arc::downgrade(self);
        registry.register_typed(vendor::RETENTION, move |param: RetentionCallbackParam| {
            let controller = controller.clone();
            async move {
                let controller = controller
                    .upgrade()
                    .ok_or_else(|| CoreError::Internal("保留控制器已释放".to_string()))?;
                controller
                    .trigger_retention_exec(param.policy_id, param.trigger, false)
                    .await?;
                Ok(())
            }
        })
    }

    async fn schedule_policy(&self, policy_id: i64, cron: &str) -> CoreResult<i64> {
        let param = serde_json::to_value(RetentionCallbackParam {
            policy_id,
            trigger: Trigger::Scheduled,
        })?;
        let schedule = Schedule::new(
            vendor::RETENTION,
            policy_id,
            CRON_TYPE_CUSTOM,
            cron,
            vendor::RETENTION,
            param,
            ExtraAttrs::new(),
        );
        self.scheduler.schedule(schedule).await
    }

    #[instrument(skip(self, policy))]
    pub async fn create_retention(&self, policy: &RetentionPolicy) -> CoreResult<i64> {
        policy.validate()?;
        let id = self.policy_repo.create(policy).await?;

        if let Some(cron) = policy.trigger.cron() {
            if let Err(e) = self.schedule_policy(id, cron).await {
                if let Err(rollback) = self.policy_repo.delete(id).await {
                    warn!("回滚保留策略 {} 失败: {}", id, rollback);
                }
                return Err(e);
            }
        }

        info!("创建保留策略 {}", id);
        Ok(id)
    }

    /// 先调整调度再写入策略
    #[instrument(skip(self, policy), fields(policy_id = policy.id))]
    pub async fn update_retention(&self, policy: &RetentionPolicy) -> CoreResult<()> {
        policy.validate()?;
        let old = self.policy_repo.get(policy.id).await?;

        let old_cron = old.trigger.cron();
        let new_cron = policy.trigger.cron();
        if old_cron != new_cron {
            if old_cron.is_some() {
                self.scheduler
                    .unschedule_by_vendor(vendor::RETENTION, policy.id)
                    .await?;
            }
            if let Some(cron) = new_cron {
                self.schedule_policy(policy.id, cron).await?;
            }
        }

        self.policy_repo.update(policy).await
    }

    #[instrument(skip(self))]
    pub async fn delete_retention(&self, id: i64) -> CoreResult<()> {
        self.scheduler
            .unschedule_by_vendor(vendor::RETENTION, id)
            .await?;
        self.executions
            .delete_by_vendor(vendor::RETENTION, id)
            .await?;
        self.policy_repo.delete(id).await?;
        info!("删除保留策略 {}", id);
        Ok(())
    }

    pub async fn delete_retention_by_project(&self, project_id: i64) -> CoreResult<()> {
        for policy in self.policy_repo.list_by_project(project_id).await? {
            self.delete_retention(policy.id).await?;
        }
        Ok(())
    }

    pub async fn get_retention(&self, id: i64) -> CoreResult<RetentionPolicy> {
        self.policy_repo.get(id).await
    }

    /// 创建执行并展开任务，返回执行ID
    #[instrument(skip(self))]
    pub async fn trigger_retention_exec(
        &self,
        policy_id: i64,
        trigger: Trigger,
        dry_run: bool,
    ) -> CoreResult<i64> {
        let policy = self.policy_repo.get(policy_id).await?;

        let mut extra_attrs = ExtraAttrs::new();
        extra_attrs.insert("dry_run".to_string(), json!(dry_run));
        let execution_id = self
            .executions
            .create(vendor::RETENTION, policy_id, trigger, extra_attrs)
            .await?;

        match self.launcher.launch(&policy, execution_id, dry_run).await {
            Err(e) => {
                // 任务提交失败时任务管理器已停止并标记了执行
                let aborted = matches!(
                    self.executions.get(execution_id).await,
                    Ok(execution) if execution.status == ExecutionStatus::Error
                );
                if !aborted {
                    if let Err(stop_err) = self
                        .executions
                        .stop_and_wait_with_error(execution_id, self.stop_timeout, &e.to_string())
                        .await
                    {
                        warn!("标记执行 {} 失败出错: {}", execution_id, stop_err);
                    }
                }
                return Err(e);
            }
            Ok(0) => {
                self.executions
                    .mark_done(execution_id, "no resources for retention")
                    .await?;
            }
            Ok(n) => info!("保留执行 {} 共 {} 个任务", execution_id, n),
        }
        Ok(execution_id)
    }

    pub async fn operate_retention_exec(&self, execution_id: i64, action: &str) -> CoreResult<()> {
        if action != ACTION_STOP {
            return Err(CoreError::invalid(format!("不支持的执行操作: {action}")));
        }
        self.get_retention_exec(execution_id).await?;
        self.executions.stop(execution_id).await
    }

    pub async fn get_retention_exec(&self, execution_id: i64) -> CoreResult<RetentionExecView> {
        let execution = self.executions.get(execution_id).await?;
        if execution.vendor_type != vendor::RETENTION {
            return Err(CoreError::not_found("保留执行", execution_id));
        }
        Ok(execution.into())
    }

    pub async fn list_retention_execs(
        &self,
        policy_id: i64,
        page: Option<Pagination>,
    ) -> CoreResult<Vec<RetentionExecView>> {
        let query = ExecutionQuery::by_vendor(vendor::RETENTION, policy_id).with_pagination(page);
        let executions = self.executions.list(&query).await?;
        Ok(executions.into_iter().map(Into::into).collect())
    }

    pub async fn get_total_of_retention_execs(&self, policy_id: i64) -> CoreResult<i64> {
        self.executions
            .count(&ExecutionQuery::by_vendor(vendor::RETENTION, policy_id))
            .await
    }

    pub async fn list_retention_exec_tasks(
        &self,
        execution_id: i64,
        page: Option<Pagination>,
    ) -> CoreResult<Vec<RetentionTaskView>> {
        let query = TaskQuery::by_execution(execution_id).with_pagination(page);
        let tasks = self.tasks.list(&query).await?;
        Ok(tasks.into_iter().map(Into::into).collect())
    }

    pub async fn get_total_of_retention_exec_tasks(&self, execution_id: i64) -> CoreResult<i64> {
        self.tasks.count(&TaskQuery::by_execution(execution_id)).await
    }

    pub async fn get_retention_exec_task(&self, task_id: i64) -> CoreResult<RetentionTaskView> {
        Ok(self.tasks.get(task_id).await?.into())
    }

    pub async fn get_retention_exec_task_log(&self, task_id: i64) -> CoreResult<Vec<u8>> {
        self.tasks.get_log(task_id).await
    }

    pub async fn update_task_info(&self, task_id: i64, total: usize, retained: usize) -> CoreResult<()> {
        let mut patch = ExtraAttrs::new();
        patch.insert("total".to_string(), json!(total));
        patch.insert("retained".to_string(), json!(retained));
        self.tasks.update_extra_attrs(task_id, &patch).await
    }
}

#[async_trait]
impl CheckInProcessor for RetentionController {
    async fn process(&self, task: &Task, check_in: &str) -> CoreResult<()> {
        let progress: TaskProgress = serde_json::from_str(check_in)
            .map_err(|e| CoreError::invalid(format!("无法解析保留任务进度: {e}")))?;
        self.update_task_info(task.id, progress.total, progress.retained)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionManager, Sweeper};
    use crate::retention::RetentionLauncher;
    use crate::scheduler::PeriodicScheduler;
    use crate::task::TaskManager;
    use jobcore_core::config::models::ExecutionConfig;
    use jobcore_core::models::HookUrls;
    use jobcore_core::ErrorKind;
    use jobcore_domain::immutable::RuleMatcher;
    use jobcore_domain::retention::template::LATEST_PUSHED_K;
    use jobcore_infrastructure::MetricsCollector;
    use jobcore_testing_utils::{
        retention_rule, CandidateBuilder, InMemoryArtifactSource, MockJobServiceClient,
        RetentionPolicyBuilder, TestDatabase,
    };

    struct Fixture {
        db: TestDatabase,
        jobservice: MockJobServiceClient,
        artifacts: InMemoryArtifactSource,
        callbacks: Arc<CallbackRegistry>,
        tasks: Arc<TaskManager>,
        controller: Arc<RetentionController>,
    }

    async fn fixture() -> Fixture {
        let db = TestDatabase::new().await;
        let jobservice = MockJobServiceClient::new();
        let artifacts = InMemoryArtifactSource::new();
        let metrics = Arc::new(MetricsCollector::new());
        let hooks = HookUrls::new("http://core");
        let callbacks = Arc::new(CallbackRegistry::new());

        let tasks = Arc::new(TaskManager::new(
            db.tasks.clone(),
            db.executions.clone(),
            Arc::new(jobservice.clone()),
            hooks.clone(),
            metrics.clone(),
            Duration::from_millis(50),
        ));
        let sweeper = Arc::new(Sweeper::new(
            db.executions.clone(),
            &ExecutionConfig::default(),
            metrics.clone(),
        ));
        let executions = Arc::new(ExecutionManager::new(
            db.executions.clone(),
            tasks.clone(),
            sweeper,
            metrics.clone(),
        ));
        let scheduler = Arc::new(PeriodicScheduler::new(
            db.schedules.clone(),
            Arc::new(jobservice.clone()),
            callbacks.clone(),
            hooks,
            metrics,
        ));
        let launcher = Arc::new(RetentionLauncher::new(
            Arc::new(artifacts.clone()),
            Arc::new(RuleMatcher::new(db.immutable_rules.clone())),
            tasks.clone(),
        ));
        let controller = Arc::new(RetentionController::new(
            db.retention_policies.clone(),
            scheduler,
            executions,
            tasks.clone(),
            launcher,
            Duration::from_millis(300),
        ));
        controller.register_callbacks(&callbacks).unwrap();

        Fixture {
            db,
            jobservice,
            artifacts,
            callbacks,
            tasks,
            controller,
        }
    }

    fn release_policy() -> RetentionPolicy {
        RetentionPolicyBuilder::new(1)
            .rule(retention_rule(LATEST_PUSHED_K, 10, "**", "release-*"))
            .build()
    }

    fn add_release_candidates(artifacts: &InMemoryArtifactSource) {
        for (tag, hours) in [("release-1.0", 3), ("release-1.1", 2), ("dev-1", 1)] {
            artifacts.add(
                CandidateBuilder::image(1, "library", "redis")
                    .tag(tag)
                    .pushed_hours_ago(hours)
                    .build(),
            );
        }
    }

    #[tokio::test]
    async fn test_create_scheduled_policy_registers_schedule() {
        let f = fixture().await;
        let policy = RetentionPolicyBuilder::new(1)
            .rule(retention_rule(LATEST_PUSHED_K, 10, "**", "**"))
            .scheduled("0 0 0 * * *")
            .build();

        let id = f.controller.create_retention(&policy).await.unwrap();

        let schedules = f.db.schedules.list(&Default::default()).await.unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].vendor_id, id);
        assert_eq!(schedules[0].callback_func_name, vendor::RETENTION);
        assert_eq!(
            schedules[0].callback_func_param,
            json!({"policy_id": id, "trigger": "SCHEDULE"})
        );
        assert_eq!(f.jobservice.periodic_jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rolls_back_policy_when_scheduling_fails() {
        let f = fixture().await;
        f.jobservice.fail_submissions();
        let policy = RetentionPolicyBuilder::new(1)
            .rule(retention_rule(LATEST_PUSHED_K, 10, "**", "**"))
            .scheduled("0 0 0 * * *")
            .build();

        assert!(f.controller.create_retention(&policy).await.is_err());
        assert!(f.db.retention_policies.list_by_project(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_follows_trigger_changes() {
        let f = fixture().await;
        let mut policy = release_policy();
        policy.id = f.controller.create_retention(&policy).await.unwrap();
        assert!(f.jobservice.periodic_jobs().is_empty());

        policy.trigger = jobcore_domain::retention::RetentionTrigger::scheduled("0 0 0 * * *");
        f.controller.update_retention(&policy).await.unwrap();
        assert_eq!(f.jobservice.periodic_jobs()[0].cron_spec, "0 0 0 * * *");

        policy.trigger = jobcore_domain::retention::RetentionTrigger::scheduled("0 30 1 * * *");
        f.controller.update_retention(&policy).await.unwrap();
        let periodic = f.jobservice.periodic_jobs();
        assert_eq!(periodic.len(), 1);
        assert_eq!(periodic[0].cron_spec, "0 30 1 * * *");

        policy.trigger = jobcore_domain::retention::RetentionTrigger::manual();
        f.controller.update_retention(&policy).await.unwrap();
        assert!(f.jobservice.periodic_jobs().is_empty());
        assert!(f.db.schedules.list(&Default::default()).await.unwrap().is_empty());

        let stored = f.controller.get_retention(policy.id).await.unwrap();
        assert_eq!(stored.trigger, policy.trigger);
    }

    #[tokio::test]
    async fn test_trigger_creates_one_task_per_repository() {
        let f = fixture().await;
        add_release_candidates(&f.artifacts);
        let id = f.controller.create_retention(&release_policy()).await.unwrap();

        let execution_id = f
            .controller
            .trigger_retention_exec(id, Trigger::Manual, true)
            .await
            .unwrap();

        let exec = f.controller.get_retention_exec(execution_id).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert!(exec.dry_run);

        let tasks = f
            .controller
            .list_retention_exec_tasks(execution_id, None)
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].repository, "library/redis");

        let submitted = f.jobservice.submitted_named(vendor::RETENTION);
        let params = jobcore_domain::RetentionTaskParams::from_params(&submitted[0].1.parameters)
            .unwrap();
        assert_eq!(params.total, 3);
        assert!(params.deletes.is_empty());

        f.tasks
            .update_status(tasks[0].id, TaskStatus::Success, 1, "")
            .await
            .unwrap();
        let exec = f.controller.get_retention_exec(execution_id).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_trigger_without_resources_marks_done() {
        let f = fixture().await;
        let id = f.controller.create_retention(&release_policy()).await.unwrap();

        let execution_id = f
            .controller
            .trigger_retention_exec(id, Trigger::Manual, false)
            .await
            .unwrap();

        let exec = f.controller.get_retention_exec(execution_id).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Success);
        assert_eq!(f.controller.get_total_of_retention_exec_tasks(execution_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_launch_failure_marks_execution_error() {
        let f = fixture().await;
        add_release_candidates(&f.artifacts);
        let id = f.controller.create_retention(&release_policy()).await.unwrap();
        f.jobservice.fail_submissions();

        assert!(f
            .controller
            .trigger_retention_exec(id, Trigger::Manual, false)
            .await
            .is_err());

        let execs = f.controller.list_retention_execs(id, None).await.unwrap();
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].status, ExecutionStatus::Error);
    }

    #[tokio::test]
    async fn test_scheduled_callback_triggers_execution() {
        let f = fixture().await;
        let id = f.controller.create_retention(&release_policy()).await.unwrap();

        f.callbacks
            .invoke(vendor::RETENTION, json!({"policy_id": id, "trigger": "SCHEDULE"}))
            .await
            .unwrap();

        let execs = f.controller.list_retention_execs(id, None).await.unwrap();
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].trigger, Trigger::Scheduled);
        assert!(!execs[0].dry_run);
    }

    #[tokio::test]
    async fn test_operate_rejects_unknown_action() {
        let f = fixture().await;
        let id = f.controller.create_retention(&release_policy()).await.unwrap();
        let execution_id = f
            .controller
            .trigger_retention_exec(id, Trigger::Manual, false)
            .await
            .unwrap();

        let err = f
            .controller
            .operate_retention_exec(execution_id, "pause")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        f.controller
            .operate_retention_exec(execution_id, "stop")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_check_in_updates_task_progress() {
        let f = fixture().await;
        add_release_candidates(&f.artifacts);
        let id = f.controller.create_retention(&release_policy()).await.unwrap();
        let execution_id = f
            .controller
            .trigger_retention_exec(id, Trigger::Manual, false)
            .await
            .unwrap();
        let task_id = f
            .controller
            .list_retention_exec_tasks(execution_id, None)
            .await
            .unwrap()[0]
            .id;

        let task = f.tasks.get(task_id).await.unwrap();
        f.controller
            .process(&task, r#"{"total":3,"retained":2}"#)
            .await
            .unwrap();

        let view = f.controller.get_retention_exec_task(task_id).await.unwrap();
        assert_eq!((view.total, view.retained), (3, 2));
        assert_eq!(view.repository, "library/redis");

        let err = f.controller.process(&task, "not json").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_delete_removes_schedule_and_executions() {
        let f = fixture().await;
        let policy = RetentionPolicyBuilder::new(1)
            .rule(retention_rule(LATEST_PUSHED_K, 10, "**", "**"))
            .scheduled("0 0 0 * * *")
            .build();
        let id = f.controller.create_retention(&policy).await.unwrap();
        f.controller
            .trigger_retention_exec(id, Trigger::Manual, false)
            .await
            .unwrap();

        f.controller.delete_retention_by_project(1).await.unwrap();

        assert_eq!(f.controller.get_total_of_retention_execs(id).await.unwrap(), 0);
        assert!(f.controller.get_retention(id).await.unwrap_err().is_not_found());
        assert!(f.jobservice.periodic_jobs().is_empty());
    }
}
