use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use jobcore_api::create_app;
use jobcore_core::models::{vendor, HookUrls};
use jobcore_core::traits::JobServiceClient;
use jobcore_core::{AppConfig, RuntimeSettings};
use jobcore_dispatcher::notification::register_webhook_handlers;
use jobcore_dispatcher::{
    CallbackRegistry, CheckInProcessor, ExecutionManager, HookHandler, HookManager,
    NotificationBus, PeriodicScheduler, RetentionController, RetentionLauncher,
    ScheduleSyncWorker, Sweeper, SystemArtifactCleanupController, TaskManager,
    WebhookNotifier, WebhookPolicyManager,
};
use jobcore_domain::{ArtifactSource, RuleMatcher, WebhookSender};
use jobcore_infrastructure::{
    DatabaseManager, HttpJobServiceClient, HttpRegistryClient, HttpWebhookSender,
    MetricsCollector, SqliteExecutionRepository, SqliteImmutableRuleRepository,
    SqliteRetentionPolicyRepository, SqliteScheduleRepository, SqliteTaskRepository,
    SqliteWebhookJobRepository, SqliteWebhookPolicyRepository,
};
use sqlx::SqlitePool;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

/// 已装配好的核心组件
///
/// 所有依赖都通过构造函数注入，回调注册表在装配结束时冻结。
pub struct Components {
    pub settings: Arc<RuntimeSettings>,
    pub callbacks: Arc<CallbackRegistry>,
    pub scheduler: Arc<PeriodicScheduler>,
    pub sync_worker: Arc<ScheduleSyncWorker>,
    pub tasks: Arc<TaskManager>,
    pub executions: Arc<ExecutionManager>,
    pub retention: Arc<RetentionController>,
    pub cleanup: Arc<SystemArtifactCleanupController>,
    pub webhook_policies: Arc<WebhookPolicyManager>,
    pub webhook_jobs: Arc<HookManager>,
    pub bus: Arc<NotificationBus>,
    pub hooks: Arc<HookHandler>,
}

impl Components {
    /// 基于数据库连接池与外部端口装配全部组件，需在 tokio 运行时内调用
    pub fn wire(
        config: &AppConfig,
        pool: SqlitePool,
        metrics: Arc<MetricsCollector>,
        jobservice: Arc<dyn JobServiceClient>,
        artifacts: Arc<dyn ArtifactSource>,
        sender: Arc<dyn WebhookSender>,
    ) -> Result<Self> {
        let hook_urls = HookUrls::new(config.core.hook_base_url.clone());
        let stop_timeout = Duration::from_secs(config.execution.stop_wait_timeout_seconds);

        let settings = Arc::new(RuntimeSettings::new(
            &config.core,
            AppConfig::overridden_by_env("core.notification_enabled"),
            AppConfig::overridden_by_env("core.read_only"),
        ));

        // 存储
        let schedule_repo = Arc::new(SqliteScheduleRepository::new(pool.clone()));
        let execution_repo = Arc::new(SqliteExecutionRepository::new(pool.clone()));
        let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let immutable_repo = Arc::new(SqliteImmutableRuleRepository::new(pool.clone()));
        let retention_repo = Arc::new(SqliteRetentionPolicyRepository::new(pool.clone()));
        let webhook_policy_repo = Arc::new(SqliteWebhookPolicyRepository::new(pool.clone()));
        let webhook_job_repo = Arc::new(SqliteWebhookJobRepository::new(pool));

        // 执行与调度
        let tasks = Arc::new(TaskManager::new(
            task_repo,
            execution_repo.clone(),
            jobservice.clone(),
            hook_urls.clone(),
            metrics.clone(),
            stop_timeout,
        ));
        let sweeper = Arc::new(Sweeper::new(
            execution_repo.clone(),
            &config.execution,
            metrics.clone(),
        ));
        let executions = Arc::new(ExecutionManager::new(
            execution_repo,
            tasks.clone(),
            sweeper,
            metrics.clone(),
        ));
        let callbacks = Arc::new(CallbackRegistry::new());
        let scheduler = Arc::new(PeriodicScheduler::new(
            schedule_repo.clone(),
            jobservice.clone(),
            callbacks.clone(),
            hook_urls.clone(),
            metrics.clone(),
        ));
        let sync_worker = Arc::new(ScheduleSyncWorker::new(
            scheduler.clone(),
            schedule_repo,
            jobservice.clone(),
            &config.scheduler,
            metrics.clone(),
        ));

        // 控制器
        let launcher = Arc::new(RetentionLauncher::new(
            artifacts,
            Arc::new(RuleMatcher::new(immutable_repo)),
            tasks.clone(),
        ));
        let retention = Arc::new(RetentionController::new(
            retention_repo,
            scheduler.clone(),
            executions.clone(),
            tasks.clone(),
            launcher,
            stop_timeout,
        ));
        retention
            .register_callbacks(&callbacks)
            .context("注册保留策略回调失败")?;

        let cleanup = Arc::new(SystemArtifactCleanupController::new(
            scheduler.clone(),
            executions.clone(),
            tasks.clone(),
        ));
        cleanup
            .register_callbacks(&callbacks)
            .context("注册系统制品清理回调失败")?;

        callbacks.freeze();

        // webhook 与通知
        let webhook_jobs = Arc::new(HookManager::new(
            webhook_job_repo.clone(),
            jobservice,
            hook_urls,
            metrics,
        ));
        let webhook_policies = Arc::new(WebhookPolicyManager::new(
            webhook_policy_repo,
            webhook_job_repo,
            sender,
        ));
        let notifier = Arc::new(WebhookNotifier::new(
            webhook_policies.clone(),
            webhook_jobs.clone(),
            settings.clone(),
            config.core.external_endpoint.clone(),
        ));
        let bus = Arc::new(NotificationBus::new());
        register_webhook_handlers(&bus, notifier).context("注册webhook事件处理器失败")?;

        let retention_check_in: Arc<dyn CheckInProcessor> = retention.clone();
        let hooks = Arc::new(
            HookHandler::new(tasks.clone(), scheduler.clone(), webhook_jobs.clone())
                .with_check_in_processor(vendor::RETENTION, retention_check_in),
        );

        info!("核心组件装配完成");
        Ok(Self {
            settings,
            callbacks,
            scheduler,
            sync_worker,
            tasks,
            executions,
            retention,
            cleanup,
            webhook_policies,
            webhook_jobs,
            bus,
            hooks,
        })
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    components: Components,
}

impl Application {
    /// 连接数据库、执行迁移并装配组件
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        let database = DatabaseManager::new(&config.database)
            .await
            .context("创建数据库连接池失败")?;
        database.migrate().await?;

        let metrics = Arc::new(MetricsCollector::new());
        let jobservice = Arc::new(
            HttpJobServiceClient::new(&config.jobservice, metrics.clone())
                .context("创建任务服务客户端失败")?,
        );
        let registry =
            Arc::new(HttpRegistryClient::new(&config.registry).context("创建制品服务客户端失败")?);
        let sender = Arc::new(
            HttpWebhookSender::new(Duration::from_secs(config.webhook.request_timeout_seconds))
                .context("创建webhook发送器失败")?,
        );

        let components = Components::wire(
            &config,
            database.pool().clone(),
            metrics,
            jobservice,
            registry,
            sender,
        )?;

        Ok(Self {
            config,
            database,
            components,
        })
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    /// 启动调度同步与回调服务，直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let sync_handle = if self.config.scheduler.sync_enabled {
            let worker = Arc::clone(&self.components.sync_worker);
            let shutdown = shutdown_rx.resubscribe();
            Some(tokio::spawn(async move {
                worker.run(shutdown).await;
            }))
        } else {
            info!("调度同步已禁用");
            None
        };

        let result = self.run_api(shutdown_rx).await;

        if let Some(handle) = sync_handle {
            if let Err(e) = handle.await {
                error!("调度同步任务异常退出: {e}");
            }
        }
        self.database.close().await;
        info!("数据库连接池已关闭");

        result
    }

    async fn run_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let app = create_app(Arc::clone(&self.components.hooks));
        let bind_address = &self.config.api.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定API服务器地址失败: {bind_address}"))?;

        info!("回调服务监听地址: {bind_address}");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("回调服务收到关闭信号");
            })
            .await
            .context("回调服务运行失败")?;

        info!("回调服务已停止");
        Ok(())
    }
}
