use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::DatabaseConfig,
    jobservice::{CoreConfig, JobServiceConfig, RegistryConfig},
    scheduler::{ExecutionConfig, SchedulerConfig, WebhookConfig},
};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "JOBCORE";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub jobservice: JobServiceConfig,
    pub registry: RegistryConfig,
    pub core: CoreConfig,
    pub scheduler: SchedulerConfig,
    pub execution: ExecutionConfig,
    pub webhook: WebhookConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: JOBCORE_, nested keys joined by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/jobcore.toml", "jobcore.toml", "/etc/jobcore/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 判断某个配置项是否被环境变量覆盖，被覆盖的运行时开关不允许再修改
    pub fn overridden_by_env(key: &str) -> bool {
        let var = format!("{}_{}", ENV_PREFIX, key.replace('.', "__").to_uppercase());
        std::env::var_os(var).is_some()
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.jobservice.validate().context("任务服务配置验证失败")?;
        self.registry.validate().context("制品服务配置验证失败")?;
        self.core.validate().context("核心配置验证失败")?;
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.execution.validate().context("执行记录配置验证失败")?;
        self.webhook.validate().context("Webhook配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}
