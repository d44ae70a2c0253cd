use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 周期调度与同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub sync_enabled: bool,
    pub sync_rounds: u32,
    pub sync_retry_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_enabled: true,
            sync_rounds: 3,
            sync_retry_interval_seconds: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sync_rounds == 0 {
            return Err(anyhow::anyhow!("同步轮数必须大于0"));
        }
        Ok(())
    }
}

/// 执行记录管理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub stop_wait_timeout_seconds: u64,
    /// 各 vendor 类型保留的执行记录数量
    pub sweep_counts: HashMap<String, u32>,
    pub sweep_concurrency: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let mut sweep_counts = HashMap::new();
        sweep_counts.insert("RETENTION".to_string(), 50);
        sweep_counts.insert("SYSTEM_ARTIFACT_CLEANUP".to_string(), 50);
        Self {
            stop_wait_timeout_seconds: 10,
            sweep_counts,
            sweep_concurrency: 10,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stop_wait_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("停止等待超时时间必须大于0"));
        }
        if self.sweep_concurrency == 0 {
            return Err(anyhow::anyhow!("清理并发数必须大于0"));
        }
        if let Some((vendor, _)) = self.sweep_counts.iter().find(|(_, count)| **count == 0) {
            return Err(anyhow::anyhow!("{vendor} 的保留数量必须大于0"));
        }
        Ok(())
    }
}

/// 单个webhook请求的超时上限
pub const MAX_WEBHOOK_TIMEOUT_SECONDS: u64 = 30;

/// Webhook 投递配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub request_timeout_seconds: u64,
    pub max_attempts: u32,
    pub retry_backoff_millis: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 10,
            max_attempts: 3,
            retry_backoff_millis: 500,
        }
    }
}

impl WebhookConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_seconds == 0
            || self.request_timeout_seconds > MAX_WEBHOOK_TIMEOUT_SECONDS
        {
            return Err(anyhow::anyhow!(
                "webhook请求超时时间必须在1到{}秒之间",
                MAX_WEBHOOK_TIMEOUT_SECONDS
            ));
        }
        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("webhook投递次数必须大于0"));
        }
        Ok(())
    }
}
