use serde::{Deserialize, Serialize};

/// 外部任务服务（worker pool）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobServiceConfig {
    pub url: String,
    pub request_timeout_seconds: u64,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8888".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl JobServiceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(anyhow::anyhow!("任务服务URL必须以http://或https://开头"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("任务服务请求超时时间必须大于0"));
        }
        Ok(())
    }
}

/// 核心服务自身对外可见的地址
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// 状态回调地址前缀，worker pool 通过它回调 /service/notifications/...
    pub hook_base_url: String,
    /// 用于拼接 resource_url 的外部访问地址
    pub external_endpoint: String,
    pub read_only: bool,
    pub notification_enabled: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            hook_base_url: "http://localhost:8080".to_string(),
            external_endpoint: "https://registry.local".to_string(),
            read_only: false,
            notification_enabled: true,
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.hook_base_url.is_empty() {
            return Err(anyhow::anyhow!("回调地址前缀不能为空"));
        }
        if self.external_endpoint.is_empty() {
            return Err(anyhow::anyhow!("外部访问地址不能为空"));
        }
        Ok(())
    }
}

/// 制品元数据服务配置，保留任务通过它列出与删除制品
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    pub request_timeout_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(anyhow::anyhow!("制品服务URL必须以http://或https://开头"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("制品服务请求超时时间必须大于0"));
        }
        Ok(())
    }
}
