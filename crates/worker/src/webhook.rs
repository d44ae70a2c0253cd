//! webhook 投递作业

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobcore_core::{config::models::WebhookConfig, models::vendor, CoreError, CoreResult};
use jobcore_domain::{ports::WebhookSender, webhook::DeliveryParams};
use serde_json::{json, Map, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::context::JobContext;
use crate::job::{Job, JobOutput};

/// 把 payload POST 到目标地址，失败时按指数退避重试
pub struct WebhookDeliveryJob {
    sender: Arc<dyn WebhookSender>,
    max_attempts: u32,
    backoff: Duration,
}

impl WebhookDeliveryJob {
    pub fn new(sender: Arc<dyn WebhookSender>, config: &WebhookConfig) -> Self {
        Self {
            sender,
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_millis),
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[async_trait]
impl Job for WebhookDeliveryJob {
    fn name(&self) -> &'static str {
        vendor::WEBHOOK
    }

    fn max_fails(&self) -> u32 {
        self.max_attempts
    }

    fn validate(&self, params: &Map<String, Value>) -> CoreResult<()> {
        let params = DeliveryParams::from_params(params)?;
        url::Url::parse(&params.target.address)
            .map_err(|e| CoreError::invalid(format!("无效的投递地址 {}: {e}", params.target.address)))?;
        Ok(())
    }

    async fn run(&self, ctx: &dyn JobContext, params: &Map<String, Value>) -> CoreResult<JobOutput> {
        let params = DeliveryParams::from_params(params)?;
        let body = params.payload.as_bytes();
        let mut last_err = None;

        for attempt in 1..=self.max_attempts {
            if ctx.is_stopped() {
                break;
            }
            match self.sender.send(&params.target, body).await {
                Ok(response) if response.is_success() => {
                    info!(
                        "webhook 投递到 {} 成功，第 {} 次尝试",
                        params.target.address, attempt
                    );
                    return Ok(json!({"status": response.status, "attempts": attempt}));
                }
                Ok(response) => {
                    warn!("webhook 目标 {} 返回 HTTP {}", params.target.address, response.status);
                    last_err = Some(CoreError::Unavailable(format!(
                        "{} 返回 HTTP {}",
                        params.target.address, response.status
                    )));
                }
                Err(e) => {
                    warn!("webhook 投递到 {} 失败: {}", params.target.address, e);
                    last_err = Some(e);
                }
            }
            if attempt < self.max_attempts {
                let wait = self.backoff_for(attempt);
                debug!("{}ms 后重试", wait.as_millis());
                sleep(wait).await;
            }
        }

        Err(last_err.unwrap_or_else(|| CoreError::Unavailable("webhook 投递已停止".to_string())))
    }
}
