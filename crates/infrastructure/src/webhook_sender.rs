//! webhook 目标的 HTTP 投递

use async_trait::async_trait;
use jobcore_core::{CoreError, CoreResult};
use jobcore_domain::ports::{DeliveryResponse, WebhookSender};
use jobcore_domain::webhook::HookTarget;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, instrument};

/// 按目标的 skip_cert_verify 选择客户端
pub struct HttpWebhookSender {
    secure: reqwest::Client,
    insecure: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new(timeout: Duration) -> CoreResult<Self> {
        let build = |skip_verify: bool| {
            reqwest::Client::builder()
                .timeout(timeout)
                .danger_accept_invalid_certs(skip_verify)
                .build()
                .map_err(|e| CoreError::Internal(format!("创建HTTP客户端失败: {e}")))
        };
        Ok(Self {
            secure: build(false)?,
            insecure: build(true)?,
        })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    #[instrument(skip(self, body), fields(address = %target.address))]
    async fn send(&self, target: &HookTarget, body: &[u8]) -> CoreResult<DeliveryResponse> {
        let client = if target.skip_cert_verify {
            &self.insecure
        } else {
            &self.secure
        };

        let mut request = client
            .post(&target.address)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec());
        if !target.auth_header.is_empty() {
            request = request.header(AUTHORIZATION, &target.auth_header);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Unavailable(format!("投递到 {} 失败: {e}", target.address)))?;
        let status = response.status().as_u16();
        debug!("webhook 目标返回 HTTP {}", status);
        Ok(DeliveryResponse { status })
    }
}
