use async_trait::async_trait;
use jobcore_core::CoreResult;

use crate::webhook::HookTarget;

/// 一次投递的响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    pub status: u16,
}

impl DeliveryResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 向目标地址发送 webhook 消息体
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, target: &HookTarget, body: &[u8]) -> CoreResult<DeliveryResponse>;
}
