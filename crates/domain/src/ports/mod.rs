//! 外部系统端口
//!
//! 制品存储、删除与 webhook 发送都通过这些 trait 注入，便于替换与测试

mod artifacts;
mod delivery;

pub use artifacts::{ArtifactDeleter, ArtifactSource, RepositoryRef};
pub use delivery::{DeliveryResponse, WebhookSender};
