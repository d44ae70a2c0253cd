//! 进程内通知总线与事件处理器

pub mod bus;
pub mod handlers;

pub use bus::{EventHandler, NotificationBus};
pub use handlers::{register_webhook_handlers, WebhookNotifier};
