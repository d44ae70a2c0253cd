//! Webhook 策略管理与投递

pub mod hook_manager;
pub mod policy_manager;

pub use hook_manager::HookManager;
pub use policy_manager::{PolicyTriggerView, WebhookPolicyManager};
