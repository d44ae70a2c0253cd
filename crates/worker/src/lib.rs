//! worker 侧的作业实现
//!
//! 核心向 worker pool 提交的作业在这里落地：保留任务按候选列表删除或汇报，
//! webhook 投递作业把 payload 发送到目标地址。

pub mod context;
pub mod job;
pub mod registry;
pub mod retention;
pub mod webhook;

pub use context::{JobContext, RecordingContext};
pub use job::{Job, JobOutput};
pub use registry::JobRegistry;
pub use retention::RetentionJob;
pub use webhook::WebhookDeliveryJob;
