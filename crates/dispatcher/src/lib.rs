//! 调度与投递核心
//!
//! 周期调度、执行与任务管理、状态回调处理、保留策略与系统清理控制器，
//! 以及 webhook 策略管理和进程内通知总线。各组件通过构造函数显式注入依赖。

pub mod callback;
pub mod cleanup;
pub mod execution;
pub mod hook;
pub mod notification;
pub mod retention;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod webhook;

pub use callback::{CallbackFn, CallbackRegistry};
pub use cleanup::SystemArtifactCleanupController;
pub use execution::{ExecutionManager, Sweeper};
pub use hook::{CheckInProcessor, HookHandler};
pub use notification::{EventHandler, NotificationBus, WebhookNotifier};
pub use retention::{Launcher, RetentionController, RetentionLauncher};
pub use scheduler::PeriodicScheduler;
pub use sync::{ScheduleSyncWorker, SyncReport};
pub use task::TaskManager;
pub use webhook::{HookManager, WebhookPolicyManager};
