//! 保留策略的调度、执行与结果查询

pub mod controller;
pub mod launcher;

pub use controller::{RetentionCallbackParam, RetentionController, RetentionExecView, RetentionTaskView};
pub use launcher::{Launcher, RetentionLauncher};
