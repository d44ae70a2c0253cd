//! jobcore 进程装配与生命周期管理

pub mod app;
pub mod shutdown;
