pub mod config;
pub mod cron_utils;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::{AppConfig, RuntimeSettings};
pub use cron_utils::{validate_cron_expression, CronSpec};
pub use errors::{CoreError, CoreResult, ErrorKind};
pub use models::ExtraAttrs;
pub use traits::*;
