pub mod models;
pub mod runtime;

pub use models::*;
pub use runtime::RuntimeSettings;
