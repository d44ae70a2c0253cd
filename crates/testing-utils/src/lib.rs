//! # Testing Utils
//!
//! Shared test doubles, builders and database setup used by the other
//! crates' tests.
//!
//! ```toml
//! [dev-dependencies]
//! jobcore-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
