//! # Verdict Common
//!
//! Types and utilities shared across the verdict crates: error types,
//! the count-condition mini-language, default timeouts, duration
//! (de)serialization and logging setup.

pub mod condition;
pub mod duration_serde;
pub mod errors;
pub mod logging;
pub mod timeouts;
pub mod types;

// Re-export commonly used items
pub use condition::{Comparison, Condition};
pub use errors::{Error, ProcessError, ProcessResult, Result, ResultExt};
pub use logging::init_logging;
pub use timeouts::Timeouts;
pub use types::ExecutionMode;
