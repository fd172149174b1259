//! # Verdict Threads
//!
//! Background threads for tests: each runs a user function with a
//! cooperative stop token and a thread-named tracing span, and reports
//! timeouts or failures into the owner's outcome tracker when joined.

pub mod background;
pub mod registry;
pub mod token;

pub use background::{BackgroundThread, ThreadContext};
pub use registry::ThreadRegistry;
pub use token::StopToken;
