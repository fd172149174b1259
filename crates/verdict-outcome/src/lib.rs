//! # Verdict Outcome
//!
//! The outcome model: a fixed, totally ordered set of verdict kinds and a
//! thread-safe tracker that reduces many recorded outcomes to one.
//!
//! ```
//! use verdict_outcome::{OutcomeKind, OutcomeTracker};
//!
//! let tracker = OutcomeTracker::new();
//! tracker.add_outcome(OutcomeKind::Passed, "checked the log", false, false).unwrap();
//! tracker.add_outcome(OutcomeKind::Failed, "wrong exit code", false, false).unwrap();
//! assert_eq!(tracker.outcome(), OutcomeKind::Failed);
//! ```

pub mod kind;
pub mod tracker;

pub use kind::{OutcomeDescriptor, OutcomeKind, PRECEDENCE};
pub use tracker::{Abort, Outcome, OutcomeTracker};
