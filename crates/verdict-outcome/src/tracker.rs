//! Thread-safe accumulation of outcomes.
//!
//! Any thread (the test itself, monitors, background threads) may call
//! [`OutcomeTracker::add_outcome`]. The tracker keeps every outcome in
//! insertion order and reduces them on demand: the winner is the entry with
//! the best precedence, and among equal kinds the first one recorded.

use crate::kind::OutcomeKind;
use parking_lot::Mutex;
use std::panic::Location;
use thiserror::Error;
use tracing::{info, warn};

/// One recorded outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub reason: String,
    /// `file:line` of the call that recorded it, if known.
    pub location: Option<String>,
}

/// Raised by `add_outcome` when a failure is recorded with `abort_on_error`.
///
/// Propagate it with `?` to unwind the current phase of the test. The
/// owner's cleanup runs regardless, from `Drop`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Aborting with {kind} outcome: {reason}")]
pub struct Abort {
    pub kind: OutcomeKind,
    pub reason: String,
}

/// The accumulator. Share it with `Arc`.
#[derive(Debug, Default)]
pub struct OutcomeTracker {
    outcomes: Mutex<Vec<Outcome>>,
}

impl OutcomeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, attributing it to the caller's source location.
    ///
    /// With `override_previous` every earlier outcome is discarded first.
    /// Returns `Err(Abort)` when `abort_on_error` is set and `kind` is a failure.
    #[track_caller]
    pub fn add_outcome(
        &self,
        kind: OutcomeKind,
        reason: impl Into<String>,
        abort_on_error: bool,
        override_previous: bool,
    ) -> Result<(), Abort> {
        let caller = Location::caller();
        let location = format!("{}:{}", caller.file(), caller.line());
        self.add_outcome_at(kind, reason, Some(location), abort_on_error, override_previous)
    }

    /// Like [`add_outcome`](Self::add_outcome) with an explicit location.
    pub fn add_outcome_at(
        &self,
        kind: OutcomeKind,
        reason: impl Into<String>,
        location: Option<String>,
        abort_on_error: bool,
        override_previous: bool,
    ) -> Result<(), Abort> {
        let reason = clean_reason(&reason.into());

        {
            let mut outcomes = self.outcomes.lock();
            if override_previous {
                outcomes.clear();
            }
            outcomes.push(Outcome {
                kind,
                reason: reason.clone(),
                location: location.clone(),
            });
        }

        let at = location.as_deref().unwrap_or("unknown location");
        if kind.is_failure() {
            warn!("Adding outcome {}: {} [{}]", kind, reason, at);
        } else {
            info!("Adding outcome {}: {} [{}]", kind, reason, at);
        }

        if abort_on_error && kind.is_failure() {
            return Err(Abort { kind, reason });
        }
        Ok(())
    }

    fn winner(&self) -> Option<Outcome> {
        // min_by_key keeps the first of several equal minima
        self.outcomes.lock().iter().min_by_key(|o| o.kind).cloned()
    }

    /// The winning kind, or `NotVerified` when nothing has been recorded.
    pub fn outcome(&self) -> OutcomeKind {
        self.winner().map(|o| o.kind).unwrap_or(OutcomeKind::NotVerified)
    }

    /// Reason of the winning outcome; empty when nothing has been recorded.
    pub fn outcome_reason(&self) -> String {
        self.winner().map(|o| o.reason).unwrap_or_default()
    }

    pub fn outcome_location(&self) -> Option<String> {
        self.winner().and_then(|o| o.location)
    }

    /// Winning reason, noting how many other failures were recorded.
    pub fn summary(&self) -> String {
        let outcomes = self.outcomes.lock();
        let Some(winner) = outcomes.iter().min_by_key(|o| o.kind) else {
            return String::new();
        };
        let failures = outcomes.iter().filter(|o| o.kind.is_failure()).count();
        if winner.kind.is_failure() && failures > 1 {
            format!("{} (+{} other failures)", winner.reason, failures - 1)
        } else {
            winner.reason.clone()
        }
    }

    /// Snapshot of every recorded outcome in insertion order.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.lock().iter().filter(|o| o.kind.is_failure()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.lock().is_empty()
    }
}

/// Trims, turns tabs into spaces and drops control characters other than newlines.
fn clean_reason(reason: &str) -> String {
    reason
        .trim()
        .replace('\t', " ")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\r')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_tracker_is_not_verified() {
        let tracker = OutcomeTracker::new();
        assert_eq!(tracker.outcome(), OutcomeKind::NotVerified);
        assert_eq!(tracker.outcome_reason(), "");
        assert_eq!(tracker.outcome_location(), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_highest_precedence_wins_regardless_of_order() {
        let sequences = [
            vec![OutcomeKind::Passed, OutcomeKind::Failed, OutcomeKind::Inspect],
            vec![OutcomeKind::Inspect, OutcomeKind::Passed],
            vec![OutcomeKind::Failed, OutcomeKind::TimedOut, OutcomeKind::Passed],
            vec![OutcomeKind::Passed, OutcomeKind::Skipped, OutcomeKind::Blocked],
            vec![OutcomeKind::NotVerified, OutcomeKind::DumpedCore],
        ];
        for sequence in sequences {
            let tracker = OutcomeTracker::new();
            for kind in &sequence {
                tracker.add_outcome(*kind, format!("{}", kind), false, false).unwrap();
            }
            let expected = sequence.iter().min().copied().unwrap();
            assert_eq!(tracker.outcome(), expected, "sequence {:?}", sequence);
            assert_eq!(tracker.outcome_reason(), expected.to_string());
        }
    }

    #[test]
    fn test_ties_broken_by_first_occurrence() {
        let tracker = OutcomeTracker::new();
        tracker.add_outcome(OutcomeKind::Passed, "ok", false, false).unwrap();
        tracker.add_outcome(OutcomeKind::Failed, "first failure", false, false).unwrap();
        tracker.add_outcome(OutcomeKind::Failed, "second failure", false, false).unwrap();

        assert_eq!(tracker.outcome(), OutcomeKind::Failed);
        assert_eq!(tracker.outcome_reason(), "first failure");
        assert_eq!(tracker.summary(), "first failure (+1 other failures)");
    }

    #[test]
    fn test_override_discards_previous() {
        let tracker = OutcomeTracker::new();
        tracker.add_outcome(OutcomeKind::Blocked, "early problem", false, false).unwrap();
        tracker.add_outcome(OutcomeKind::Passed, "all good after all", false, true).unwrap();

        assert_eq!(tracker.outcome(), OutcomeKind::Passed);
        assert_eq!(tracker.outcomes().len(), 1);
    }

    #[test]
    fn test_abort_only_for_failures() {
        let tracker = OutcomeTracker::new();
        assert!(tracker.add_outcome(OutcomeKind::Inspect, "look", true, false).is_ok());

        let abort = tracker
            .add_outcome(OutcomeKind::TimedOut, "too slow", true, false)
            .unwrap_err();
        assert_eq!(abort.kind, OutcomeKind::TimedOut);
        assert_eq!(abort.reason, "too slow");
        // Still recorded
        assert_eq!(tracker.outcome(), OutcomeKind::TimedOut);
    }

    #[test]
    fn test_location_points_at_caller() {
        let tracker = OutcomeTracker::new();
        tracker.add_outcome(OutcomeKind::Failed, "boom", false, false).unwrap();
        let location = tracker.outcome_location().unwrap();
        assert!(location.contains("tracker.rs:"), "unexpected location {}", location);
    }

    #[test]
    fn test_reason_is_cleaned() {
        let tracker = OutcomeTracker::new();
        tracker
            .add_outcome(OutcomeKind::Failed, "  value\twas\u{7}  wrong \n", false, false)
            .unwrap();
        assert_eq!(tracker.outcome_reason(), "value was  wrong");
    }

    #[test]
    fn test_concurrent_add_outcome() {
        let tracker = Arc::new(OutcomeTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let kind = if i == 3 { OutcomeKind::Blocked } else { OutcomeKind::Passed };
                        tracker.add_outcome(kind, format!("thread {}", i), false, false).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.outcomes().len(), 400);
        assert_eq!(tracker.outcome(), OutcomeKind::Blocked);
        assert_eq!(tracker.failure_count(), 50);
    }
}
