//! Per-owner collection of background threads.

use crate::background::{BackgroundThread, ThreadContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use verdict_common::Result;
use verdict_outcome::OutcomeTracker;

/// Tracks every thread an owner started so they can be shut down together.
#[derive(Debug)]
pub struct ThreadRegistry {
    tracker: Arc<OutcomeTracker>,
    join_timeout: Duration,
    threads: Vec<Arc<BackgroundThread>>,
}

impl ThreadRegistry {
    pub fn new(tracker: Arc<OutcomeTracker>, join_timeout: Duration) -> Self {
        Self {
            tracker,
            join_timeout,
            threads: Vec::new(),
        }
    }

    /// Starts and registers a thread.
    pub fn start<F>(&mut self, name: impl Into<String>, target: F) -> Result<Arc<BackgroundThread>>
    where
        F: FnOnce(ThreadContext) -> anyhow::Result<()> + Send + 'static,
    {
        let thread = BackgroundThread::start(
            name,
            Arc::clone(&self.tracker),
            Some(self.join_timeout),
            target,
        )?;
        self.threads.push(Arc::clone(&thread));
        Ok(thread)
    }

    /// Registers a thread started elsewhere.
    pub fn register(&mut self, thread: Arc<BackgroundThread>) {
        self.threads.push(thread);
    }

    pub fn threads(&self) -> &[Arc<BackgroundThread>] {
        &self.threads
    }

    /// Requests every thread to stop, then joins each in turn.
    ///
    /// Stop requests all go out before the first join so threads wind down
    /// in parallel. Timeouts and failures are recorded as outcomes.
    pub fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        debug!("Stopping {} background threads", self.threads.len());
        for thread in &self.threads {
            thread.stop();
        }
        for thread in self.threads.drain(..) {
            // Never aborts without abort_on_error
            let _ = thread.join(None, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_outcome::OutcomeKind;

    #[test]
    fn test_shutdown_stops_all_threads() {
        let tracker = Arc::new(OutcomeTracker::new());
        let mut registry = ThreadRegistry::new(Arc::clone(&tracker), Duration::from_secs(10));

        let threads: Vec<_> = (0..3)
            .map(|i| {
                registry
                    .start(format!("looper-{}", i), |ctx| {
                        while !ctx.stopping.wait(Duration::from_millis(10)) {}
                        Ok(())
                    })
                    .unwrap()
            })
            .collect();

        registry.shutdown();
        assert!(registry.threads().is_empty());
        assert!(threads.iter().all(|t| !t.is_alive()));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_shutdown_reports_stuck_thread() {
        let tracker = Arc::new(OutcomeTracker::new());
        let mut registry = ThreadRegistry::new(Arc::clone(&tracker), Duration::from_millis(100));

        registry
            .start("deaf", |_ctx| {
                std::thread::sleep(Duration::from_millis(800));
                Ok(())
            })
            .unwrap();

        registry.shutdown();
        assert_eq!(tracker.outcome(), OutcomeKind::TimedOut);
    }
}
