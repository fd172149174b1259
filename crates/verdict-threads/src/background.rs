//! Named background threads with cooperative cancellation.
//!
//! A [`BackgroundThread`] runs a user function on its own OS thread and
//! hands it a [`ThreadContext`] carrying the `stopping` token and a tracing
//! span named after the thread. The function is expected to check the
//! token regularly; nothing ever kills a thread.
//!
//! Problems surface as outcomes when the thread is joined:
//! - still running at the join deadline: `TIMEDOUT`, and stop is requested
//! - the function failed or panicked: `BLOCKED`, unless stop had already
//!   been requested, in which case the failure is logged only

use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, Span};
use verdict_common::{timeouts::DEFAULT_WAIT_FOR_PROCESS_STOP, Error, Result};
use verdict_outcome::{Abort, OutcomeKind, OutcomeTracker};

use crate::token::StopToken;

/// What a thread's target receives.
#[derive(Debug, Clone)]
pub struct ThreadContext {
    /// Set when the thread is asked to stop.
    pub stopping: StopToken,
    /// Span carrying the thread name; entered for the whole run.
    pub log: Span,
    pub name: String,
}

#[derive(Debug, Clone)]
struct ThreadFailure {
    message: String,
    during_stop: bool,
}

/// Handle on one background thread.
#[derive(Debug)]
pub struct BackgroundThread {
    name: String,
    stopping: StopToken,
    finished: StopToken,
    failure: Mutex<Option<ThreadFailure>>,
    join_timeout: Duration,
    outcome_reported: AtomicBool,
    tracker: Arc<OutcomeTracker>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundThread {
    /// Starts `target` on a new thread called `name`.
    pub fn start<F>(
        name: impl Into<String>,
        tracker: Arc<OutcomeTracker>,
        join_timeout: Option<Duration>,
        target: F,
    ) -> Result<Arc<Self>>
    where
        F: FnOnce(ThreadContext) -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::validation("Background thread name must not be empty"));
        }

        let this = Arc::new(Self {
            name: name.clone(),
            stopping: StopToken::new(),
            finished: StopToken::new(),
            failure: Mutex::new(None),
            join_timeout: join_timeout.unwrap_or(DEFAULT_WAIT_FOR_PROCESS_STOP),
            outcome_reported: AtomicBool::new(false),
            tracker,
            handle: Mutex::new(None),
        });

        info!("Starting background thread {}", name);
        let runner = Arc::clone(&this);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || runner.run(target))?;
        *this.handle.lock() = Some(handle);

        Ok(this)
    }

    fn run<F>(&self, target: F)
    where
        F: FnOnce(ThreadContext) -> anyhow::Result<()>,
    {
        let span = info_span!("thread", name = %self.name);
        let _entered = span.enter();
        let context = ThreadContext {
            stopping: self.stopping.clone(),
            log: span.clone(),
            name: self.name.clone(),
        };

        debug!("Background thread {} starting", self.name);
        let message = match panic::catch_unwind(AssertUnwindSafe(|| target(context))) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
        };

        match message {
            None => debug!("Background thread {} completed successfully", self.name),
            Some(message) => {
                let during_stop = self.stopping.is_set();
                if during_stop {
                    info!(
                        "Background thread {} failed while being stopped (ignoring): {}",
                        self.name, message
                    );
                } else {
                    error!("Background thread {} failed: {}", self.name, message);
                }
                *self.failure.lock() = Some(ThreadFailure { message, during_stop });
            }
        }

        self.finished.set();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn join_timeout(&self) -> Duration {
        self.join_timeout
    }

    pub fn is_alive(&self) -> bool {
        !self.finished.is_set()
    }

    pub fn stop_requested(&self) -> bool {
        self.stopping.is_set()
    }

    /// The failure text if the target returned an error or panicked.
    pub fn error(&self) -> Option<String> {
        self.failure.lock().as_ref().map(|f| f.message.clone())
    }

    /// Requests the thread to stop and returns immediately.
    pub fn stop(&self) {
        debug!("Stop requested for background thread {}", self.name);
        self.stopping.set();
    }

    /// Waits for the thread to finish, reporting a timeout or failure once.
    ///
    /// `timeout` defaults to the thread's join timeout. Only the first join
    /// may report an outcome; later joins are silent.
    #[track_caller]
    pub fn join(&self, timeout: Option<Duration>, abort_on_error: bool) -> std::result::Result<(), Abort> {
        let first_join = !self.outcome_reported.swap(true, Ordering::SeqCst);
        let timeout = timeout.unwrap_or(self.join_timeout);

        if first_join || self.is_alive() {
            info!("Joining background thread {}", self.name);
        }

        let started = Instant::now();
        if !self.finished.wait(timeout) {
            // Ask it to stop before reporting so an abort still leaves it winding down
            self.stop();
            if first_join {
                self.tracker.add_outcome(
                    OutcomeKind::TimedOut,
                    format!(
                        "Background thread {} is still running after waiting for allocated timeout period ({} secs)",
                        self.name,
                        timeout.as_secs()
                    ),
                    abort_on_error,
                    false,
                )?;
            }
            return Ok(());
        }

        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }

        let failure = self.failure.lock().clone();
        if let Some(failure) = failure {
            if first_join && !failure.during_stop {
                self.tracker.add_outcome(
                    OutcomeKind::Blocked,
                    format!("Background thread {} failed with: {}", self.name, failure.message),
                    abort_on_error,
                    false,
                )?;
            }
        } else if started.elapsed() > Duration::from_secs(10) {
            info!(
                "Joined background thread {} in {:.1} seconds",
                self.name,
                started.elapsed().as_secs_f64()
            );
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    fn tracker() -> Arc<OutcomeTracker> {
        Arc::new(OutcomeTracker::new())
    }

    #[test]
    fn test_successful_thread_reports_nothing() {
        let tracker = tracker();
        let thread = BackgroundThread::start("worker", Arc::clone(&tracker), None, |ctx| {
            assert_eq!(ctx.name, "worker");
            Ok(())
        })
        .unwrap();

        thread.join(Some(Duration::from_secs(10)), false).unwrap();
        assert!(!thread.is_alive());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_timeout_reported_once_and_stop_requested() {
        let tracker = tracker();
        let poller = BackgroundThread::start("poller", Arc::clone(&tracker), None, |ctx| {
            while !ctx.stopping.wait(Duration::from_millis(20)) {}
            Ok(())
        })
        .unwrap();

        // First join only waits a moment and the thread ignores the deadline
        let stubborn = BackgroundThread::start("stubborn", Arc::clone(&tracker), None, |_ctx| {
            thread::sleep(Duration::from_millis(600));
            Ok(())
        })
        .unwrap();

        stubborn.join(Some(Duration::from_millis(50)), false).unwrap();
        stubborn.join(Some(Duration::from_millis(50)), false).unwrap();
        assert!(stubborn.stop_requested());

        let timeouts: Vec<_> = tracker
            .outcomes()
            .into_iter()
            .filter(|o| o.kind == OutcomeKind::TimedOut)
            .collect();
        assert_eq!(timeouts.len(), 1);
        assert!(timeouts[0].reason.contains("stubborn"));

        poller.stop();
        poller.join(Some(Duration::from_secs(10)), false).unwrap();
        stubborn.join(Some(Duration::from_secs(10)), false).unwrap();
        assert_eq!(tracker.outcomes().len(), 1);
    }

    #[test]
    fn test_failure_reports_blocked() {
        let tracker = tracker();
        let thread = BackgroundThread::start("failing", Arc::clone(&tracker), None, |_ctx| {
            bail!("connection refused")
        })
        .unwrap();

        thread.join(Some(Duration::from_secs(10)), false).unwrap();
        assert_eq!(tracker.outcome(), OutcomeKind::Blocked);
        assert!(tracker.outcome_reason().contains("connection refused"));
        assert_eq!(thread.error().as_deref(), Some("connection refused"));

        // Nothing more on a second join
        thread.join(None, false).unwrap();
        assert_eq!(tracker.outcomes().len(), 1);
    }

    #[test]
    fn test_failure_after_stop_is_not_an_outcome() {
        let tracker = tracker();
        let thread = BackgroundThread::start("shutdown-noise", Arc::clone(&tracker), None, |ctx| {
            ctx.stopping.wait(Duration::from_secs(30));
            bail!("socket closed during shutdown")
        })
        .unwrap();

        thread.stop();
        thread.join(Some(Duration::from_secs(10)), false).unwrap();
        assert!(tracker.is_empty());
        assert!(thread.error().is_some());
    }

    #[test]
    fn test_panic_is_captured() {
        let tracker = tracker();
        let thread = BackgroundThread::start("panicky", Arc::clone(&tracker), None, |_ctx| {
            panic!("bad state");
        })
        .unwrap();

        thread.join(Some(Duration::from_secs(10)), false).unwrap();
        assert_eq!(tracker.outcome(), OutcomeKind::Blocked);
        assert!(tracker.outcome_reason().contains("bad state"));
    }

    #[test]
    fn test_abort_on_error_propagates() {
        let tracker = tracker();
        let thread = BackgroundThread::start("aborting", Arc::clone(&tracker), None, |_ctx| {
            bail!("fatal")
        })
        .unwrap();

        let abort = thread.join(Some(Duration::from_secs(10)), true).unwrap_err();
        assert_eq!(abort.kind, OutcomeKind::Blocked);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(BackgroundThread::start("", tracker(), None, |_ctx| Ok(())).is_err());
    }
}
