//! A settable, waitable flag shared between threads.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative cancellation token.
///
/// Once set it stays set. Clones share the same flag. Threads poll
/// [`is_set`](Self::is_set) or sleep with [`wait`](Self::wait), which
/// returns early as soon as the token is set.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleeps up to `timeout`, returning `true` if the token was set.
    ///
    /// A timeout too large to express as a deadline waits until set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let (flag, cvar) = &*self.inner;
        let mut set = flag.lock();
        while !*set {
            match deadline {
                Some(deadline) => {
                    if cvar.wait_until(&mut set, deadline).timed_out() {
                        break;
                    }
                }
                None => cvar.wait(&mut set),
            }
        }
        *set
    }
}
