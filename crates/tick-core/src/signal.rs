//! Cooperative run signal.
//!
//! A `RunSignal` is created by the owning process and cloned into every
//! component at construction time. Components check [`RunSignal::is_running`]
//! at their loop boundaries; nothing is preempted. Threads that only need to
//! sleep until the run ends can block in [`RunSignal::wait_timeout`] and are
//! woken as soon as [`RunSignal::stop`] is called.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct SignalInner {
    running: AtomicBool,
    lock: Mutex<()>,
    stopped: Condvar,
}

/// Shared running flag with wake-up on stop.
#[derive(Clone)]
pub struct RunSignal {
    inner: Arc<SignalInner>,
}

impl RunSignal {
    /// Create a signal in the running state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                running: AtomicBool::new(true),
                lock: Mutex::new(()),
                stopped: Condvar::new(),
            }),
        }
    }

    /// Whether `stop` has not been called yet
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Flip to stopped and wake every waiter. Idempotent.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        let _guard = self.inner.lock.lock();
        self.inner.stopped.notify_all();
    }

    /// Block until the signal stops or `timeout` elapses.
    ///
    /// Returns `true` if the signal was stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();
        while self.is_running() {
            if self
                .inner
                .stopped
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                break;
            }
        }
        !self.is_running()
    }
}

impl Default for RunSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunSignal")
            .field("running", &self.is_running())
            .finish()
    }
}
