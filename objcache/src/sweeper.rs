//! Background sweep loop and its stop signal.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

/// Cooperative stop signal shared by a cache and its sweeper thread.
pub(crate) struct Shutdown {
    stopped: Mutex<bool>,
    signal: Condvar,
}

impl Shutdown {
    pub(crate) fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    /// Raises the stop flag and wakes the sweeper.
    ///
    /// Returns false if the flag was already raised.
    pub(crate) fn trigger(&self) -> bool {
        let mut stopped = self.stopped.lock();
        if *stopped {
            return false;
        }
        *stopped = true;
        self.signal.notify_all();
        true
    }

    pub(crate) fn is_triggered(&self) -> bool {
        *self.stopped.lock()
    }

    /// Blocks until `deadline` passes or the flag is raised.
    ///
    /// A `None` deadline lies beyond what `Instant` can represent, so only the
    /// flag ends the wait. Returns true if the flag was raised.
    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut stopped = self.stopped.lock();
        match deadline {
            Some(deadline) => {
                while !*stopped && Instant::now() < deadline {
                    self.signal.wait_until(&mut stopped, deadline);
                }
            }
            None => {
                while !*stopped {
                    self.signal.wait(&mut stopped);
                }
            }
        }
        *stopped
    }
}

/// Calls `tick` every `interval` until `shutdown` is triggered.
///
/// Ticks that fall behind are dropped rather than run back to back. A tick
/// already in progress when shutdown is triggered runs to completion. A
/// panicking tick is logged and the schedule continues.
pub(crate) fn run<F>(shutdown: &Shutdown, interval: Duration, mut tick: F)
where
    F: FnMut(),
{
    let mut next = Instant::now().checked_add(interval);
    loop {
        if shutdown.wait_until(next) {
            break;
        }
        if panic::catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
            error!("Sweep pass panicked");
        }

        let now = Instant::now();
        next = next
            .and_then(|at| at.checked_add(interval))
            .filter(|at| *at > now)
            .or_else(|| now.checked_add(interval));
    }
    debug!("Sweeper stopped");
}
