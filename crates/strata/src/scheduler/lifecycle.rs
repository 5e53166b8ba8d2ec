//! Driver lifecycle shared by the tick, render and input drivers.
//!
//! ```text
//!  Idle ──start()──> Running ──stop()──> Stopped
//!   │                  │ start()           ^  start() -> DriverStopped
//!   │                  └─> AlreadyRunning  │
//!   └──────────────stop()──────────────────┘
//! ```
//!
//! A stopped driver never resumes; restart means building a new one.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use strata_core::CoreError;

use crate::error::EngineError;

/// Where a driver is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// Constructed, not started.
    Idle,
    /// Thread running.
    Running,
    /// Stopped for good.
    Stopped,
}

impl DriverState {
    /// Transition for `start()`.
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyRunning`] or [`CoreError::DriverStopped`].
    pub fn begin(&mut self, what: &'static str) -> Result<(), CoreError> {
        match self {
            Self::Idle => {
                *self = Self::Running;
                Ok(())
            }
            Self::Running => {
                tracing::error!("attempt was made to start the {} twice", what);
                Err(CoreError::AlreadyRunning { what })
            }
            Self::Stopped => Err(CoreError::DriverStopped { what }),
        }
    }
}

/// A one-shot stop flag that sleeping drivers can wait on.
///
/// Lets a driver sleep out the rest of its pulse while still waking the
/// moment `stop` is called.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    /// Creates an unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every waiter.
    pub fn stop(&self) {
        let mut stopped = self.stopped.lock();
        *stopped = true;
        self.condvar.notify_all();
    }

    /// Returns true once [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleeps up to `timeout`. Returns true if stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped && !timeout.is_zero() {
            // Spurious wakeups only shorten the sleep; callers loop anyway
            let _ = self.condvar.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

/// First failure raised on a driver's threads.
///
/// Later failures are logged by their reporter and dropped; the first one is
/// what stopped the tick.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    error: Mutex<Option<EngineError>>,
}

impl ErrorSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `error` unless one is already held. Returns true if stored.
    pub fn record(&self, error: EngineError) -> bool {
        let mut slot = self.error.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(error);
        true
    }

    /// Copy of the stored error.
    #[must_use]
    pub fn get(&self) -> Option<EngineError> {
        self.error.lock().as_ref().map(EngineError::duplicate)
    }

    /// Returns true if an error was recorded.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.error.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_state_transitions() {
        let mut state = DriverState::Idle;
        assert!(state.begin("main thread").is_ok());
        assert_eq!(
            state.begin("main thread"),
            Err(CoreError::AlreadyRunning { what: "main thread" })
        );
        state = DriverState::Stopped;
        assert_eq!(
            state.begin("main thread"),
            Err(CoreError::DriverStopped { what: "main thread" })
        );
    }

    #[test]
    fn test_stop_wakes_sleeper() {
        let signal = Arc::new(StopSignal::new());
        let sleeper = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || {
                let start = Instant::now();
                assert!(signal.wait_timeout(Duration::from_secs(10)));
                start.elapsed()
            })
        };
        std::thread::sleep(Duration::from_millis(10));
        signal.stop();
        assert!(sleeper.join().unwrap() < Duration::from_secs(5));
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_error_slot_keeps_first() {
        let slot = ErrorSlot::new();
        assert!(slot.get().is_none());
        assert!(slot.record(EngineError::WorldAlreadyLoaded("a".into())));
        assert!(!slot.record(EngineError::WorldAlreadyLoaded("b".into())));
        assert!(slot.is_set());
        assert!(matches!(slot.get(), Some(EngineError::WorldAlreadyLoaded(name)) if name == "a"));
    }

    #[test]
    fn test_timeout_without_stop() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(1)));
        assert!(!signal.wait_timeout(Duration::ZERO));
    }
}
