//! # Tick Driver
//!
//! The main thread of the engine. Runs one tick per pulse (50 ms by default)
//! independent of any render frame rate.
//!
//! ```text
//!  Tasks         run_due(tick)               tick thread alone
//!  Stage1        ┐
//!  Stage2        │ barrier.advance()          async managers in parallel,
//!  Finalize      │                            all finish before the next
//!  PreSnapshot   ┘                            stage (read-only)
//!  CopySnapshot  registry.commit()            tick thread alone
//!                copy_snapshot_run() each
//!  ── advance ──> Tasks of tick + 1
//!  sleep out the rest of the pulse; a late tick is followed immediately
//! ```
//!
//! Any failure halts the driver. The first error is kept and readable
//! through [`TickDriver::last_error`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use strata_core::{CoreError, SnapshotRegistry, StageBarrier, StageToken, TickStage};

use super::lifecycle::{DriverState, ErrorSlot, StopSignal};
use super::manager::{AsyncManager, CopySnapshotManager, ManagerId, ManagerThread};
use super::pulse::{Pulse, TickStats};
use super::task::TaskManager;
use crate::error::{EngineError, EngineResult};

const WHAT: &str = "main thread";

struct DriverInner {
    barrier: Arc<StageBarrier>,
    registry: SnapshotRegistry,
    tasks: TaskManager,
    snapshot_managers: RwLock<Vec<Arc<dyn CopySnapshotManager>>>,
    managers: Mutex<Vec<ManagerThread>>,
    /// Removed managers whose threads have not been joined yet.
    retired: Mutex<Vec<ManagerThread>>,
    errors: Arc<ErrorSlot>,
    stats: Mutex<TickStats>,
    signal: StopSignal,
    stop_requested: AtomicBool,
    interval: Duration,
}

impl DriverInner {
    /// Runs one full tick, from `Tasks` to `Tasks` of the next tick.
    fn run_tick(&self) -> EngineResult<StageToken> {
        let tick = self.barrier.current().tick;
        self.tasks.run_due(tick)?;

        loop {
            let token = self.barrier.advance()?;
            if token.stage == TickStage::CopySnapshot {
                break;
            }
        }

        self.registry.commit()?;
        let snapshot_managers = self.snapshot_managers.read().clone();
        for manager in &snapshot_managers {
            manager.copy_snapshot_run()?;
        }

        Ok(self.barrier.advance()?)
    }

    /// Halts the driver after a failed tick.
    fn fail(&self, error: EngineError) {
        if self.stop_requested.load(Ordering::Acquire) {
            // Stopping mid-tick surfaces as a stopped barrier; not a failure
            tracing::debug!("tick interrupted by stop: {}", error);
        } else {
            tracing::error!("tick driver halted: {}", error);
            self.errors.record(error);
        }
        self.barrier.stop();
        self.signal.stop();
    }

    fn run(&self) {
        tracing::info!("tick driver started ({:?} pulse)", self.interval);
        let mut pulse = Pulse::new(self.interval);

        while !self.signal.is_stopped() {
            pulse.begin();
            let tick = self.barrier.current().tick;
            let result = self.run_tick();
            let overrun = pulse.end();
            *self.stats.lock() = *pulse.stats();

            if let Err(e) = result {
                self.fail(e);
                break;
            }
            if let Some(overrun) = overrun {
                tracing::warn!(
                    "tick {} overran its {:?} budget by {:?}",
                    tick,
                    self.interval,
                    overrun
                );
            }
            if self.signal.wait_timeout(pulse.remaining()) {
                break;
            }
        }
        tracing::info!("tick driver exited at tick {}", self.barrier.current().tick);
    }
}

/// Fixed-cadence tick driver.
pub struct TickDriver {
    inner: Arc<DriverInner>,
    state: Mutex<DriverState>,
    /// Held for the whole of a manual `step` and while `start` spawns.
    stepping: Mutex<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TickDriver {
    /// Creates an idle driver over `registry`'s clock.
    ///
    /// # Errors
    ///
    /// [`EngineError::Io`] if the async worker pool cannot spawn.
    pub fn new(registry: SnapshotRegistry, interval: Duration, worker_threads: usize) -> EngineResult<Self> {
        let clock = registry.clock().clone();
        Ok(Self {
            inner: Arc::new(DriverInner {
                barrier: StageBarrier::new(clock.clone()),
                tasks: TaskManager::new(clock, worker_threads)?,
                registry,
                snapshot_managers: RwLock::new(Vec::new()),
                managers: Mutex::new(Vec::new()),
                retired: Mutex::new(Vec::new()),
                errors: Arc::new(ErrorSlot::new()),
                stats: Mutex::new(*Pulse::new(interval).stats()),
                signal: StopSignal::new(),
                stop_requested: AtomicBool::new(false),
                interval,
            }),
            state: Mutex::new(DriverState::Idle),
            stepping: Mutex::new(()),
            thread: Mutex::new(None),
        })
    }

    /// Spawns the tick thread.
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyRunning`] on a second call or while a
    /// [`step`](Self::step) is in progress,
    /// [`CoreError::DriverStopped`] after [`stop`](Self::stop).
    pub fn start(&self) -> EngineResult<()> {
        let Some(_stepping) = self.stepping.try_lock() else {
            tracing::error!("attempt was made to start the {} during a manual step", WHAT);
            return Err(CoreError::AlreadyRunning { what: WHAT }.into());
        };
        let mut state = self.state.lock();
        state.begin(WHAT)?;

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("strata-tick".into())
            .spawn(move || inner.run());
        match spawned {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                *state = DriverState::Idle;
                Err(e.into())
            }
        }
    }

    /// Runs one tick on the calling thread. Only valid before `start`.
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyRunning`] while the tick thread or another step
    /// runs, [`CoreError::DriverStopped`] once stopped or halted, otherwise
    /// the error that halted the tick.
    pub fn step(&self) -> EngineResult<StageToken> {
        let Some(_stepping) = self.stepping.try_lock() else {
            return Err(CoreError::AlreadyRunning { what: WHAT }.into());
        };
        match *self.state.lock() {
            DriverState::Idle => {}
            DriverState::Running => return Err(CoreError::AlreadyRunning { what: WHAT }.into()),
            DriverState::Stopped => return Err(CoreError::DriverStopped { what: WHAT }.into()),
        }
        self.inner.run_tick().map_err(|e| {
            let reported = e.duplicate();
            self.inner.fail(e);
            reported
        })
    }

    /// Stops the tick thread and every manager thread.
    ///
    /// Idempotent, safe before `start` and from any thread, including the
    /// tick thread itself.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == DriverState::Stopped {
                return;
            }
            *state = DriverState::Stopped;
        }
        self.inner.stop_requested.store(true, Ordering::Release);
        self.inner.barrier.stop();
        self.inner.signal.stop();

        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!("tick thread panicked");
            }
        }
        let mut managers = std::mem::take(&mut *self.inner.managers.lock());
        managers.append(&mut self.inner.retired.lock());
        for manager in &mut managers {
            manager.join();
        }
        self.inner.tasks.shutdown();
        tracing::info!("tick driver stopped at tick {}", self.tick());
    }

    /// Registers `manager` as a stage participant on its own thread.
    ///
    /// It is first released by the next stage transition.
    ///
    /// # Errors
    ///
    /// [`CoreError::DriverStopped`] once stopped; [`EngineError::Io`] if the
    /// thread cannot spawn.
    pub fn add_async_manager(&self, manager: Arc<dyn AsyncManager>) -> EngineResult<ManagerId> {
        if *self.state.lock() == DriverState::Stopped {
            return Err(CoreError::DriverStopped { what: WHAT }.into());
        }
        let thread = ManagerThread::spawn(manager, &self.inner.barrier, Arc::clone(&self.inner.errors))?;
        let id = thread.id();
        self.inner.managers.lock().push(thread);
        Ok(id)
    }

    /// Removes a manager. It leaves the barrier at the next stage release.
    ///
    /// Returns false if `id` is unknown.
    pub fn remove_async_manager(&self, id: ManagerId) -> bool {
        let mut managers = self.inner.managers.lock();
        let Some(index) = managers.iter().position(|m| m.id() == id) else {
            return false;
        };
        let thread = managers.remove(index);
        drop(managers);
        thread.retire();
        self.inner.retired.lock().push(thread);
        true
    }

    /// Every registered async manager.
    #[must_use]
    pub fn async_managers(&self) -> Vec<Arc<dyn AsyncManager>> {
        self.inner
            .managers
            .lock()
            .iter()
            .map(|m| Arc::clone(m.manager()))
            .collect()
    }

    /// Adds a manager called during `CopySnapshot`, after the registry commit.
    pub fn add_snapshot_manager(&self, manager: Arc<dyn CopySnapshotManager>) {
        tracing::debug!("snapshot manager {} registered", manager.name());
        self.inner.snapshot_managers.write().push(manager);
    }

    /// Removes a snapshot manager. Returns false if it was not registered.
    pub fn remove_snapshot_manager(&self, manager: &Arc<dyn CopySnapshotManager>) -> bool {
        let target = Arc::as_ptr(manager).cast::<()>();
        let mut managers = self.inner.snapshot_managers.write();
        let before = managers.len();
        managers.retain(|m| Arc::as_ptr(m).cast::<()>() != target);
        before != managers.len()
    }

    /// The task queue drained in `Tasks`.
    #[must_use]
    pub fn tasks(&self) -> &TaskManager {
        &self.inner.tasks
    }

    /// The stage barrier.
    #[must_use]
    pub fn barrier(&self) -> &Arc<StageBarrier> {
        &self.inner.barrier
    }

    /// The registry committed in `CopySnapshot`.
    #[must_use]
    pub fn registry(&self) -> &SnapshotRegistry {
        &self.inner.registry
    }

    /// Current tick number.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.inner.barrier.current().tick
    }

    /// Current stage and tick.
    #[must_use]
    pub fn current(&self) -> StageToken {
        self.inner.barrier.current()
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        *self.state.lock()
    }

    /// Returns true while the tick thread runs and has not halted.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == DriverState::Running && !self.inner.signal.is_stopped()
    }

    /// Pulse timing statistics.
    #[must_use]
    pub fn stats(&self) -> TickStats {
        *self.inner.stats.lock()
    }

    /// The error that halted the driver, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<EngineError> {
        self.inner.errors.get()
    }

    /// Configured pulse interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TickDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDriver")
            .field("state", &self.state())
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}
