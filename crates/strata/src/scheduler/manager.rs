//! # Stage Participants
//!
//! The two seams the tick driver calls through:
//!
//! - [`AsyncManager`]: released into `Stage1`, `Stage2`, `Finalize` and
//!   `PreSnapshot` on its own thread, in parallel with every other manager.
//! - [`CopySnapshotManager`]: called on the tick thread during
//!   `CopySnapshot`, after the registry commit.
//!
//! ```text
//!  manager thread
//!  ──────────────
//!  loop {
//!      token = participant.wait_for_release()   None -> barrier stopped
//!      removed?                                  -> leave the barrier
//!      stages().contains(token.stage)?           -> run the hook
//!      hook failed or panicked?                  -> record, stop barrier
//!      participant.complete()
//!  }
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use strata_core::{StageBarrier, StageSet, StageToken, TickStage};
use strata_world::World;

use super::lifecycle::ErrorSlot;
use crate::error::{EngineError, EngineResult};

/// A per-tick participant running on its own thread.
///
/// Each hook is called at most once per tick, and every manager finishes a
/// stage before any manager sees the next one.
pub trait AsyncManager: Send + Sync {
    /// Name used in logs and thread names.
    fn name(&self) -> &str;

    /// Stages this manager wants hooks for.
    fn stages(&self) -> StageSet {
        StageSet::MANAGED
    }

    /// First parallel stage.
    ///
    /// # Errors
    ///
    /// Any error halts the tick driver.
    fn stage_1(&self, tick: u64) -> EngineResult<()>;

    /// Second parallel stage.
    ///
    /// # Errors
    ///
    /// Any error halts the tick driver.
    fn stage_2(&self, tick: u64) -> EngineResult<()>;

    /// Last mutation stage.
    ///
    /// # Errors
    ///
    /// Any error halts the tick driver.
    fn finalize(&self, tick: u64) -> EngineResult<()>;

    /// Read-only monitor stage. Must not mutate live state.
    ///
    /// # Errors
    ///
    /// Any error halts the tick driver.
    fn pre_snapshot(&self, _tick: u64) -> EngineResult<()> {
        Ok(())
    }
}

/// Publishes live state to readers during `CopySnapshot`.
pub trait CopySnapshotManager: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Copies live state into the reader-side snapshot.
    ///
    /// # Errors
    ///
    /// Any error halts the tick driver.
    fn copy_snapshot_run(&self) -> EngineResult<()>;
}

impl CopySnapshotManager for World {
    fn name(&self) -> &str {
        World::name(self)
    }

    fn copy_snapshot_run(&self) -> EngineResult<()> {
        World::copy_snapshot_run(self)?;
        Ok(())
    }
}

/// Runs the hook for `token`, turning a panic into an error.
fn run_hook(manager: &dyn AsyncManager, token: StageToken) -> EngineResult<()> {
    panic::catch_unwind(AssertUnwindSafe(|| dispatch(manager, token))).unwrap_or_else(|_| {
        Err(EngineError::ManagerPanicked {
            manager: manager.name().to_owned(),
            stage: token.stage,
            tick: token.tick,
        })
    })
}

/// Calls the hook `token.stage` maps to.
fn dispatch(manager: &dyn AsyncManager, token: StageToken) -> EngineResult<()> {
    match token.stage {
        TickStage::Stage1 => manager.stage_1(token.tick),
        TickStage::Stage2 => manager.stage_2(token.tick),
        TickStage::Finalize => manager.finalize(token.tick),
        TickStage::PreSnapshot => manager.pre_snapshot(token.tick),
        TickStage::Tasks | TickStage::CopySnapshot => Ok(()),
    }
}

/// Identifier of a registered async manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(u64);

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(0);

/// The thread and removal flag behind one registered manager.
pub(crate) struct ManagerThread {
    id: ManagerId,
    name: String,
    manager: Arc<dyn AsyncManager>,
    removed: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ManagerThread {
    /// Registers with `barrier` and spawns the manager's thread.
    ///
    /// The manager is first released by the barrier's next stage transition.
    pub(crate) fn spawn(
        manager: Arc<dyn AsyncManager>,
        barrier: &Arc<StageBarrier>,
        errors: Arc<ErrorSlot>,
    ) -> EngineResult<Self> {
        let id = ManagerId(NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed));
        let name = manager.name().to_owned();
        let removed = Arc::new(AtomicBool::new(false));
        let mut participant = barrier.register();

        let thread = {
            let manager = Arc::clone(&manager);
            let removed = Arc::clone(&removed);
            let barrier = Arc::clone(barrier);
            thread::Builder::new()
                .name(format!("strata-manager-{}", id.0))
                .spawn(move || {
                    while let Some(token) = participant.wait_for_release() {
                        if removed.load(Ordering::Acquire) {
                            break;
                        }
                        if manager.stages().contains(token.stage) {
                            if let Err(e) = run_hook(manager.as_ref(), token) {
                                tracing::error!(
                                    "async manager {} failed in {} of tick {}: {}",
                                    manager.name(),
                                    token.stage,
                                    token.tick,
                                    e
                                );
                                errors.record(e);
                                barrier.stop();
                            }
                        }
                        participant.complete();
                    }
                })?
        };

        tracing::info!("async manager {} registered", name);
        Ok(Self {
            id,
            name,
            manager,
            removed,
            thread: Some(thread),
        })
    }

    pub(crate) fn id(&self) -> ManagerId {
        self.id
    }

    pub(crate) fn manager(&self) -> &Arc<dyn AsyncManager> {
        &self.manager
    }

    /// Flags the thread to leave the barrier at its next release.
    pub(crate) fn retire(&self) {
        self.removed.store(true, Ordering::Release);
        tracing::info!("async manager {} removed", self.name);
    }

    /// Joins the thread. The barrier must be stopped or the thread retired
    /// and released, otherwise this blocks.
    pub(crate) fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            // A hook may stop the driver from this very thread
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::error!("async manager {} panicked", self.name);
            }
        }
    }
}

impl fmt::Debug for ManagerThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerThread")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use strata_core::{CoreError, StageClock};

    struct Recorder {
        seen: Mutex<Vec<TickStage>>,
        stages: StageSet,
    }

    impl AsyncManager for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn stages(&self) -> StageSet {
            self.stages
        }

        fn stage_1(&self, _tick: u64) -> EngineResult<()> {
            self.seen.lock().push(TickStage::Stage1);
            Ok(())
        }

        fn stage_2(&self, _tick: u64) -> EngineResult<()> {
            self.seen.lock().push(TickStage::Stage2);
            Ok(())
        }

        fn finalize(&self, tick: u64) -> EngineResult<()> {
            self.seen.lock().push(TickStage::Finalize);
            if tick == 99 {
                return Err(CoreError::DriverStopped { what: "recorder" }.into());
            }
            Ok(())
        }
    }

    fn one_tick(barrier: &StageBarrier) {
        for _ in 0..6 {
            barrier.advance().unwrap();
        }
    }

    #[test]
    fn test_hooks_follow_declared_stages() {
        let barrier = StageBarrier::new(StageClock::new());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            stages: StageSet::of(&[TickStage::Stage1, TickStage::Finalize]),
        });
        let errors = Arc::new(ErrorSlot::new());
        let mut thread = ManagerThread::spawn(recorder.clone(), &barrier, errors.clone()).unwrap();

        one_tick(&barrier);
        one_tick(&barrier);
        assert_eq!(
            *recorder.seen.lock(),
            vec![
                TickStage::Stage1,
                TickStage::Finalize,
                TickStage::Stage1,
                TickStage::Finalize
            ]
        );
        assert!(!errors.is_set());

        barrier.stop();
        thread.join();
    }

    #[test]
    fn test_retired_manager_leaves_barrier() {
        let barrier = StageBarrier::new(StageClock::new());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            stages: StageSet::MANAGED,
        });
        let mut thread =
            ManagerThread::spawn(recorder.clone(), &barrier, Arc::new(ErrorSlot::new())).unwrap();
        assert_eq!(barrier.participant_count(), 1);

        thread.retire();
        one_tick(&barrier);
        thread.join();
        assert!(recorder.seen.lock().is_empty());
        assert_eq!(barrier.participant_count(), 0);
    }

    #[test]
    fn test_hook_error_stops_barrier() {
        let clock = StageClock::new();
        let barrier = StageBarrier::new(clock);
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            stages: StageSet::MANAGED,
        });
        let errors = Arc::new(ErrorSlot::new());
        let mut thread = ManagerThread::spawn(recorder, &barrier, errors.clone()).unwrap();

        // Run to Finalize of tick 99
        let mut result = Ok(());
        for _ in 0..(99 * 6 + 3) {
            result = barrier.advance().map(|_| ());
            if result.is_err() {
                break;
            }
        }
        assert!(result.is_err());
        assert!(barrier.is_stopped());
        assert!(matches!(
            errors.get(),
            Some(EngineError::Core(CoreError::DriverStopped { what: "recorder" }))
        ));
        thread.join();
    }

    struct Faulty;

    impl AsyncManager for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }

        fn stage_1(&self, tick: u64) -> EngineResult<()> {
            assert_ne!(tick, 1, "faulty manager gave up");
            Ok(())
        }

        fn stage_2(&self, _tick: u64) -> EngineResult<()> {
            Ok(())
        }

        fn finalize(&self, _tick: u64) -> EngineResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_hook_panic_is_recorded_and_stops_barrier() {
        let barrier = StageBarrier::new(StageClock::new());
        let errors = Arc::new(ErrorSlot::new());
        let mut thread = ManagerThread::spawn(Arc::new(Faulty), &barrier, errors.clone()).unwrap();

        one_tick(&barrier);
        let mut result = Ok(());
        for _ in 0..6 {
            result = barrier.advance().map(|_| ());
            if result.is_err() {
                break;
            }
        }
        assert!(result.is_err());
        assert!(barrier.is_stopped());
        assert!(matches!(
            errors.get(),
            Some(EngineError::ManagerPanicked { manager, stage: TickStage::Stage1, tick: 1 })
                if manager == "faulty"
        ));
        // The thread survived the panic and leaves cleanly
        thread.join();
        assert_eq!(barrier.participant_count(), 0);
    }
}
