//! # Stage Barrier
//!
//! The gate between tick stages.
//!
//! ```text
//!  tick thread                         participant threads (one per async manager)
//!  ───────────                         ──────────────────────────────────────────
//!  advance() ──> token = Stage1
//!            ──> generation += 1 ───────> wait_for_release() returns Stage1
//!            ──> wait until every             run hook
//!                participant completed <──── complete()
//!  advance() ──> token = Stage2 ...
//! ```
//!
//! A participant that never calls [`Participant::complete`] stalls the
//! tick. There is no timeout: a stalled stage is a logic bug, and skipping
//! it would let the snapshot commit race with live mutation.
//!
//! Participants registered while a stage is in flight are not counted for
//! that stage; they are first released by the next `advance`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::stage::{StageClock, StageToken, TickStage};
use crate::error::{CoreError, CoreResult};

/// Identifier of a barrier participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParticipantId(u64);

struct BarrierState {
    /// Incremented every time participants are released.
    generation: u64,
    /// Last generation each participant completed.
    participants: HashMap<ParticipantId, u64>,
    next_id: u64,
    stopped: bool,
}

impl BarrierState {
    fn has_pending(&self) -> bool {
        self.participants.values().any(|&done| done < self.generation)
    }
}

/// Stage barrier shared by the tick driver and its participants.
pub struct StageBarrier {
    clock: StageClock,
    state: Mutex<BarrierState>,
    /// Serializes `advance` callers.
    advance_lock: Mutex<()>,
    /// Signalled when participants are released (or on stop).
    released: Condvar,
    /// Signalled when a participant completes or leaves (or on stop).
    completed: Condvar,
}

impl StageBarrier {
    /// Creates a barrier driving `clock`.
    #[must_use]
    pub fn new(clock: StageClock) -> Arc<Self> {
        Arc::new(Self {
            clock,
            state: Mutex::new(BarrierState {
                generation: 0,
                participants: HashMap::new(),
                next_id: 0,
                stopped: false,
            }),
            advance_lock: Mutex::new(()),
            released: Condvar::new(),
            completed: Condvar::new(),
        })
    }

    /// The clock this barrier moves.
    #[inline]
    #[must_use]
    pub fn clock(&self) -> &StageClock {
        &self.clock
    }

    /// Current stage token.
    #[inline]
    #[must_use]
    pub fn current(&self) -> StageToken {
        self.clock.current()
    }

    /// Returns true if the caller's declared stage/sequence is current.
    ///
    /// A `false` here is an assertion failure on the caller's side.
    #[must_use]
    pub fn check_sequence(&self, stage: TickStage, sequence: u64) -> bool {
        self.clock.check_sequence(stage, sequence)
    }

    /// Registers a new participant.
    ///
    /// The participant is first released by the next stage transition.
    #[must_use]
    pub fn register(self: &Arc<Self>) -> Participant {
        let mut state = self.state.lock();
        let id = ParticipantId(state.next_id);
        state.next_id += 1;
        let generation = state.generation;
        state.participants.insert(id, generation);
        drop(state);

        tracing::debug!("barrier participant {:?} registered", id);
        Participant {
            barrier: Arc::clone(self),
            id,
            seen: generation,
        }
    }

    /// Number of registered participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.state.lock().participants.len()
    }

    /// Number of times participants have been released.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Moves the clock forward by one stage.
    ///
    /// Wrapping from `CopySnapshot` to `Tasks` starts the next tick. When
    /// the new stage releases managers, blocks until every participant has
    /// completed it.
    ///
    /// # Errors
    ///
    /// [`CoreError::DriverStopped`] if the barrier was stopped before or
    /// while waiting. The clock may already have moved in that case.
    pub fn advance(&self) -> CoreResult<StageToken> {
        let _advancing = self.advance_lock.lock();
        let mut state = self.state.lock();
        if state.stopped {
            return Err(CoreError::DriverStopped { what: "stage barrier" });
        }

        let current = self.clock.current();
        let stage = current.stage.next();
        let tick = if stage == TickStage::Tasks {
            current.tick + 1
        } else {
            current.tick
        };
        let token = StageToken { stage, tick };
        self.clock.set(token);

        if stage.releases_managers() {
            state.generation += 1;
            self.released.notify_all();
            while !state.stopped && state.has_pending() {
                self.completed.wait(&mut state);
            }
            if state.stopped {
                return Err(CoreError::DriverStopped { what: "stage barrier" });
            }
        }

        tracing::trace!("stage {} of tick {}", token.stage, token.tick);
        Ok(token)
    }

    /// Stops the barrier. Wakes every waiter; subsequent advances fail.
    ///
    /// Safe to call repeatedly and from any thread.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        drop(state);
        self.released.notify_all();
        self.completed.notify_all();
    }

    /// Returns true once [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

/// A registered participant's handle.
///
/// Dropping it leaves the barrier, so a finished worker never holds up a
/// stage it will not run.
pub struct Participant {
    barrier: Arc<StageBarrier>,
    id: ParticipantId,
    seen: u64,
}

impl Participant {
    /// This participant's id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Parks until the next release, returning the stage released into.
    ///
    /// Returns `None` once the barrier is stopped.
    pub fn wait_for_release(&mut self) -> Option<StageToken> {
        let barrier = &self.barrier;
        let mut state = barrier.state.lock();
        loop {
            if state.stopped {
                return None;
            }
            let done = *state.participants.get(&self.id)?;
            if done < state.generation && self.seen < state.generation {
                self.seen = state.generation;
                return Some(barrier.clock.current());
            }
            barrier.released.wait(&mut state);
        }
    }

    /// Signals completion of the stage this participant was released into.
    pub fn complete(&self) {
        let mut state = self.barrier.state.lock();
        let generation = state.generation;
        if let Some(done) = state.participants.get_mut(&self.id) {
            *done = generation;
        }
        drop(state);
        self.barrier.completed.notify_all();
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        let mut state = self.barrier.state.lock();
        state.participants.remove(&self.id);
        drop(state);
        self.barrier.completed.notify_all();
        tracing::debug!("barrier participant {:?} left", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_advance_without_participants() {
        let barrier = StageBarrier::new(StageClock::new());
        let mut stages = Vec::new();
        for _ in 0..6 {
            stages.push(barrier.advance().unwrap());
        }
        assert_eq!(stages[0].stage, TickStage::Stage1);
        assert_eq!(stages[4].stage, TickStage::CopySnapshot);
        assert_eq!(stages[5], StageToken { stage: TickStage::Tasks, tick: 1 });
        // Stage1, Stage2, Finalize, PreSnapshot released (nobody to wait for)
        assert_eq!(barrier.generation(), 4);
    }

    #[test]
    fn test_participants_complete_each_stage() {
        let barrier = StageBarrier::new(StageClock::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mut participant = barrier.register();
                let runs = Arc::clone(&runs);
                thread::spawn(move || {
                    while let Some(_token) = participant.wait_for_release() {
                        runs.fetch_add(1, Ordering::SeqCst);
                        participant.complete();
                    }
                })
            })
            .collect();

        // One full tick: four releasing stages, four participants each
        for _ in 0..6 {
            barrier.advance().unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 16);

        barrier.stop();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_stage_not_left_before_all_complete() {
        let barrier = StageBarrier::new(StageClock::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..3u64)
            .map(|i| {
                let mut participant = barrier.register();
                let finished = Arc::clone(&finished);
                thread::spawn(move || {
                    if participant.wait_for_release().is_some() {
                        thread::sleep(std::time::Duration::from_millis(5 * (i + 1)));
                        finished.fetch_add(1, Ordering::SeqCst);
                        participant.complete();
                    }
                })
            })
            .collect();

        barrier.advance().unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 3);

        // Workers exited and dropped their handles
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(barrier.participant_count(), 0);
        barrier.advance().unwrap();
    }

    #[test]
    fn test_stop_unblocks_advance() {
        let barrier = StageBarrier::new(StageClock::new());
        // Registered but never runs: advance would stall forever
        let _stuck = barrier.register();

        let stopper = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                thread::sleep(std::time::Duration::from_millis(20));
                barrier.stop();
            })
        };

        let result = barrier.advance();
        assert!(matches!(result, Err(CoreError::DriverStopped { .. })));
        stopper.join().unwrap();
        assert!(barrier.advance().is_err());
    }

    #[test]
    fn test_late_registration_not_counted() {
        let barrier = StageBarrier::new(StageClock::new());
        barrier.advance().unwrap(); // Stage1, nobody registered
        let _late = barrier.register();
        // Stage2 would now wait on the late participant; leaving frees it
        drop(_late);
        assert_eq!(barrier.advance().unwrap().stage, TickStage::Stage2);
    }

    #[test]
    fn test_check_sequence() {
        let barrier = StageBarrier::new(StageClock::new());
        assert!(barrier.check_sequence(TickStage::Tasks, 0));
        barrier.advance().unwrap();
        assert!(barrier.check_sequence(TickStage::Stage1, 0));
        assert!(!barrier.check_sequence(TickStage::Tasks, 0));
    }
}
