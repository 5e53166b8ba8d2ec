//! # Stable Values
//!
//! A value with two sides:
//!
//! ```text
//!  ┌───────────────── StableValue<T> ─────────────────┐
//!  │  live: Mutex<T>        stable: RwLock<T>         │
//!  │  set()/update()        get()                     │
//!  │  mutation stages only  any thread, any time      │
//!  └───────────────── copy_snapshot() ────────────────┘
//!                     CopySnapshot only
//! ```
//!
//! Readers of the stable side never wait on writers of the live side; they
//! only contend with the commit, which holds the stable lock for a single
//! assignment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::registry::{EntryId, SnapshotRegistry, Snapshotable};
use crate::error::CoreResult;

struct StableCell<T> {
    live: Mutex<T>,
    stable: RwLock<T>,
    dirty: AtomicBool,
}

impl<T: Clone + Send + Sync> Snapshotable for StableCell<T> {
    fn copy_snapshot(&self) {
        if self.dirty.swap(false, Ordering::AcqRel) {
            let live = self.live.lock().clone();
            *self.stable.write() = live;
        }
    }
}

/// A live value plus its previous-tick stable copy.
///
/// Registered with a [`SnapshotRegistry`] on construction and removed when
/// dropped.
pub struct StableValue<T: Clone + Send + Sync + 'static> {
    cell: Arc<StableCell<T>>,
    registry: SnapshotRegistry,
    id: EntryId,
}

impl<T: Clone + Send + Sync + 'static> StableValue<T> {
    /// Creates a value whose live and stable sides both start at `initial`.
    #[must_use]
    pub fn new(registry: &SnapshotRegistry, initial: T) -> Self {
        let cell = Arc::new(StableCell {
            live: Mutex::new(initial.clone()),
            stable: RwLock::new(initial),
            dirty: AtomicBool::new(false),
        });
        let id = registry.register(&cell);
        Self {
            cell,
            registry: registry.clone(),
            id,
        }
    }

    /// The stable (previous-tick) value.
    #[must_use]
    pub fn get(&self) -> T {
        self.cell.stable.read().clone()
    }

    /// Runs `f` against the stable value without cloning it.
    pub fn with_stable<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.stable.read())
    }

    /// A copy of the live value.
    ///
    /// Meant for the owning writer; other threads should use [`get`](Self::get).
    #[must_use]
    pub fn live(&self) -> T {
        self.cell.live.lock().clone()
    }

    /// Replaces the live value.
    ///
    /// # Errors
    ///
    /// [`CoreError::StageViolation`](crate::CoreError::StageViolation) outside a
    /// mutation stage.
    pub fn set(&self, value: T) -> CoreResult<()> {
        self.update(|live| *live = value)
    }

    /// Mutates the live value in place.
    ///
    /// # Errors
    ///
    /// [`CoreError::StageViolation`](crate::CoreError::StageViolation) outside a
    /// mutation stage. `f` is not run in that case.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> CoreResult<R> {
        self.registry.clock().require_mutation("StableValue::update")?;
        let result = f(&mut self.cell.live.lock());
        self.cell.dirty.store(true, Ordering::Release);
        Ok(result)
    }

    /// Returns true while this value takes part in commits.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registry.contains(self.id)
    }

    /// This value's registry entry.
    #[inline]
    #[must_use]
    pub fn entry_id(&self) -> EntryId {
        self.id
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for StableValue<T> {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

impl<T: Clone + Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for StableValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StableValue")
            .field("stable", &*self.cell.stable.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::sync::stage::{StageClock, StageToken, TickStage};

    fn at(clock: &StageClock, stage: TickStage, tick: u64) {
        clock.set(StageToken { stage, tick });
    }

    #[test]
    fn test_stable_lags_live_until_commit() {
        let clock = StageClock::new();
        let registry = SnapshotRegistry::new(clock.clone());
        let value = StableValue::new(&registry, 10u64);

        at(&clock, TickStage::Stage1, 0);
        value.set(11).unwrap();
        assert_eq!(value.live(), 11);
        assert_eq!(value.get(), 10);

        at(&clock, TickStage::CopySnapshot, 0);
        registry.commit().unwrap();
        assert_eq!(value.get(), 11);
    }

    #[test]
    fn test_mutation_rejected_outside_mutation_stages() {
        let clock = StageClock::new();
        let registry = SnapshotRegistry::new(clock.clone());
        let value = StableValue::new(&registry, String::from("a"));

        for stage in [TickStage::PreSnapshot, TickStage::CopySnapshot] {
            at(&clock, stage, 3);
            let err = value.update(|s| s.push('b')).unwrap_err();
            assert_eq!(
                err,
                CoreError::StageViolation {
                    operation: "StableValue::update",
                    stage,
                }
            );
        }
        assert_eq!(value.live(), "a");
    }

    #[test]
    fn test_drop_unregisters() {
        let registry = SnapshotRegistry::new(StageClock::new());
        let value = StableValue::new(&registry, 1u8);
        assert!(value.is_registered());
        let id = value.entry_id();
        drop(value);
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_returns_closure_result() {
        let clock = StageClock::new();
        let registry = SnapshotRegistry::new(clock);
        let value = StableValue::new(&registry, vec![1, 2]);
        let len = value
            .update(|v| {
                v.push(3);
                v.len()
            })
            .unwrap();
        assert_eq!(len, 3);
        assert_eq!(value.with_stable(Vec::len), 2);
    }
}
