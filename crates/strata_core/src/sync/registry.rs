//! # Snapshot Registry
//!
//! The set of every stable value shared across threads, and the once-per-tick
//! bulk commit that copies each live side onto its stable side.
//!
//! ```text
//!  Stage1..Finalize            CopySnapshot              next tick
//!  ────────────────            ────────────              ─────────
//!  writers mutate live ──────> commit(): for each entry   readers see
//!  readers read stable         live ──copy──> stable      new stable
//! ```
//!
//! Entries are held weakly: dropping a [`StableValue`](super::StableValue)
//! removes it from the next commit even without an explicit `unregister`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::stage::{StageClock, TickStage};
use crate::error::{CoreError, CoreResult};

/// Anything with a live side and a stable side.
pub trait Snapshotable: Send + Sync {
    /// Copies the live side onto the stable side.
    ///
    /// Called only by [`SnapshotRegistry::commit`].
    fn copy_snapshot(&self);
}

/// Handle of a registry entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

struct RegistryInner {
    clock: StageClock,
    entries: Mutex<HashMap<EntryId, Weak<dyn Snapshotable>>>,
    next_id: AtomicU64,
    commits: AtomicU64,
}

/// Shared registry of stable values. Cloning shares the same registry.
#[derive(Clone)]
pub struct SnapshotRegistry {
    inner: Arc<RegistryInner>,
}

impl SnapshotRegistry {
    /// Creates an empty registry gated by `clock`.
    #[must_use]
    pub fn new(clock: StageClock) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                clock,
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                commits: AtomicU64::new(0),
            }),
        }
    }

    /// The clock that gates commits and live mutation.
    #[inline]
    #[must_use]
    pub fn clock(&self) -> &StageClock {
        &self.inner.clock
    }

    /// Adds an entry. Allowed from any stage.
    pub fn register<S: Snapshotable + 'static>(&self, entry: &Arc<S>) -> EntryId {
        let id = EntryId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let weak: Weak<S> = Arc::downgrade(entry);
        let weak: Weak<dyn Snapshotable> = weak;
        self.inner.entries.lock().insert(id, weak);
        id
    }

    /// Removes an entry. Returns false if it was not registered.
    pub fn unregister(&self, id: EntryId) -> bool {
        self.inner.entries.lock().remove(&id).is_some()
    }

    /// Returns true if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: EntryId) -> bool {
        self.inner.entries.lock().contains_key(&id)
    }

    /// Number of registered entries (including ones dropped since the last commit).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of commits performed.
    #[inline]
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::Acquire)
    }

    /// Copies live onto stable for every registered entry.
    ///
    /// Returns the number of entries committed. Dead entries are pruned.
    ///
    /// # Errors
    ///
    /// [`CoreError::CommitOutsideCopySnapshot`] unless the clock is at
    /// `CopySnapshot`. Nothing is copied in that case.
    pub fn commit(&self) -> CoreResult<usize> {
        let stage = self.inner.clock.stage();
        if stage != TickStage::CopySnapshot {
            tracing::error!("snapshot commit attempted during {}", stage);
            return Err(CoreError::CommitOutsideCopySnapshot { stage });
        }

        let mut entries = self.inner.entries.lock();
        let mut committed = 0;
        entries.retain(|_, weak| match weak.upgrade() {
            Some(entry) => {
                entry.copy_snapshot();
                committed += 1;
                true
            }
            None => false,
        });
        drop(entries);

        self.inner.commits.fetch_add(1, Ordering::AcqRel);
        Ok(committed)
    }
}

impl std::fmt::Debug for SnapshotRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotRegistry")
            .field("entries", &self.len())
            .field("commits", &self.commit_count())
            .finish_non_exhaustive()
    }
}
