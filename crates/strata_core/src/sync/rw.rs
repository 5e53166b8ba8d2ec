//! Reader-writer wrapper for snapshot structures.
//!
//! Many readers during normal operation, one writer during the commit. The
//! write generation lets a reader cheaply notice that a commit happened
//! between two of its reads.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Reader-writer lock that counts its exclusive sections.
#[derive(Debug, Default)]
pub struct SnapshotLock<T> {
    inner: RwLock<T>,
    writes: AtomicU64,
}

impl<T> SnapshotLock<T> {
    /// Wraps `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
            writes: AtomicU64::new(0),
        }
    }

    /// Shared access. Blocks only while a writer holds the lock.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Exclusive access. Counts as one write generation.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        let guard = self.inner.write();
        self.writes.fetch_add(1, Ordering::AcqRel);
        guard
    }

    /// Runs `f` under the shared lock.
    pub fn with_read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.read())
    }

    /// Runs `f` under the exclusive lock.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.write())
    }

    /// Number of exclusive sections entered so far.
    #[inline]
    #[must_use]
    pub fn write_generation(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }
}
