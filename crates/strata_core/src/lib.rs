//! # STRATA Core
//!
//! The synchronization substrate of the engine:
//! - Tick stages and the authoritative stage clock
//! - A stage barrier that quiesces workers between stages
//! - Stable values and the once-per-tick snapshot commit
//! - Spin-locked transforms with a deadlock-free dual lock
//!
//! ## Architecture Rules
//!
//! 1. **Readers touch stable state only** - live state belongs to the tick
//! 2. **One commit per tick** - and only during `CopySnapshot`
//! 3. **Sequencing violations are errors** - returned and logged, never retried
//!
//! ## Example
//!
//! ```rust
//! use strata_core::{SnapshotRegistry, StableValue, StageClock};
//!
//! let registry = SnapshotRegistry::new(StageClock::new());
//! let age = StableValue::new(&registry, 0u64);
//! age.set(1).unwrap(); // live side; readers still see 0
//! assert_eq!(age.get(), 0);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod math;
pub mod sync;

pub use error::{CoreError, CoreResult};
pub use math::{Quaternion, Transform, Vec3};
pub use sync::{
    dual_lock, EntryId, Participant, ParticipantId, SharedTransform, SnapshotLock,
    SnapshotRegistry, Snapshotable, SpinGuard, SpinLock, StableValue, StageAccess, StageBarrier,
    StageClock, StageSet, StageToken, TickStage,
};
