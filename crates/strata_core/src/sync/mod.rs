//! # Synchronization Substrate
//!
//! Writers and readers never share live state:
//!
//! ```text
//! Tick N:
//!   Stage1..Finalize   writers mutate the live side
//!   PreSnapshot        everyone may look, nobody may touch
//!   CopySnapshot       registry copies live -> stable, single-threaded
//!
//! Any time:
//!   render / input / network read the stable side of tick N-1
//! ```
//!
//! The [`StageClock`] says which stage is current, the [`StageBarrier`]
//! moves it, and the [`SnapshotRegistry`] commits on its signal.
//! Transforms sit outside this protocol and use [`dual_lock`] instead.

mod barrier;
mod registry;
mod rw;
mod spin;
mod stable;
mod stage;
mod transform;

pub use barrier::{Participant, ParticipantId, StageBarrier};
pub use registry::{EntryId, SnapshotRegistry, Snapshotable};
pub use rw::SnapshotLock;
pub use spin::{dual_lock, SpinGuard, SpinLock};
pub use stable::StableValue;
pub use stage::{StageAccess, StageClock, StageSet, StageToken, TickStage};
pub use transform::SharedTransform;
