//! # Snapshot Hierarchy
//!
//! The reader-side mirror of the live world:
//!
//! ```text
//!  WorldSnapshot  (one RwLock, bound to one world id)
//!   └── regions: RegionPos -> Arc<RegionSnapshot>     replaced, never mutated
//!        └── chunks: [Arc<ChunkSnapshot>; 4096]       shared across versions
//! ```
//!
//! Only the world snapshot is mutable, and only inside `update`, which runs
//! during `CopySnapshot` under the exclusive lock. Everything below it is
//! immutable once built.

mod chunk;
mod region;
mod world;

use std::sync::Arc;

use uuid::Uuid;

use crate::coords::RegionPos;

pub use chunk::ChunkSnapshot;
pub use region::RegionSnapshot;
pub use world::WorldSnapshot;

/// What a world snapshot needs from the live world.
pub trait WorldSource {
    /// Live region type.
    type Region: RegionSource;

    /// Identity of the live world.
    fn id(&self) -> Uuid;

    /// Age of the live world in ticks.
    fn age(&self) -> u64;

    /// Every currently loaded region.
    fn regions(&self) -> Vec<Arc<Self::Region>>;
}

/// What a world snapshot needs from a live region.
pub trait RegionSource {
    /// Position in region coordinates.
    fn position(&self) -> RegionPos;

    /// Unique per load. A region unloaded and generated again at the same
    /// position gets a new one.
    fn load_id(&self) -> u64;

    /// Version counter, bumped on any change to the region.
    fn update_number(&self) -> u64;

    /// Immutable view of the region at its current version.
    fn snapshot(&self) -> Arc<RegionSnapshot>;
}
