//! # STRATA World
//!
//! The live voxel world and the snapshot hierarchy that mirrors it for
//! reader threads.
//!
//! ## Architecture Rules
//!
//! 1. **Live state is written in mutation stages only** - every write is checked against the clock
//! 2. **Snapshots are replaced, not edited** - a changed region gets a new `RegionSnapshot`
//! 3. **A snapshot belongs to one world** - updating it from another world is an error
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_core::{SnapshotRegistry, StageClock};
//! use strata_world::{BlockPos, FlatWorldGenerator, World};
//!
//! let registry = SnapshotRegistry::new(StageClock::new());
//! let world = World::new("overworld", Arc::new(FlatWorldGenerator::default()), &registry);
//! world.set_block(BlockPos::new(0, 100, 0), 3).unwrap();
//! assert_eq!(world.block(BlockPos::new(0, 100, 0)), Some(3));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod chunk;
pub mod coords;
pub mod error;
pub mod generator;
pub mod region;
pub mod snapshot;
pub mod world;

pub use chunk::{BlockId, Chunk, ChunkData, AIR};
pub use coords::{BlockPos, ChunkPos, RegionPos};
pub use error::{WorldError, WorldResult};
pub use generator::{FlatWorldGenerator, WorldGenerator};
pub use region::Region;
pub use snapshot::{ChunkSnapshot, RegionSnapshot, RegionSource, WorldSnapshot, WorldSource};
pub use world::{EntityId, LoadOption, World};
