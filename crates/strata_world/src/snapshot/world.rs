//! # World Snapshot
//!
//! ```text
//!  update(live world)                                   CopySnapshot only
//!  ──────────────────
//!  1. id check            mismatch -> error, nothing touched
//!  2. live regions        not in snapshot -> insert           (changed)
//!  3. snapshot regions    not live any more -> remove          (changed)
//!  4. both                reloaded or version moved -> replace (changed)
//!  5. changed?            update_number += 1
//!  6. time = live age     always
//! ```
//!
//! The whole routine runs under the write lock, so readers see either the
//! previous tick's region map or this tick's, never a mix.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use uuid::Uuid;

use strata_core::SnapshotLock;

use super::{ChunkSnapshot, RegionSnapshot, RegionSource, WorldSource};
use crate::chunk::BlockId;
use crate::coords::{BlockPos, ChunkPos, RegionPos};
use crate::error::{WorldError, WorldResult};

#[derive(Debug, Default)]
struct SnapshotState {
    time: u64,
    update_number: u64,
    regions: HashMap<RegionPos, Arc<RegionSnapshot>>,
    /// Load id and update number last folded into `regions`.
    last_update: HashMap<RegionPos, (u64, u64)>,
}

/// Reader-side mirror of one live world.
///
/// Two snapshots are equal when they mirror the same world, whatever their
/// contents.
#[derive(Debug)]
pub struct WorldSnapshot {
    id: Uuid,
    name: String,
    state: SnapshotLock<SnapshotState>,
}

impl WorldSnapshot {
    /// Creates an empty snapshot bound to world `id`.
    #[must_use]
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: SnapshotLock::new(SnapshotState::default()),
        }
    }

    /// Id of the mirrored world.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the mirrored world.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// World age at the last update.
    #[must_use]
    pub fn time(&self) -> u64 {
        self.state.read().time
    }

    /// Bumped by every update that changed the region set or a region.
    #[must_use]
    pub fn update_number(&self) -> u64 {
        self.state.read().update_number
    }

    /// Returns true if the region at `pos` is present.
    #[must_use]
    pub fn has_region(&self, pos: RegionPos) -> bool {
        self.state.read().regions.contains_key(&pos)
    }

    /// Region snapshot at `pos`.
    #[must_use]
    pub fn region(&self, pos: RegionPos) -> Option<Arc<RegionSnapshot>> {
        self.state.read().regions.get(&pos).cloned()
    }

    /// All region snapshots, from one consistent version.
    #[must_use]
    pub fn regions(&self) -> Vec<Arc<RegionSnapshot>> {
        self.state.read().regions.values().cloned().collect()
    }

    /// Number of regions present.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.state.read().regions.len()
    }

    /// Chunk snapshot at `pos`.
    #[must_use]
    pub fn chunk(&self, pos: ChunkPos) -> Option<Arc<ChunkSnapshot>> {
        let state = self.state.read();
        state.regions.get(&pos.region())?.chunk(pos).cloned()
    }

    /// Block at `pos`, if its region is present.
    #[must_use]
    pub fn block(&self, pos: BlockPos) -> Option<BlockId> {
        self.state.read().regions.get(&pos.region())?.block(pos)
    }

    /// Folds the live world's current state into this snapshot.
    ///
    /// # Errors
    ///
    /// [`WorldError::IdentityMismatch`] if `world` is not the world this
    /// snapshot is bound to. The snapshot is left untouched.
    pub fn update<W: WorldSource>(&self, world: &W) -> WorldResult<()> {
        let actual = world.id();
        if actual != self.id {
            tracing::error!("snapshot of world {} updated from world {}", self.id, actual);
            return Err(WorldError::IdentityMismatch {
                expected: self.id,
                actual,
            });
        }

        let live = world.regions();
        let age = world.age();

        let mut state = self.state.write();
        let mut changed = false;

        let live_positions: HashSet<RegionPos> = live.iter().map(|r| r.position()).collect();
        let before = state.regions.len();
        state.regions.retain(|pos, _| live_positions.contains(pos));
        state.last_update.retain(|pos, _| live_positions.contains(pos));
        if state.regions.len() != before {
            changed = true;
        }

        for region in &live {
            let position = region.position();
            let load_id = region.load_id();
            let seen = state.last_update.get(&position).copied();
            if seen == Some((load_id, region.update_number())) {
                continue;
            }
            let snapshot = region.snapshot();
            state
                .last_update
                .insert(position, (load_id, snapshot.update_number()));
            state.regions.insert(position, snapshot);
            changed = true;
        }

        if changed {
            state.update_number += 1;
            tracing::trace!(
                "snapshot of world {} now at version {}",
                self.name,
                state.update_number
            );
        }
        state.time = age;
        Ok(())
    }
}

impl PartialEq for WorldSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WorldSnapshot {}

impl Hash for WorldSnapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
