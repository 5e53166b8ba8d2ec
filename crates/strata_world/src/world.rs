//! # Live World
//!
//! The writer-side world. Mutated by tick-stage participants only; every
//! other thread reads [`World::snapshot`].
//!
//! ```text
//!  World
//!  ├── id / name                    fixed
//!  ├── age: StableValue<u64>        live side advanced in Stage1
//!  ├── regions: RegionPos -> Arc<Region>
//!  └── snapshot: Arc<WorldSnapshot> refreshed by copy_snapshot_run()
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use strata_core::{CoreResult, SnapshotRegistry, StableValue, StageClock, TickStage, Vec3};

use crate::chunk::{BlockId, Chunk};
use crate::coords::{BlockPos, ChunkPos, RegionPos};
use crate::error::{WorldError, WorldResult};
use crate::generator::WorldGenerator;
use crate::region::Region;
use crate::snapshot::{WorldSnapshot, WorldSource};

/// What to do when a requested region is not loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOption {
    /// Return nothing.
    NoLoad,
    /// Load from storage only. Nothing is persisted, so this finds nothing.
    LoadOnly,
    /// Load, generating if needed.
    LoadGen,
}

impl LoadOption {
    /// Whether a missing region may be generated.
    #[must_use]
    pub const fn generate(self) -> bool {
        matches!(self, Self::LoadGen)
    }
}

/// Entity identifier. Entities are not modelled by this crate.
pub type EntityId = u64;

/// A live voxel world.
pub struct World {
    id: Uuid,
    name: String,
    age: StableValue<u64>,
    regions: RwLock<HashMap<RegionPos, Arc<Region>>>,
    generator: Arc<dyn WorldGenerator>,
    snapshot: Arc<WorldSnapshot>,
    clock: StageClock,
}

impl World {
    /// Creates a world with a fresh id and age 0.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        generator: Arc<dyn WorldGenerator>,
        registry: &SnapshotRegistry,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), name, 0, generator, registry)
    }

    /// Creates a world with a known id and age.
    #[must_use]
    pub fn with_id(
        id: Uuid,
        name: impl Into<String>,
        age: u64,
        generator: Arc<dyn WorldGenerator>,
        registry: &SnapshotRegistry,
    ) -> Self {
        let name = name.into();
        Self {
            id,
            snapshot: Arc::new(WorldSnapshot::new(id, name.clone())),
            name,
            age: StableValue::new(registry, age),
            regions: RwLock::new(HashMap::new()),
            generator,
            clock: registry.clock().clone(),
        }
    }

    /// Unique id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// World name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Age in ticks as of the last commit.
    #[must_use]
    pub fn age(&self) -> u64 {
        self.age.get()
    }

    /// Age in ticks including this tick's advance.
    #[must_use]
    pub fn live_age(&self) -> u64 {
        self.age.live()
    }

    /// Adds `ticks` to the live age.
    ///
    /// # Errors
    ///
    /// [`strata_core::CoreError::StageViolation`] outside a mutation stage.
    pub fn advance_age(&self, ticks: u64) -> CoreResult<u64> {
        self.age.update(|age| {
            *age += ticks;
            *age
        })
    }

    /// The generator used for new regions.
    #[must_use]
    pub fn generator(&self) -> &Arc<dyn WorldGenerator> {
        &self.generator
    }

    /// The reader-side mirror of this world.
    #[must_use]
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Region at `pos`, loading or generating it as `option` allows.
    ///
    /// # Errors
    ///
    /// A stage violation if generation is needed outside a mutation stage.
    pub fn get_region(&self, pos: RegionPos, option: LoadOption) -> WorldResult<Option<Arc<Region>>> {
        if let Some(region) = self.regions.read().get(&pos) {
            return Ok(Some(Arc::clone(region)));
        }
        if !option.generate() {
            return Ok(None);
        }
        self.clock.require_mutation("World::get_region")?;

        // Generate outside the lock; a racing loader may win, in which case
        // its region is kept and ours is dropped
        let generated = Arc::new(Region::generate(pos, self.generator.as_ref()));
        let mut regions = self.regions.write();
        let region = regions.entry(pos).or_insert_with(|| {
            tracing::debug!("world {}: generated region {}", self.name, pos);
            generated
        });
        Ok(Some(Arc::clone(region)))
    }

    /// Region containing the chunk at `pos`.
    ///
    /// # Errors
    ///
    /// See [`get_region`](Self::get_region).
    pub fn region_from_chunk(&self, pos: ChunkPos, option: LoadOption) -> WorldResult<Option<Arc<Region>>> {
        self.get_region(pos.region(), option)
    }

    /// Region containing the block at `pos`.
    ///
    /// # Errors
    ///
    /// See [`get_region`](Self::get_region).
    pub fn region_from_block(&self, pos: BlockPos, option: LoadOption) -> WorldResult<Option<Arc<Region>>> {
        self.get_region(pos.region(), option)
    }

    /// Region containing the world-space point `position`.
    ///
    /// # Errors
    ///
    /// See [`get_region`](Self::get_region).
    pub fn region_from_point(&self, position: Vec3, option: LoadOption) -> WorldResult<Option<Arc<Region>>> {
        let [x, y, z] = position.floor_i32();
        self.region_from_block(BlockPos::new(x, y, z), option)
    }

    /// Live chunk at `pos`.
    ///
    /// # Errors
    ///
    /// See [`get_region`](Self::get_region).
    pub fn chunk(&self, pos: ChunkPos, option: LoadOption) -> WorldResult<Option<Arc<Chunk>>> {
        let region = self.region_from_chunk(pos, option)?;
        Ok(region.and_then(|r| r.chunk(pos).cloned()))
    }

    /// Live chunk containing the block at `pos`.
    ///
    /// # Errors
    ///
    /// See [`get_region`](Self::get_region).
    pub fn chunk_from_block(&self, pos: BlockPos, option: LoadOption) -> WorldResult<Option<Arc<Chunk>>> {
        self.chunk(pos.chunk(), option)
    }

    /// Returns true if the region holding chunk `pos` is loaded.
    #[must_use]
    pub fn contains_chunk(&self, pos: ChunkPos) -> bool {
        self.regions.read().contains_key(&pos.region())
    }

    /// Live block at `pos`, or `None` if its region is not loaded.
    #[must_use]
    pub fn block(&self, pos: BlockPos) -> Option<BlockId> {
        self.regions.read().get(&pos.region())?.block(pos)
    }

    /// Writes a block, generating its region if needed.
    ///
    /// Returns whether the stored block changed.
    ///
    /// # Errors
    ///
    /// A stage violation outside `Tasks`/`Stage1`/`Stage2`/`Finalize`.
    pub fn set_block(&self, pos: BlockPos, id: BlockId) -> WorldResult<bool> {
        self.clock.require_mutation("World::set_block")?;
        let region = self
            .region_from_block(pos, LoadOption::LoadGen)?
            .ok_or(WorldError::RegionNotLoaded(pos.region()))?;
        region.set_block(pos, id).ok_or(WorldError::ChunkOutOfBounds)
    }

    /// Drops the region at `pos`. Returns false if it was not loaded.
    ///
    /// # Errors
    ///
    /// A stage violation outside a mutation stage.
    pub fn unload_region(&self, pos: RegionPos) -> WorldResult<bool> {
        self.clock.require_mutation("World::unload_region")?;
        let removed = self.regions.write().remove(&pos).is_some();
        if removed {
            tracing::debug!("world {}: unloaded region {}", self.name, pos);
        }
        Ok(removed)
    }

    /// Number of loaded regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }

    /// Number of loaded chunks.
    #[must_use]
    pub fn loaded_chunk_count(&self) -> usize {
        self.regions.read().values().map(|r| r.chunk_count()).sum()
    }

    /// Folds the current live state into [`snapshot`](Self::snapshot).
    ///
    /// # Errors
    ///
    /// A stage violation unless the clock is at `CopySnapshot`.
    pub fn copy_snapshot_run(&self) -> WorldResult<()> {
        self.clock
            .require_stage(TickStage::CopySnapshot, "World::copy_snapshot_run")?;
        self.snapshot.update(self)
    }

    /// Only the snapshot stage, sequence 0, belongs to the world itself.
    #[must_use]
    pub fn check_sequence(&self, stage: TickStage, sequence: u64) -> bool {
        stage != TickStage::CopySnapshot || sequence == 0
    }

    /// Entity lookup.
    ///
    /// # Errors
    ///
    /// Always [`WorldError::Unsupported`].
    pub fn entity(&self, _id: EntityId) -> WorldResult<()> {
        Err(WorldError::Unsupported("World::entity"))
    }

    /// All entities.
    ///
    /// # Errors
    ///
    /// Always [`WorldError::Unsupported`].
    pub fn entities(&self) -> WorldResult<Vec<EntityId>> {
        Err(WorldError::Unsupported("World::entities"))
    }

    /// Entities within `range` of `position`.
    ///
    /// # Errors
    ///
    /// Always [`WorldError::Unsupported`].
    pub fn nearby_entities(&self, _position: Vec3, _range: f32) -> WorldResult<Vec<EntityId>> {
        Err(WorldError::Unsupported("World::nearby_entities"))
    }

    /// Players in this world.
    ///
    /// # Errors
    ///
    /// Always [`WorldError::Unsupported`].
    pub fn players(&self) -> WorldResult<Vec<EntityId>> {
        Err(WorldError::Unsupported("World::players"))
    }

    /// Persists a chunk.
    ///
    /// # Errors
    ///
    /// Always [`WorldError::Unsupported`].
    pub fn save_chunk(&self, _pos: ChunkPos) -> WorldResult<()> {
        Err(WorldError::Unsupported("World::save_chunk"))
    }

    /// Unloads a single chunk. Regions are the unit of unloading.
    ///
    /// # Errors
    ///
    /// Always [`WorldError::Unsupported`].
    pub fn unload_chunk(&self, _pos: ChunkPos, _save: bool) -> WorldResult<()> {
        Err(WorldError::Unsupported("World::unload_chunk"))
    }
}

impl WorldSource for World {
    type Region = Region;

    fn id(&self) -> Uuid {
        self.id
    }

    fn age(&self) -> u64 {
        self.age.get()
    }

    fn regions(&self) -> Vec<Arc<Region>> {
        self.regions.read().values().cloned().collect()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("regions", &self.region_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FlatWorldGenerator;
    use strata_core::{CoreError, StageBarrier};

    fn setup() -> (Arc<StageBarrier>, World) {
        let barrier = StageBarrier::new(StageClock::new());
        let registry = SnapshotRegistry::new(barrier.clock().clone());
        let world = World::new("test", Arc::new(FlatWorldGenerator::new(4, 1)), &registry);
        (barrier, world)
    }

    fn advance_to(barrier: &StageBarrier, stage: TickStage) {
        while barrier.current().stage != stage {
            barrier.advance().unwrap();
        }
    }

    #[test]
    fn test_load_options() {
        let (_barrier, world) = setup();
        let pos = RegionPos::new(0, 0, 0);
        assert!(world.get_region(pos, LoadOption::NoLoad).unwrap().is_none());
        assert!(world.get_region(pos, LoadOption::LoadOnly).unwrap().is_none());
        let region = world.get_region(pos, LoadOption::LoadGen).unwrap().unwrap();
        assert_eq!(region.position(), pos);
        assert!(world.get_region(pos, LoadOption::NoLoad).unwrap().is_some());
        assert_eq!(world.loaded_chunk_count(), 4096);
        assert!(world.contains_chunk(ChunkPos::new(15, 15, 15)));
        assert!(!world.contains_chunk(ChunkPos::new(16, 0, 0)));
    }

    #[test]
    fn test_set_block_is_stage_gated() {
        let (barrier, world) = setup();
        assert_eq!(world.set_block(BlockPos::new(1, 2, 3), 7), Ok(true));
        assert_eq!(world.block(BlockPos::new(1, 2, 3)), Some(7));

        advance_to(&barrier, TickStage::PreSnapshot);
        let err = world.set_block(BlockPos::new(1, 2, 3), 8).unwrap_err();
        assert_eq!(
            err,
            WorldError::Core(CoreError::StageViolation {
                operation: "World::set_block",
                stage: TickStage::PreSnapshot,
            })
        );
        assert_eq!(world.block(BlockPos::new(1, 2, 3)), Some(7));
    }

    #[test]
    fn test_copy_snapshot_run_publishes_state() {
        let (barrier, world) = setup();
        world.set_block(BlockPos::new(-5, 0, 0), 9).unwrap();
        world.advance_age(1).unwrap();

        // Readers still see the empty world
        let snapshot = world.snapshot();
        assert_eq!(snapshot.region_count(), 0);
        assert!(world.copy_snapshot_run().is_err());

        advance_to(&barrier, TickStage::CopySnapshot);
        world.copy_snapshot_run().unwrap();
        assert_eq!(snapshot.block(BlockPos::new(-5, 0, 0)), Some(9));
        assert!(snapshot.has_region(RegionPos::new(-1, 0, 0)));
        assert_eq!(snapshot.update_number(), 1);
    }

    #[test]
    fn test_snapshot_follows_region_regenerated_within_a_tick() {
        let (barrier, world) = setup();
        let pos = BlockPos::new(3, 100, 3);
        world.set_block(pos, 5).unwrap();
        advance_to(&barrier, TickStage::CopySnapshot);
        world.copy_snapshot_run().unwrap();
        let snapshot = world.snapshot();
        assert_eq!(snapshot.block(pos), Some(5));

        advance_to(&barrier, TickStage::Stage1);
        assert_eq!(world.unload_region(pos.region()), Ok(true));
        world.set_block(pos, 7).unwrap();
        let region = world.get_region(pos.region(), LoadOption::NoLoad).unwrap().unwrap();
        assert_eq!(region.update_number(), 1);
        advance_to(&barrier, TickStage::CopySnapshot);
        world.copy_snapshot_run().unwrap();

        assert_eq!(world.block(pos), Some(7));
        assert_eq!(snapshot.block(pos), Some(7));
    }

    #[test]
    fn test_unload_region() {
        let (_barrier, world) = setup();
        let pos = RegionPos::new(2, 0, 0);
        world.get_region(pos, LoadOption::LoadGen).unwrap();
        assert_eq!(world.unload_region(pos), Ok(true));
        assert_eq!(world.unload_region(pos), Ok(false));
        assert_eq!(world.region_count(), 0);
    }

    #[test]
    fn test_unsupported_operations() {
        let (_barrier, world) = setup();
        assert_eq!(world.entity(1), Err(WorldError::Unsupported("World::entity")));
        assert!(matches!(
            world.nearby_entities(Vec3::ZERO, 8.0),
            Err(WorldError::Unsupported(_))
        ));
        assert!(world.save_chunk(ChunkPos::new(0, 0, 0)).is_err());
        assert!(world.check_sequence(TickStage::CopySnapshot, 0));
        assert!(!world.check_sequence(TickStage::CopySnapshot, 1));
    }
}
