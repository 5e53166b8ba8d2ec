//! # Live Regions
//!
//! A region is a 16x16x16 cube of chunks, the unit of loading and the unit
//! of snapshot versioning.
//!
//! ```text
//!  Region (update_number = 7)
//!  ├── chunk[0]    version 0  ──snapshot──>  reused from previous RegionSnapshot
//!  ├── chunk[1]    version 3  ──snapshot──>  rebuilt (version moved)
//!  └── ...
//! ```
//!
//! Any chunk change bumps the region's `update_number`; a snapshot taken at
//! an unchanged `update_number` is returned as-is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chunk::{BlockId, Chunk};
use crate::coords::{BlockPos, ChunkPos, RegionPos, CHUNKS_BITS, CHUNKS_VOLUME};
use crate::generator::WorldGenerator;
use crate::snapshot::{RegionSnapshot, RegionSource};

static NEXT_LOAD_ID: AtomicU64 = AtomicU64::new(0);

/// A loaded region of the live world.
pub struct Region {
    position: RegionPos,
    load_id: u64,
    chunks: Box<[Arc<Chunk>]>,
    update_number: AtomicU64,
    cached: Mutex<Option<Arc<RegionSnapshot>>>,
}

impl Region {
    /// log2 of the region edge in chunks.
    pub const CHUNKS_BITS: u32 = CHUNKS_BITS;

    /// Generates every chunk of the region at `position`.
    #[must_use]
    pub fn generate(position: RegionPos, generator: &dyn WorldGenerator) -> Self {
        let chunks = (0..CHUNKS_VOLUME)
            .map(|index| {
                let chunk_pos = position.chunk_at(index);
                Arc::new(Chunk::new(chunk_pos, generator.generate_chunk(chunk_pos)))
            })
            .collect();
        Self {
            position,
            load_id: NEXT_LOAD_ID.fetch_add(1, Ordering::Relaxed),
            chunks,
            update_number: AtomicU64::new(0),
            cached: Mutex::new(None),
        }
    }

    /// Position in region coordinates.
    #[inline]
    #[must_use]
    pub fn position(&self) -> RegionPos {
        self.position
    }

    /// Distinguishes this load from any earlier region at the same position.
    #[inline]
    #[must_use]
    pub fn load_id(&self) -> u64 {
        self.load_id
    }

    /// Number of chunk changes since generation.
    #[inline]
    #[must_use]
    pub fn update_number(&self) -> u64 {
        self.update_number.load(Ordering::Acquire)
    }

    /// The live chunk at `pos`, if it belongs to this region.
    #[must_use]
    pub fn chunk(&self, pos: ChunkPos) -> Option<&Arc<Chunk>> {
        self.position
            .contains(pos)
            .then(|| &self.chunks[pos.local_index()])
    }

    /// Every chunk, in local index order.
    pub fn chunks(&self) -> impl Iterator<Item = &Arc<Chunk>> {
        self.chunks.iter()
    }

    /// Number of chunks held (always a full region).
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Live block at `pos`, or `None` if outside this region.
    #[must_use]
    pub fn block(&self, pos: BlockPos) -> Option<BlockId> {
        self.chunk(pos.chunk())?.block(pos)
    }

    /// Writes a block. Returns `None` if `pos` is outside this region,
    /// otherwise whether anything changed.
    ///
    /// Stage gating is the caller's job; see [`World::set_block`](crate::World::set_block).
    pub(crate) fn set_block(&self, pos: BlockPos, id: BlockId) -> Option<bool> {
        let chunk = self.chunk(pos.chunk())?;
        let changed = chunk.set_block(pos.local_index(), id);
        if changed {
            self.update_number.fetch_add(1, Ordering::AcqRel);
        }
        Some(changed)
    }

    /// Immutable view of the region at its current update number.
    ///
    /// Chunks whose version did not move since the previous snapshot are
    /// shared with it rather than copied.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegionSnapshot> {
        let mut cached = self.cached.lock();
        let update_number = self.update_number();
        if let Some(previous) = cached.as_ref() {
            if previous.update_number() == update_number {
                return Arc::clone(previous);
            }
        }

        let chunks = self
            .chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                let reused = cached
                    .as_ref()
                    .map(|previous| previous.chunk_at(index))
                    .filter(|snapshot| snapshot.version() == chunk.version());
                match reused {
                    Some(snapshot) => Arc::clone(snapshot),
                    None => Arc::new(chunk.snapshot()),
                }
            })
            .collect();

        let snapshot = Arc::new(RegionSnapshot::new(self.position, update_number, chunks));
        *cached = Some(Arc::clone(&snapshot));
        snapshot
    }
}

impl RegionSource for Region {
    fn position(&self) -> RegionPos {
        self.position
    }

    fn load_id(&self) -> u64 {
        self.load_id
    }

    fn update_number(&self) -> u64 {
        Region::update_number(self)
    }

    fn snapshot(&self) -> Arc<RegionSnapshot> {
        Region::snapshot(self)
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("position", &self.position)
            .field("load_id", &self.load_id)
            .field("update_number", &self.update_number())
            .finish_non_exhaustive()
    }
}
