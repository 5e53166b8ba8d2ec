//! Immutable region snapshot.

use std::sync::Arc;

use crate::chunk::BlockId;
use crate::coords::{BlockPos, ChunkPos, RegionPos};

use super::ChunkSnapshot;

/// A region frozen at one update number.
///
/// A changed region gets a new `RegionSnapshot`; existing ones are never
/// modified, so a reader holding an `Arc` keeps a consistent view.
#[derive(Debug)]
pub struct RegionSnapshot {
    position: RegionPos,
    update_number: u64,
    chunks: Box<[Arc<ChunkSnapshot>]>,
}

impl RegionSnapshot {
    /// Builds a snapshot from chunk snapshots in local index order.
    #[must_use]
    pub fn new(position: RegionPos, update_number: u64, chunks: Box<[Arc<ChunkSnapshot>]>) -> Self {
        Self {
            position,
            update_number,
            chunks,
        }
    }

    /// Position in region coordinates.
    #[inline]
    #[must_use]
    pub fn position(&self) -> RegionPos {
        self.position
    }

    /// Region update number this snapshot was taken at.
    #[inline]
    #[must_use]
    pub fn update_number(&self) -> u64 {
        self.update_number
    }

    /// Chunk snapshot at world chunk position `pos`, if inside this region.
    #[must_use]
    pub fn chunk(&self, pos: ChunkPos) -> Option<&Arc<ChunkSnapshot>> {
        if !self.position.contains(pos) {
            return None;
        }
        self.chunks.get(pos.local_index())
    }

    /// Chunk snapshot at a local index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`chunk_count`](Self::chunk_count).
    #[must_use]
    pub fn chunk_at(&self, index: usize) -> &Arc<ChunkSnapshot> {
        &self.chunks[index]
    }

    /// Every chunk snapshot, in local index order.
    pub fn chunks(&self) -> impl Iterator<Item = &Arc<ChunkSnapshot>> {
        self.chunks.iter()
    }

    /// Number of chunk snapshots.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Block at `pos`, if inside this region.
    #[must_use]
    pub fn block(&self, pos: BlockPos) -> Option<BlockId> {
        self.chunk(pos.chunk())?.block(pos)
    }
}
