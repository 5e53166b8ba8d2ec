//! Immutable chunk snapshot.

use crate::chunk::{BlockId, ChunkData};
use crate::coords::{BlockPos, ChunkPos};

/// A chunk's blocks frozen at one version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkSnapshot {
    position: ChunkPos,
    version: u64,
    data: ChunkData,
}

impl ChunkSnapshot {
    /// Freezes `data` as version `version` of the chunk at `position`.
    #[must_use]
    pub fn new(position: ChunkPos, version: u64, data: ChunkData) -> Self {
        Self {
            position,
            version,
            data,
        }
    }

    /// Position in chunk coordinates.
    #[inline]
    #[must_use]
    pub fn position(&self) -> ChunkPos {
        self.position
    }

    /// Chunk version this snapshot was taken at.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Block at `pos`, or `None` if `pos` is not in this chunk.
    #[must_use]
    pub fn block(&self, pos: BlockPos) -> Option<BlockId> {
        (pos.chunk() == self.position).then(|| self.data.get(pos.local_index()))
    }

    /// Returns true if every block is the same material.
    #[must_use]
    pub fn is_uniform(&self) -> bool {
        self.data.is_uniform()
    }
}
