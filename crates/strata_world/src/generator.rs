//! World generators.
//!
//! A generator fills every chunk of a region before the region is inserted
//! into the world, so the first snapshot of a region is always complete.

use crate::chunk::{BlockId, ChunkData, AIR};
use crate::coords::{ChunkPos, BLOCKS_SIZE};

/// Produces the initial contents of chunks.
pub trait WorldGenerator: Send + Sync {
    /// Contents of the chunk at `position`. Must be deterministic.
    fn generate_chunk(&self, position: ChunkPos) -> ChunkData;

    /// Name for logs.
    fn name(&self) -> &str;
}

/// Flat terrain: `ground` below `height`, air above.
#[derive(Clone, Copy, Debug)]
pub struct FlatWorldGenerator {
    /// First block height that is air.
    pub height: i32,
    /// Material below `height`.
    pub ground: BlockId,
}

impl FlatWorldGenerator {
    /// Creates a flat generator.
    #[must_use]
    pub const fn new(height: i32, ground: BlockId) -> Self {
        Self { height, ground }
    }
}

impl Default for FlatWorldGenerator {
    fn default() -> Self {
        Self::new(64, 1)
    }
}

impl WorldGenerator for FlatWorldGenerator {
    fn generate_chunk(&self, position: ChunkPos) -> ChunkData {
        let bottom = position.base_block().y;
        if bottom + BLOCKS_SIZE <= self.height {
            return ChunkData::Uniform(self.ground);
        }
        if bottom >= self.height {
            return ChunkData::Uniform(AIR);
        }
        ChunkData::from_fn(|index| {
            if position.block_at(index).y < self.height {
                self.ground
            } else {
                AIR
            }
        })
    }

    fn name(&self) -> &str {
        "flat"
    }
}
