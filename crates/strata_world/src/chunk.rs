//! # Live Chunks
//!
//! A chunk is 16x16x16 blocks. Most chunks of a freshly generated world are
//! a single material (all air above ground, all stone below), so storage
//! starts uniform and only expands to a dense array on the first write that
//! breaks uniformity.
//!
//! ```text
//!  Uniform(id)  ── set_block(i, other) ──>  Dense([id; 4096] with [i] = other)
//!   ~2 bytes                                 8 KiB
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::coords::{BlockPos, ChunkPos, BLOCKS_VOLUME};
use crate::snapshot::ChunkSnapshot;

/// Block material identifier. Materials themselves live outside this crate.
pub type BlockId = u16;

/// The empty block.
pub const AIR: BlockId = 0;

/// Block storage of one chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkData {
    /// Every block is the same.
    Uniform(BlockId),
    /// One entry per block, indexed by [`BlockPos::local_index`].
    Dense(Box<[BlockId]>),
}

impl ChunkData {
    /// Builds storage by evaluating `f` for every local index, collapsing
    /// to `Uniform` when all blocks agree.
    pub fn from_fn(mut f: impl FnMut(usize) -> BlockId) -> Self {
        let blocks: Box<[BlockId]> = (0..BLOCKS_VOLUME).map(&mut f).collect();
        let first = blocks[0];
        if blocks.iter().all(|&b| b == first) {
            Self::Uniform(first)
        } else {
            Self::Dense(blocks)
        }
    }

    /// Block at a local index.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> BlockId {
        match self {
            Self::Uniform(id) => *id,
            Self::Dense(blocks) => blocks[index],
        }
    }

    /// Writes a block, returning true if the stored value changed.
    pub fn set(&mut self, index: usize, id: BlockId) -> bool {
        match self {
            Self::Uniform(current) if *current == id => false,
            Self::Uniform(current) => {
                let mut blocks = vec![*current; BLOCKS_VOLUME].into_boxed_slice();
                blocks[index] = id;
                *self = Self::Dense(blocks);
                true
            }
            Self::Dense(blocks) => {
                let changed = blocks[index] != id;
                blocks[index] = id;
                changed
            }
        }
    }

    /// Returns true for single-material storage.
    #[must_use]
    pub fn is_uniform(&self) -> bool {
        matches!(self, Self::Uniform(_))
    }
}

/// A live chunk. Written only through its [`Region`](crate::Region).
#[derive(Debug)]
pub struct Chunk {
    position: ChunkPos,
    data: RwLock<ChunkData>,
    version: AtomicU64,
}

impl Chunk {
    /// Creates a chunk with generated contents.
    #[must_use]
    pub fn new(position: ChunkPos, data: ChunkData) -> Self {
        Self {
            position,
            data: RwLock::new(data),
            version: AtomicU64::new(0),
        }
    }

    /// Position in chunk coordinates.
    #[inline]
    #[must_use]
    pub fn position(&self) -> ChunkPos {
        self.position
    }

    /// Number of changes applied since generation.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Live block at `pos`, or `None` if `pos` is not in this chunk.
    #[must_use]
    pub fn block(&self, pos: BlockPos) -> Option<BlockId> {
        (pos.chunk() == self.position).then(|| self.data.read().get(pos.local_index()))
    }

    /// Writes a block, bumping the version if it changed.
    pub(crate) fn set_block(&self, index: usize, id: BlockId) -> bool {
        let mut data = self.data.write();
        let changed = data.set(index, id);
        // Bumped under the lock so a snapshot never pairs new blocks with an old version
        if changed {
            self.version.fetch_add(1, Ordering::AcqRel);
        }
        changed
    }

    /// Immutable copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> ChunkSnapshot {
        let data = self.data.read();
        ChunkSnapshot::new(self.position, self.version(), data.clone())
    }
}
