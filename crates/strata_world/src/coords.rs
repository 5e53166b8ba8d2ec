//! # World Coordinates
//!
//! ```text
//!  BlockPos  ──>> BLOCKS_BITS ──>  ChunkPos  ──>> CHUNKS_BITS ──>  RegionPos
//!  (blocks)                        (chunks)                        (regions)
//! ```
//!
//! Shifts are arithmetic, so negative coordinates floor toward minus
//! infinity: block -1 lives in chunk -1, chunk -1 in region -1.

use std::fmt;

/// log2 of the chunk edge length in blocks.
pub const BLOCKS_BITS: u32 = 4;
/// Chunk edge length in blocks.
pub const BLOCKS_SIZE: i32 = 1 << BLOCKS_BITS;
/// Blocks in one chunk.
pub const BLOCKS_VOLUME: usize = 1 << (3 * BLOCKS_BITS);

/// log2 of the region edge length in chunks.
pub const CHUNKS_BITS: u32 = 4;
/// Region edge length in chunks.
pub const CHUNKS_SIZE: i32 = 1 << CHUNKS_BITS;
/// Chunks in one region.
pub const CHUNKS_VOLUME: usize = 1 << (3 * CHUNKS_BITS);

macro_rules! position_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            /// X coordinate
            pub x: i32,
            /// Y coordinate
            pub y: i32,
            /// Z coordinate
            pub z: i32,
        }

        impl $name {
            /// Creates a new position
            #[must_use]
            pub const fn new(x: i32, y: i32, z: i32) -> Self {
                Self { x, y, z }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "({}, {}, {})", self.x, self.y, self.z)
            }
        }

        impl From<(i32, i32, i32)> for $name {
            fn from((x, y, z): (i32, i32, i32)) -> Self {
                Self::new(x, y, z)
            }
        }
    };
}

position_type!(
    /// Block position in world space.
    BlockPos
);
position_type!(
    /// Chunk position in world space (one unit = one chunk).
    ChunkPos
);
position_type!(
    /// Region position in world space (one unit = one region).
    RegionPos
);

/// Packs a local 3D index with `bits` bits per axis, y-major.
#[allow(clippy::cast_sign_loss)]
const fn pack_local(x: i32, y: i32, z: i32, bits: u32) -> usize {
    let mask = (1 << bits) - 1;
    (((y & mask) << (2 * bits)) | ((z & mask) << bits) | (x & mask)) as usize
}

fn unpack_local(index: usize, bits: u32) -> (i32, i32, i32) {
    let mask = (1usize << bits) - 1;
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let axis = |shift: u32| ((index >> shift) & mask) as i32;
    (axis(0), axis(2 * bits), axis(bits))
}

impl BlockPos {
    /// The chunk containing this block.
    #[must_use]
    pub const fn chunk(self) -> ChunkPos {
        ChunkPos::new(
            self.x >> BLOCKS_BITS,
            self.y >> BLOCKS_BITS,
            self.z >> BLOCKS_BITS,
        )
    }

    /// The region containing this block.
    #[must_use]
    pub const fn region(self) -> RegionPos {
        self.chunk().region()
    }

    /// Index of this block inside its chunk.
    #[must_use]
    pub const fn local_index(self) -> usize {
        pack_local(self.x, self.y, self.z, BLOCKS_BITS)
    }
}

impl ChunkPos {
    /// The region containing this chunk.
    #[must_use]
    pub const fn region(self) -> RegionPos {
        RegionPos::new(
            self.x >> CHUNKS_BITS,
            self.y >> CHUNKS_BITS,
            self.z >> CHUNKS_BITS,
        )
    }

    /// Index of this chunk inside its region.
    #[must_use]
    pub const fn local_index(self) -> usize {
        pack_local(self.x, self.y, self.z, CHUNKS_BITS)
    }

    /// World position of this chunk's lowest-corner block.
    #[must_use]
    pub const fn base_block(self) -> BlockPos {
        BlockPos::new(
            self.x << BLOCKS_BITS,
            self.y << BLOCKS_BITS,
            self.z << BLOCKS_BITS,
        )
    }

    /// World position of the block at `index` inside this chunk.
    #[must_use]
    pub fn block_at(self, index: usize) -> BlockPos {
        let (x, y, z) = unpack_local(index, BLOCKS_BITS);
        let base = self.base_block();
        BlockPos::new(base.x + x, base.y + y, base.z + z)
    }
}

impl RegionPos {
    /// World position of this region's lowest-corner chunk.
    #[must_use]
    pub const fn base_chunk(self) -> ChunkPos {
        ChunkPos::new(
            self.x << CHUNKS_BITS,
            self.y << CHUNKS_BITS,
            self.z << CHUNKS_BITS,
        )
    }

    /// World position of the chunk at `index` inside this region.
    #[must_use]
    pub fn chunk_at(self, index: usize) -> ChunkPos {
        let (x, y, z) = unpack_local(index, CHUNKS_BITS);
        let base = self.base_chunk();
        ChunkPos::new(base.x + x, base.y + y, base.z + z)
    }

    /// Returns true if `chunk` lies in this region.
    #[must_use]
    pub fn contains(self, chunk: ChunkPos) -> bool {
        chunk.region() == self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_coordinates_floor() {
        let block = BlockPos::new(-1, 0, 17);
        assert_eq!(block.chunk(), ChunkPos::new(-1, 0, 1));
        assert_eq!(block.region(), RegionPos::new(-1, 0, 0));
        assert_eq!(ChunkPos::new(-16, -17, 15).region(), RegionPos::new(-1, -2, 0));
    }

    #[test]
    fn test_local_index_round_trip() {
        let chunk = ChunkPos::new(2, -3, 5);
        for index in [0, 1, 17, 255, 256, BLOCKS_VOLUME - 1] {
            let block = chunk.block_at(index);
            assert_eq!(block.chunk(), chunk);
            assert_eq!(block.local_index(), index);
        }
        let region = RegionPos::new(-1, 0, 1);
        let chunk = region.chunk_at(300);
        assert!(region.contains(chunk));
        assert_eq!(chunk.local_index(), 300);
    }

    #[test]
    fn test_volumes() {
        assert_eq!(BLOCKS_VOLUME, 4096);
        assert_eq!(CHUNKS_VOLUME, 4096);
        assert_eq!(BLOCKS_SIZE, 16);
        assert_eq!(RegionPos::new(1, 0, 0).base_chunk(), ChunkPos::new(16, 0, 0));
    }
}
