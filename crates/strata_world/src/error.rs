//! # World Error Types

use thiserror::Error;
use uuid::Uuid;

use strata_core::CoreError;

use crate::coords::RegionPos;

/// Errors raised by the live world and its snapshots.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// A snapshot was updated from a world it is not bound to.
    #[error("snapshot is bound to world {expected}, got world {actual}")]
    IdentityMismatch {
        /// The snapshot's world.
        expected: Uuid,
        /// The world passed in.
        actual: Uuid,
    },

    /// The operation exists on the world surface but is not implemented.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// The region is not loaded and the load option forbids loading it.
    #[error("region {0} is not loaded")]
    RegionNotLoaded(RegionPos),

    /// A chunk-local coordinate outside 0..16.
    #[error("chunk-local coordinate out of bounds")]
    ChunkOutOfBounds,

    /// A sequencing violation from the core.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
