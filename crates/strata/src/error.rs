//! # Engine Error Types

use thiserror::Error;

use strata_core::{CoreError, TickStage};
use strata_world::WorldError;

use crate::config::Platform;

/// Errors raised by the engine, its scheduler and its drivers.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The configuration failed to parse or validate.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Client threads were requested on a platform without them.
    #[error("platform {platform} has no render or input threads")]
    ClientThreadsUnavailable {
        /// The engine's platform.
        platform: Platform,
    },

    /// A world with this name is already loaded.
    #[error("world {0} is already loaded")]
    WorldAlreadyLoaded(String),

    /// An async manager hook panicked.
    #[error("async manager {manager} panicked in {stage} of tick {tick}")]
    ManagerPanicked {
        /// Name of the manager.
        manager: String,
        /// Stage the hook ran in.
        stage: TickStage,
        /// Tick the hook ran in.
        tick: u64,
    },

    /// Thread spawn or config file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A sequencing violation from the core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A world or snapshot failure.
    #[error(transparent)]
    World(#[from] WorldError),
}

impl EngineError {
    /// Clones the error for the driver's error slot. I/O errors keep their
    /// kind and message only.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        match self {
            Self::InvalidConfig(msg) => Self::InvalidConfig(msg.clone()),
            Self::ClientThreadsUnavailable { platform } => {
                Self::ClientThreadsUnavailable { platform: *platform }
            }
            Self::WorldAlreadyLoaded(name) => Self::WorldAlreadyLoaded(name.clone()),
            Self::ManagerPanicked {
                manager,
                stage,
                tick,
            } => Self::ManagerPanicked {
                manager: manager.clone(),
                stage: *stage,
                tick: *tick,
            },
            Self::Io(err) => Self::Io(std::io::Error::new(err.kind(), err.to_string())),
            Self::Core(err) => Self::Core(err.clone()),
            Self::World(err) => Self::World(err.clone()),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
