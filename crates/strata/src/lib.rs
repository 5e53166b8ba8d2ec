//! # STRATA Engine
//!
//! A staged tick scheduler over a snapshotted voxel world.
//!
//! ## Architecture
//!
//! - **Tick driver**: fixed 50 ms pulse, six stages per tick
//! - **Async managers**: per-tick participants released stage by stage
//! - **Snapshot commit**: live state copied to its stable side once per tick
//! - **Client drivers**: render and input threads that read snapshots only
//!
//! ## Tick Stages
//!
//! ```text
//!  Tasks ─> Stage1 ─> Stage2 ─> Finalize ─> PreSnapshot ─> CopySnapshot ─┐
//!    ^      (mutate, managers in parallel)   (read-only)   (commit)      │
//!    └───────────────────────────── next tick ───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata::{Engine, EngineConfig};
//! use strata_world::{BlockPos, FlatWorldGenerator};
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let world = engine.load_world("world", Arc::new(FlatWorldGenerator::default())).unwrap();
//! world.set_block(BlockPos::new(0, 80, 0), 3).unwrap();
//!
//! engine.step().unwrap();
//! assert_eq!(world.snapshot().block(BlockPos::new(0, 80, 0)), Some(3));
//! engine.stop();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;

pub use config::{EngineConfig, Platform, PULSE_EVERY_MS, TARGET_FPS};
pub use engine::{Engine, WorldManager};
pub use error::{EngineError, EngineResult};
pub use scheduler::{
    AsyncManager, CopySnapshotManager, DriverState, FrameRenderer, InputDriver, InputEvent,
    InputHandler, ManagerId, PendingTask, RenderDriver, Scheduler, TaskId, TaskManager,
    TaskPriority, TickDriver, TickStats, WorkerPool,
};
