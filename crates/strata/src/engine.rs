//! # Engine
//!
//! The explicitly constructed root of one engine instance. Everything that
//! would otherwise be process-global (the snapshot registry, the loaded
//! worlds, the scheduler) hangs off an [`Engine`] value.
//!
//! ```text
//!  Engine
//!  ├── config: EngineConfig
//!  ├── registry: SnapshotRegistry       committed every CopySnapshot
//!  ├── scheduler: Scheduler             tick / render / input threads
//!  └── worlds: WorldManager
//!      └── "name" -> World
//!                    ├── age registered in the registry
//!                    ├── CopySnapshotManager  (publishes its snapshot)
//!                    └── WorldAgeManager      (age += 1 in Stage1)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use uuid::Uuid;

use strata_core::{SnapshotRegistry, StageClock, StageSet, StageToken, TickStage};
use strata_world::{World, WorldGenerator};

use crate::config::{EngineConfig, Platform};
use crate::error::{EngineError, EngineResult};
use crate::scheduler::{
    AsyncManager, CopySnapshotManager, FrameRenderer, InputEvent, InputHandler, ManagerId, Scheduler,
};

/// Advances one world's age by a tick in `Stage1`.
struct WorldAgeManager {
    name: String,
    world: Arc<World>,
}

impl AsyncManager for WorldAgeManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn stages(&self) -> StageSet {
        StageSet::of(&[TickStage::Stage1])
    }

    fn stage_1(&self, _tick: u64) -> EngineResult<()> {
        self.world.advance_age(1)?;
        Ok(())
    }

    fn stage_2(&self, _tick: u64) -> EngineResult<()> {
        Ok(())
    }

    fn finalize(&self, _tick: u64) -> EngineResult<()> {
        Ok(())
    }
}

struct LoadedWorld {
    world: Arc<World>,
    snapshot: Arc<dyn CopySnapshotManager>,
    age_manager: ManagerId,
}

/// Worlds loaded into one engine, by name.
#[derive(Default)]
pub struct WorldManager {
    worlds: RwLock<HashMap<String, LoadedWorld>>,
}

impl WorldManager {
    /// World named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<World>> {
        self.worlds.read().get(name).map(|w| Arc::clone(&w.world))
    }

    /// World with id `id`.
    #[must_use]
    pub fn get_by_id(&self, id: Uuid) -> Option<Arc<World>> {
        self.worlds
            .read()
            .values()
            .find(|w| w.world.id() == id)
            .map(|w| Arc::clone(&w.world))
    }

    /// Every loaded world.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<World>> {
        self.worlds.read().values().map(|w| Arc::clone(&w.world)).collect()
    }

    /// Number of loaded worlds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.worlds.read().len()
    }

    /// Returns true if no world is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.worlds.read().is_empty()
    }
}

impl std::fmt::Debug for WorldManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.worlds.read().keys()).finish()
    }
}

/// One engine instance.
pub struct Engine {
    config: EngineConfig,
    registry: SnapshotRegistry,
    scheduler: Scheduler,
    worlds: WorldManager,
}

impl Engine {
    /// Builds an engine. No thread runs until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidConfig`] if `config` does not validate;
    /// [`EngineError::Io`] if the worker pool cannot spawn.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let registry = SnapshotRegistry::new(StageClock::new());
        let scheduler = Scheduler::new(&config, registry.clone())?;
        tracing::debug!("engine created for platform {}", config.platform);
        Ok(Self {
            config,
            registry,
            scheduler,
            worlds: WorldManager::default(),
        })
    }

    /// Starts the tick thread.
    ///
    /// # Errors
    ///
    /// [`strata_core::CoreError::AlreadyRunning`] on a second call.
    pub fn start(&self) -> EngineResult<()> {
        tracing::info!(
            "starting engine on {} platform with {} worlds",
            self.config.platform,
            self.worlds.len()
        );
        self.scheduler.start_main_thread()
    }

    /// Starts the render and input threads.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::start_client_threads`].
    pub fn start_client(
        &self,
        renderer: impl FrameRenderer,
        events: Receiver<InputEvent>,
        handler: impl InputHandler,
    ) -> EngineResult<()> {
        self.scheduler.start_client_threads(renderer, events, handler)
    }

    /// Runs a single tick on the calling thread instead of starting the
    /// tick thread.
    ///
    /// # Errors
    ///
    /// See [`TickDriver::step`](crate::scheduler::TickDriver::step).
    pub fn step(&self) -> EngineResult<StageToken> {
        self.scheduler.main().step()
    }

    /// Stops every thread. Idempotent.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Creates and loads a world.
    ///
    /// Its age joins the snapshot registry, it publishes its snapshot every
    /// `CopySnapshot`, and its age advances once per tick.
    ///
    /// # Errors
    ///
    /// [`EngineError::WorldAlreadyLoaded`] if the name is taken; driver
    /// errors if the engine was stopped.
    pub fn load_world(&self, name: &str, generator: Arc<dyn WorldGenerator>) -> EngineResult<Arc<World>> {
        let mut worlds = self.worlds.worlds.write();
        if worlds.contains_key(name) {
            return Err(EngineError::WorldAlreadyLoaded(name.to_owned()));
        }

        let world = Arc::new(World::new(name, generator, &self.registry));
        let age_manager = self.scheduler.add_async_manager(Arc::new(WorldAgeManager {
            name: format!("{name}-age"),
            world: Arc::clone(&world),
        }))?;
        let snapshot: Arc<dyn CopySnapshotManager> = world.clone();
        self.scheduler.add_snapshot_manager(Arc::clone(&snapshot));

        tracing::info!(
            "loaded world {} ({}) with generator {}",
            name,
            world.id(),
            world.generator().name()
        );
        worlds.insert(
            name.to_owned(),
            LoadedWorld {
                world: Arc::clone(&world),
                snapshot,
                age_manager,
            },
        );
        Ok(world)
    }

    /// Unloads a world. Returns it, or `None` if no world has that name.
    ///
    /// Its snapshot stops updating from the next `CopySnapshot`.
    pub fn unload_world(&self, name: &str) -> Option<Arc<World>> {
        let loaded = self.worlds.worlds.write().remove(name)?;
        self.scheduler.remove_snapshot_manager(&loaded.snapshot);
        self.scheduler.remove_async_manager(loaded.age_manager);
        tracing::info!("unloaded world {} ({})", name, loaded.world.id());
        Some(loaded.world)
    }

    /// World named `name`.
    #[must_use]
    pub fn world(&self, name: &str) -> Option<Arc<World>> {
        self.worlds.get(name)
    }

    /// Every loaded world.
    #[must_use]
    pub fn worlds(&self) -> Vec<Arc<World>> {
        self.worlds.all()
    }

    /// The loaded worlds.
    #[must_use]
    pub fn world_manager(&self) -> &WorldManager {
        &self.worlds
    }

    /// The registry committed every `CopySnapshot`.
    #[must_use]
    pub fn snapshot_registry(&self) -> &SnapshotRegistry {
        &self.registry
    }

    /// The engine's threads.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The configuration this engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shorthand for `config().platform`.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.config.platform
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("platform", &self.config.platform)
            .field("worlds", &self.worlds)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
