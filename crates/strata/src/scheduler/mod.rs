//! # Scheduler
//!
//! Owns the engine's threads:
//!
//! ```text
//!  Scheduler
//!  ├── TickDriver      "main thread"    always
//!  │   ├── TaskManager + WorkerPool
//!  │   └── one thread per AsyncManager
//!  ├── RenderDriver    "render thread"  client platforms only
//!  └── InputDriver     "input thread"   client platforms only
//! ```

pub mod client;
pub mod driver;
pub mod lifecycle;
pub mod manager;
pub mod pulse;
pub mod task;
pub mod worker;

use std::sync::Arc;

use crossbeam_channel::Receiver;

use strata_core::{CoreError, SnapshotRegistry};

pub use client::{FrameRenderer, InputDriver, InputEvent, InputHandler, RenderDriver};
pub use driver::TickDriver;
pub use lifecycle::{DriverState, StopSignal};
pub use manager::{AsyncManager, CopySnapshotManager, ManagerId};
pub use pulse::{Pulse, TickStats};
pub use task::{PendingTask, TaskId, TaskManager, TaskPriority};
pub use worker::WorkerPool;

use crate::config::{EngineConfig, Platform};
use crate::error::{EngineError, EngineResult};

struct ClientDrivers {
    render: RenderDriver,
    input: InputDriver,
}

/// The engine's thread set.
pub struct Scheduler {
    platform: Platform,
    main: TickDriver,
    client: Option<ClientDrivers>,
}

impl Scheduler {
    /// Builds the drivers for `config.platform`. Nothing is started.
    ///
    /// # Errors
    ///
    /// [`EngineError::Io`] if the async worker pool cannot spawn.
    pub fn new(config: &EngineConfig, registry: SnapshotRegistry) -> EngineResult<Self> {
        let client = config.platform.is_client().then(|| ClientDrivers {
            render: RenderDriver::new(config.frame_interval()),
            input: InputDriver::new(config.input_poll()),
        });
        Ok(Self {
            platform: config.platform,
            main: TickDriver::new(registry, config.pulse(), config.worker_threads)?,
            client,
        })
    }

    /// Starts the tick thread.
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyRunning`] on a second call.
    pub fn start_main_thread(&self) -> EngineResult<()> {
        self.main.start()
    }

    /// Starts the render and input threads.
    ///
    /// # Errors
    ///
    /// [`EngineError::ClientThreadsUnavailable`] on the server platform,
    /// [`CoreError::AlreadyRunning`] if either is already running.
    pub fn start_client_threads(
        &self,
        renderer: impl FrameRenderer,
        events: Receiver<InputEvent>,
        handler: impl InputHandler,
    ) -> EngineResult<()> {
        let Some(client) = &self.client else {
            return Err(EngineError::ClientThreadsUnavailable {
                platform: self.platform,
            });
        };
        if client.render.state() != DriverState::Idle || client.input.state() != DriverState::Idle {
            if client.render.state() == DriverState::Running || client.input.state() == DriverState::Running {
                tracing::error!("attempt was made to start the client threads twice");
                return Err(CoreError::AlreadyRunning { what: "client threads" }.into());
            }
            return Err(CoreError::DriverStopped { what: "client threads" }.into());
        }
        client.render.start(renderer)?;
        if let Err(e) = client.input.start(events, handler) {
            client.render.stop();
            return Err(e);
        }
        Ok(())
    }

    /// Stops the tick, render and input threads. Idempotent; drivers that
    /// never started are simply marked stopped.
    pub fn stop(&self) {
        if let Some(client) = &self.client {
            client.input.stop();
            client.render.stop();
        }
        self.main.stop();
    }

    /// The tick driver.
    #[must_use]
    pub fn main(&self) -> &TickDriver {
        &self.main
    }

    /// The render driver, on client platforms.
    #[must_use]
    pub fn render(&self) -> Option<&RenderDriver> {
        self.client.as_ref().map(|c| &c.render)
    }

    /// The input driver, on client platforms.
    #[must_use]
    pub fn input(&self) -> Option<&InputDriver> {
        self.client.as_ref().map(|c| &c.input)
    }

    /// The task queue.
    #[must_use]
    pub fn tasks(&self) -> &TaskManager {
        self.main.tasks()
    }

    /// Registers a stage participant.
    ///
    /// # Errors
    ///
    /// See [`TickDriver::add_async_manager`].
    pub fn add_async_manager(&self, manager: Arc<dyn AsyncManager>) -> EngineResult<ManagerId> {
        self.main.add_async_manager(manager)
    }

    /// Removes a stage participant.
    pub fn remove_async_manager(&self, id: ManagerId) -> bool {
        self.main.remove_async_manager(id)
    }

    /// Every registered stage participant.
    #[must_use]
    pub fn async_managers(&self) -> Vec<Arc<dyn AsyncManager>> {
        self.main.async_managers()
    }

    /// Adds a `CopySnapshot` participant.
    pub fn add_snapshot_manager(&self, manager: Arc<dyn CopySnapshotManager>) {
        self.main.add_snapshot_manager(manager);
    }

    /// Removes a `CopySnapshot` participant.
    pub fn remove_snapshot_manager(&self, manager: &Arc<dyn CopySnapshotManager>) -> bool {
        self.main.remove_snapshot_manager(manager)
    }

    /// Cancels every task owned by `owner`.
    pub fn cancel_tasks(&self, owner: &str) -> usize {
        self.tasks().cancel_owner(owner)
    }

    /// Cancels every queued task.
    pub fn cancel_all_tasks(&self) {
        self.tasks().cancel_all();
    }

    /// Queued tasks, in drain order.
    #[must_use]
    pub fn pending_tasks(&self) -> Vec<PendingTask> {
        self.tasks().pending_tasks()
    }

    /// Async tasks executing right now.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.tasks().active_workers()
    }

    /// Ticks run so far.
    #[must_use]
    pub fn up_time(&self) -> u64 {
        self.tasks().up_time()
    }

    /// Platform the drivers were built for.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("platform", &self.platform)
            .field("main", &self.main)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::StageClock;

    struct NoRender;

    impl FrameRenderer for NoRender {
        fn render(&mut self, _frame: u64) {}
    }

    struct NoInput;

    impl InputHandler for NoInput {
        fn handle(&mut self, _event: InputEvent) {}
    }

    fn scheduler(platform: Platform) -> Scheduler {
        let config = EngineConfig::for_platform(platform);
        Scheduler::new(&config, SnapshotRegistry::new(StageClock::new())).unwrap()
    }

    #[test]
    fn test_server_has_no_client_threads() {
        let scheduler = scheduler(Platform::Server);
        assert!(scheduler.render().is_none());
        let (_tx, rx) = crossbeam_channel::unbounded();
        assert!(matches!(
            scheduler.start_client_threads(NoRender, rx, NoInput),
            Err(EngineError::ClientThreadsUnavailable { platform: Platform::Server })
        ));
        scheduler.stop();
    }

    #[test]
    fn test_client_threads_start_once() {
        let scheduler = scheduler(Platform::Client);
        let (_tx, rx) = crossbeam_channel::unbounded();
        scheduler.start_client_threads(NoRender, rx.clone(), NoInput).unwrap();
        assert!(matches!(
            scheduler.start_client_threads(NoRender, rx, NoInput),
            Err(EngineError::Core(CoreError::AlreadyRunning { what: "client threads" }))
        ));
        scheduler.stop();
        scheduler.stop();
        assert_eq!(scheduler.render().unwrap().state(), DriverState::Stopped);
        assert_eq!(scheduler.main().state(), DriverState::Stopped);
    }

    #[test]
    fn test_stop_with_only_main_started() {
        let scheduler = scheduler(Platform::Singleplayer);
        scheduler.start_main_thread().unwrap();
        scheduler.stop();
        assert_eq!(scheduler.input().unwrap().state(), DriverState::Stopped);
    }
}
