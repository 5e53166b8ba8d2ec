//! # Client Drivers
//!
//! Render and input threads. Neither takes part in the tick stages; both run
//! on their own cadence and may only read stable or snapshot state.
//!
//! ```text
//!  RenderDriver   every 1/target_fps   renderer.render(frame)
//!  InputDriver    recv_timeout(poll)   handler.handle(event)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use super::lifecycle::{DriverState, StopSignal};
use super::pulse::{Pulse, TickStats};
use crate::error::EngineResult;

/// Draws one frame from snapshot state.
pub trait FrameRenderer: Send + 'static {
    /// Renders frame number `frame`.
    fn render(&mut self, frame: u64);
}

/// A raw input event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    /// Keyboard key.
    Key {
        /// Platform key code.
        code: u32,
        /// Pressed or released.
        pressed: bool,
    },
    /// Relative mouse motion.
    MouseMove {
        /// Horizontal delta.
        dx: f32,
        /// Vertical delta.
        dy: f32,
    },
    /// Mouse button.
    MouseButton {
        /// Button index.
        button: u8,
        /// Pressed or released.
        pressed: bool,
    },
    /// The window was closed.
    Close,
}

/// Consumes input events on the input thread.
pub trait InputHandler: Send + 'static {
    /// Handles one event.
    fn handle(&mut self, event: InputEvent);
}

/// Thread plus lifecycle shared by both client drivers.
#[derive(Debug)]
struct DriverThread {
    what: &'static str,
    state: Mutex<DriverState>,
    signal: Arc<StopSignal>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DriverThread {
    fn new(what: &'static str) -> Self {
        Self {
            what,
            state: Mutex::new(DriverState::Idle),
            signal: Arc::new(StopSignal::new()),
            handle: Mutex::new(None),
        }
    }

    fn start(&self, name: &str, body: impl FnOnce(Arc<StopSignal>) + Send + 'static) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.begin(self.what)?;
        let signal = Arc::clone(&self.signal);
        match thread::Builder::new().name(name.into()).spawn(move || body(signal)) {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                tracing::info!("{} started", self.what);
                Ok(())
            }
            Err(e) => {
                *state = DriverState::Idle;
                Err(e.into())
            }
        }
    }

    fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == DriverState::Stopped {
                return;
            }
            *state = DriverState::Stopped;
        }
        self.signal.stop();
        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!("{} panicked", self.what);
            }
            tracing::info!("{} stopped", self.what);
        }
    }

    fn state(&self) -> DriverState {
        *self.state.lock()
    }
}

/// Fixed-cadence render thread.
#[derive(Debug)]
pub struct RenderDriver {
    thread: DriverThread,
    interval: Duration,
    frames: Arc<AtomicU64>,
    stats: Arc<Mutex<TickStats>>,
}

impl RenderDriver {
    /// Creates an idle driver rendering every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            thread: DriverThread::new("render thread"),
            interval,
            frames: Arc::new(AtomicU64::new(0)),
            stats: Arc::new(Mutex::new(*Pulse::new(interval).stats())),
        }
    }

    /// Spawns the render thread.
    ///
    /// # Errors
    ///
    /// [`strata_core::CoreError::AlreadyRunning`] on a second call,
    /// [`strata_core::CoreError::DriverStopped`] after `stop`.
    pub fn start(&self, mut renderer: impl FrameRenderer) -> EngineResult<()> {
        let interval = self.interval;
        let frames = Arc::clone(&self.frames);
        let stats = Arc::clone(&self.stats);
        self.thread.start("strata-render", move |signal| {
            let mut pulse = Pulse::new(interval);
            while !signal.is_stopped() {
                pulse.begin();
                renderer.render(frames.fetch_add(1, Ordering::AcqRel));
                pulse.end();
                *stats.lock() = *pulse.stats();
                if signal.wait_timeout(pulse.remaining()) {
                    break;
                }
            }
        })
    }

    /// Stops and joins the render thread. Idempotent.
    pub fn stop(&self) {
        self.thread.stop();
    }

    /// Frames rendered so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Frame timing statistics.
    #[must_use]
    pub fn stats(&self) -> TickStats {
        *self.stats.lock()
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        self.thread.state()
    }
}

impl Drop for RenderDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Input thread fed by an event channel.
#[derive(Debug)]
pub struct InputDriver {
    thread: DriverThread,
    poll: Duration,
    events: Arc<AtomicU64>,
}

impl InputDriver {
    /// Creates an idle driver that wakes at least every `poll` to notice
    /// `stop`.
    #[must_use]
    pub fn new(poll: Duration) -> Self {
        Self {
            thread: DriverThread::new("input thread"),
            poll,
            events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawns the input thread. It exits when stopped or when every sender
    /// of `events` is gone.
    ///
    /// # Errors
    ///
    /// [`strata_core::CoreError::AlreadyRunning`] on a second call,
    /// [`strata_core::CoreError::DriverStopped`] after `stop`.
    pub fn start(&self, events: Receiver<InputEvent>, mut handler: impl InputHandler) -> EngineResult<()> {
        let poll = self.poll;
        let count = Arc::clone(&self.events);
        self.thread.start("strata-input", move |signal| {
            while !signal.is_stopped() {
                match events.recv_timeout(poll) {
                    Ok(event) => {
                        count.fetch_add(1, Ordering::AcqRel);
                        handler.handle(event);
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        tracing::debug!("input source closed");
                        break;
                    }
                }
            }
        })
    }

    /// Stops and joins the input thread. Idempotent.
    pub fn stop(&self) {
        self.thread.stop();
    }

    /// Events handled so far.
    #[must_use]
    pub fn events_handled(&self) -> u64 {
        self.events.load(Ordering::Acquire)
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        self.thread.state()
    }
}

impl Drop for InputDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
