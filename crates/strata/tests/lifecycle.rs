//! Start and stop guarantees of the engine's drivers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use strata::{
    AsyncManager, DriverState, Engine, EngineConfig, EngineError, EngineResult, FrameRenderer,
    InputEvent, InputHandler, Platform, TaskPriority,
};
use strata_core::CoreError;

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

fn fast(platform: Platform) -> Engine {
    Engine::new(EngineConfig {
        platform,
        pulse_ms: 1,
        ..EngineConfig::default()
    })
    .unwrap()
}

#[test]
fn test_double_start_does_not_spawn_second_thread() {
    let engine = fast(Platform::Server);
    let ticks = Arc::new(AtomicU64::new(0));
    let t = Arc::clone(&ticks);
    engine.scheduler().tasks().schedule_sync_repeating(
        "counter",
        move || {
            t.fetch_add(1, Ordering::SeqCst);
        },
        0,
        1,
        TaskPriority::Normal,
    );

    engine.start().unwrap();
    let err = engine.start().unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::AlreadyRunning { what: "main thread" })
    ));
    assert!(wait_until(|| ticks.load(Ordering::SeqCst) >= 10));
    engine.stop();

    // One tick thread means the task ran once per tick, never twice
    assert_eq!(ticks.load(Ordering::SeqCst), engine.scheduler().up_time() + 1);
}

struct Slow {
    inside: Arc<AtomicBool>,
}

impl AsyncManager for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    fn stage_1(&self, _tick: u64) -> EngineResult<()> {
        Ok(())
    }

    fn stage_2(&self, _tick: u64) -> EngineResult<()> {
        self.inside.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        Ok(())
    }

    fn finalize(&self, _tick: u64) -> EngineResult<()> {
        Ok(())
    }
}

#[test]
fn test_stop_mid_stage_does_not_deadlock() {
    let engine = fast(Platform::Server);
    let inside = Arc::new(AtomicBool::new(false));
    engine
        .scheduler()
        .add_async_manager(Arc::new(Slow {
            inside: Arc::clone(&inside),
        }))
        .unwrap();

    engine.start().unwrap();
    assert!(wait_until(|| inside.load(Ordering::SeqCst)));
    let started = Instant::now();
    engine.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(engine.scheduler().main().state(), DriverState::Stopped);
    // Interrupted by stop, not halted by a failure
    assert!(engine.scheduler().main().last_error().is_none());
    assert!(engine.start().is_err());
}

#[test]
fn test_stop_before_start_and_repeated() {
    let engine = fast(Platform::Singleplayer);
    engine.stop();
    engine.stop();
    assert_eq!(engine.scheduler().render().unwrap().state(), DriverState::Stopped);
    assert!(matches!(
        engine.start(),
        Err(EngineError::Core(CoreError::DriverStopped { .. }))
    ));
}

#[test]
fn test_stop_from_a_task_on_the_tick_thread() {
    let engine = Arc::new(fast(Platform::Server));
    let weak: Weak<Engine> = Arc::downgrade(&engine);
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stopped);
    engine.scheduler().tasks().schedule_sync_delayed(
        "stopper",
        move || {
            if let Some(engine) = weak.upgrade() {
                engine.stop();
                flag.store(true, Ordering::SeqCst);
            }
        },
        3,
        TaskPriority::Normal,
    );
    engine.start().unwrap();
    assert!(wait_until(|| stopped.load(Ordering::SeqCst)));
    assert_eq!(engine.scheduler().main().state(), DriverState::Stopped);
    engine.stop();
}

struct Frames(Arc<AtomicU64>);

impl FrameRenderer for Frames {
    fn render(&mut self, _frame: u64) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct Keys(Arc<AtomicU64>);

impl InputHandler for Keys {
    fn handle(&mut self, event: InputEvent) {
        if let InputEvent::Key { pressed: true, .. } = event {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn test_client_threads_run_independently_of_ticks() {
    let engine = fast(Platform::Client);
    let frames = Arc::new(AtomicU64::new(0));
    let keys = Arc::new(AtomicU64::new(0));
    let (tx, rx) = crossbeam_channel::unbounded();

    // Client threads do not need the tick thread
    engine
        .start_client(Frames(Arc::clone(&frames)), rx.clone(), Keys(Arc::clone(&keys)))
        .unwrap();
    assert!(matches!(
        engine.start_client(Frames(Arc::clone(&frames)), rx, Keys(Arc::clone(&keys))),
        Err(EngineError::Core(CoreError::AlreadyRunning { .. }))
    ));

    tx.send(InputEvent::Key { code: 1, pressed: true }).unwrap();
    tx.send(InputEvent::Key { code: 1, pressed: false }).unwrap();
    assert!(wait_until(|| frames.load(Ordering::SeqCst) >= 2 && keys.load(Ordering::SeqCst) == 1));
    assert_eq!(engine.scheduler().main().tick(), 0);

    engine.stop();
    let rendered = frames.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(40));
    assert_eq!(frames.load(Ordering::SeqCst), rendered);
}
