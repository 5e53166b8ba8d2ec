//! Task queue behaviour through the engine's tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;

use strata::{Engine, EngineConfig, TaskPriority};
use strata_core::{StageClock, TickStage};

const PRIORITIES: [TaskPriority; 5] = [
    TaskPriority::Critical,
    TaskPriority::High,
    TaskPriority::Normal,
    TaskPriority::Low,
    TaskPriority::Lowest,
];

#[test]
fn test_random_schedule_runs_in_tick_priority_submission_order() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let tasks = engine.scheduler().tasks();
    let mut rng = rand::thread_rng();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut expected = Vec::new();
    for seq in 0..300u64 {
        let delay = rng.gen_range(0..10u64);
        let priority = PRIORITIES[rng.gen_range(0..PRIORITIES.len())];
        let log = Arc::clone(&log);
        let clock: StageClock = engine.snapshot_registry().clock().clone();
        tasks.schedule_sync_delayed(
            "random",
            move || {
                // Tasks only ever run in the Tasks stage
                assert_eq!(clock.stage(), TickStage::Tasks);
                log.lock().push((clock.tick(), priority, seq));
            },
            delay,
            priority,
        );
        expected.push((delay, priority, seq));
    }

    for _ in 0..12 {
        engine.step().unwrap();
    }

    expected.sort_unstable();
    let log = log.lock();
    assert_eq!(log.len(), expected.len());
    assert_eq!(*log, expected);
    assert_eq!(engine.scheduler().pending_tasks().len(), 0);
}

#[test]
fn test_repeating_task_and_cancel_owner() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let scheduler = engine.scheduler();
    let runs = Arc::new(AtomicU64::new(0));
    let r = Arc::clone(&runs);
    let id = scheduler.tasks().schedule_sync_repeating(
        "plugin",
        move || {
            r.fetch_add(1, Ordering::SeqCst);
        },
        1,
        3,
        TaskPriority::High,
    );
    scheduler
        .tasks()
        .schedule_sync_delayed("plugin", || panic!("cancelled task ran"), 20, TaskPriority::Low);

    // Ticks 0..=9: runs at 1, 4, 7
    for _ in 0..10 {
        engine.step().unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert!(scheduler.tasks().is_queued(id));
    assert_eq!(scheduler.pending_tasks().len(), 2);

    assert_eq!(scheduler.cancel_tasks("plugin"), 2);
    for _ in 0..20 {
        engine.step().unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert!(!scheduler.tasks().is_queued(id));
    assert_eq!(scheduler.up_time(), 29);
}

#[test]
fn test_async_task_completes_off_tick() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let (tx, rx) = crossbeam_channel::bounded(1);
    engine
        .scheduler()
        .tasks()
        .schedule_async("io", move || {
            tx.send(std::thread::current().name().map(str::to_owned)).unwrap();
        })
        .unwrap();
    let name = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    assert!(name.unwrap().starts_with("strata-worker"));
    engine.stop();
    assert_eq!(engine.scheduler().active_workers(), 0);
}
