//! Stage ordering as seen by async managers on a running tick thread.
//!
//! Every manager sees `Stage1, Stage2, Finalize` exactly once per tick, and
//! no manager starts a stage before every manager finished the previous one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use strata::{AsyncManager, Engine, EngineConfig, EngineResult};
use strata_core::TickStage;

const MANAGERS: usize = 6;
const TICKS: u64 = 40;

/// Global order of hook entries and exits across all managers.
#[derive(Default)]
struct Timeline {
    events: Mutex<Vec<(u64, TickStage, bool)>>,
}

struct Observer {
    name: String,
    seen: Mutex<Vec<(u64, TickStage)>>,
    timeline: Arc<Timeline>,
    jitter: AtomicU64,
}

impl Observer {
    fn hook(&self, tick: u64, stage: TickStage) -> EngineResult<()> {
        self.timeline.events.lock().push((tick, stage, true));
        self.seen.lock().push((tick, stage));
        // Uneven work so managers finish in different orders
        let spin = self.jitter.fetch_add(7, Ordering::Relaxed) % 200;
        thread::sleep(Duration::from_micros(spin));
        self.timeline.events.lock().push((tick, stage, false));
        Ok(())
    }
}

impl AsyncManager for Observer {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage_1(&self, tick: u64) -> EngineResult<()> {
        self.hook(tick, TickStage::Stage1)
    }

    fn stage_2(&self, tick: u64) -> EngineResult<()> {
        self.hook(tick, TickStage::Stage2)
    }

    fn finalize(&self, tick: u64) -> EngineResult<()> {
        self.hook(tick, TickStage::Finalize)
    }
}

#[test]
fn test_every_manager_sees_each_stage_once_per_tick() {
    let engine = Engine::new(EngineConfig {
        pulse_ms: 1,
        ..EngineConfig::default()
    })
    .unwrap();
    let timeline = Arc::new(Timeline::default());

    let observers: Vec<Arc<Observer>> = (0..MANAGERS)
        .map(|i| {
            Arc::new(Observer {
                name: format!("observer-{i}"),
                seen: Mutex::new(Vec::new()),
                timeline: Arc::clone(&timeline),
                jitter: AtomicU64::new(i as u64 * 31),
            })
        })
        .collect();
    for observer in &observers {
        engine.scheduler().add_async_manager(observer.clone()).unwrap();
    }

    engine.start().unwrap();
    let mut waited = 0;
    while engine.scheduler().main().tick() < TICKS && waited < 20_000 {
        thread::sleep(Duration::from_millis(1));
        waited += 1;
    }
    engine.stop();
    assert!(engine.scheduler().main().last_error().is_none());

    // Per manager: Stage1, Stage2, Finalize for consecutive ticks, nothing else
    for observer in &observers {
        let seen = observer.seen.lock();
        let complete_ticks = seen.len() / 3;
        assert!(complete_ticks as u64 >= TICKS - 1, "{} saw {} hooks", observer.name, seen.len());
        for (i, &(tick, stage)) in seen.iter().enumerate() {
            let expected_stage = [TickStage::Stage1, TickStage::Stage2, TickStage::Finalize][i % 3];
            assert_eq!(stage, expected_stage);
            assert_eq!(tick, seen[0].0 + (i / 3) as u64);
        }
    }

    // Globally: a hook for a later stage never starts while an earlier one runs
    let events = timeline.events.lock();
    let mut running = 0usize;
    let mut current: Option<(u64, TickStage)> = None;
    for &(tick, stage, entering) in events.iter() {
        if entering {
            match current {
                Some(now) if now != (tick, stage) => {
                    assert_eq!(running, 0, "{stage} of tick {tick} started while {now:?} was running");
                    assert!((tick, stage) > now);
                }
                _ => {}
            }
            current = Some((tick, stage));
            running += 1;
        } else {
            assert_eq!(current, Some((tick, stage)));
            running -= 1;
        }
    }
}
