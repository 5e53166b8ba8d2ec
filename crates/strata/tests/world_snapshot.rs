//! A loaded world mutated by a stage participant and read through its
//! snapshot from other threads while the engine runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strata::{AsyncManager, Engine, EngineConfig, EngineResult};
use strata_core::{StageSet, TickStage};
use strata_world::{BlockId, BlockPos, FlatWorldGenerator, RegionPos, World};

const TICKS: u64 = 50;

struct Painter {
    world: Arc<World>,
    marker: BlockPos,
}

impl AsyncManager for Painter {
    fn name(&self) -> &str {
        "painter"
    }

    fn stages(&self) -> StageSet {
        StageSet::of(&[TickStage::Finalize, TickStage::PreSnapshot])
    }

    fn stage_1(&self, _tick: u64) -> EngineResult<()> {
        Ok(())
    }

    fn stage_2(&self, _tick: u64) -> EngineResult<()> {
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn finalize(&self, tick: u64) -> EngineResult<()> {
        self.world.set_block(self.marker, (tick % 1000) as BlockId + 1)?;
        // A second region flickers in and out every other tick
        if tick % 2 == 0 {
            self.world.set_block(BlockPos::new(20, 0, 0), 2)?;
        } else {
            self.world.unload_region(RegionPos::new(1, 0, 0))?;
        }
        Ok(())
    }

    fn pre_snapshot(&self, _tick: u64) -> EngineResult<()> {
        // Read-only: any write here is a sequencing violation
        assert!(self.world.set_block(self.marker, 0).is_err());
        Ok(())
    }
}

#[test]
fn test_snapshot_follows_live_world_monotonically() {
    let engine = Engine::new(EngineConfig {
        pulse_ms: 1,
        ..EngineConfig::default()
    })
    .unwrap();
    let world = engine
        .load_world("painted", Arc::new(FlatWorldGenerator::new(0, 1)))
        .unwrap();
    let marker = BlockPos::new(1, 1, 1);
    engine
        .scheduler()
        .add_async_manager(Arc::new(Painter {
            world: Arc::clone(&world),
            marker,
        }))
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let snapshot = world.snapshot();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let (mut time, mut version, mut block) = (0, 0, 0);
                while !done.load(Ordering::Acquire) {
                    let now = snapshot.time();
                    assert!(now >= time);
                    time = now;
                    let v = snapshot.update_number();
                    assert!(v >= version);
                    version = v;
                    if let Some(b) = snapshot.block(marker) {
                        assert!(b >= block, "marker went back from {block} to {b}");
                        block = b;
                    }
                }
                time
            })
        })
        .collect();

    engine.start().unwrap();
    let mut waited = 0;
    while world.snapshot().time() < TICKS && waited < 20_000 {
        thread::sleep(Duration::from_millis(1));
        waited += 1;
    }
    engine.stop();
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    assert!(engine.scheduler().main().last_error().is_none());
    let snapshot = world.snapshot();
    assert!(snapshot.time() >= TICKS);
    assert_eq!(snapshot.time(), world.age());
    // Region churn bumps the version every tick
    assert!(snapshot.update_number() >= TICKS);
}
