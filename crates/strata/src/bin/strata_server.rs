//! # STRATA Server
//!
//! Headless engine: tick thread only, no render or input threads.
//!
//! ```bash
//! # Defaults (50 ms pulse, 4 async workers)
//! ./strata_server
//!
//! # With a config file and debug logging
//! RUST_LOG=strata=debug ./strata_server strata.toml
//! ```
//!
//! Type `stop` (or close stdin) to shut down.

use std::io::BufRead;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use strata::{Engine, EngineConfig, EngineResult, Platform};
use strata_world::FlatWorldGenerator;

fn load_config() -> EngineResult<EngineConfig> {
    match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::for_platform(Platform::Server)),
    }
}

fn run(config: EngineConfig) -> EngineResult<()> {
    let engine = Engine::new(config)?;
    let world = engine.load_world("world", Arc::new(FlatWorldGenerator::default()))?;
    engine.start()?;

    println!("   ✓ World '{}' loaded ({})", world.name(), world.id());
    println!("   ✓ Tick driver running every {:?}", engine.config().pulse());
    println!();
    println!("   Type 'stop' to shut down.");
    println!();

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        match line.trim() {
            "stop" => break,
            "status" => {
                let stats = engine.scheduler().main().stats();
                println!(
                    "   tick {} | age {} | regions {} | avg {} us | late {}",
                    engine.scheduler().main().tick(),
                    world.age(),
                    world.snapshot().region_count(),
                    stats.avg_tick_us,
                    stats.late_ticks
                );
            }
            "" => {}
            other => println!("   unknown command: {other}"),
        }
        if let Some(err) = engine.scheduler().main().last_error() {
            engine.stop();
            return Err(err);
        }
    }

    engine.stop();
    Ok(())
}

fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("   ✗ FATAL: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                    STRATA SERVER v{}", env!("CARGO_PKG_VERSION"));
    println!("                    platform: {}", config.platform);
    println!("═══════════════════════════════════════════════════════════════════");
    println!();

    if let Err(e) = run(config) {
        tracing::error!("server failed: {}", e);
        eprintln!("   ✗ FATAL: {e}");
        std::process::exit(1);
    }
    println!("   ✓ Server stopped");
}
