//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file is a valid server configuration:
//!
//! ```toml
//! platform = "server"        # server | client | singleplayer
//! pulse_ms = 50              # tick driver pulse (20 Hz)
//! target_fps = 60            # render driver cadence
//! input_poll_ms = 5          # input driver wake-up when idle
//! worker_threads = 4         # async task pool
//! log_filter = "info"
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Milliseconds between tick pulses.
pub const PULSE_EVERY_MS: u64 = 50;

/// Render driver target frame rate.
pub const TARGET_FPS: u32 = 60;

/// Which threads an engine runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Headless: tick thread only.
    #[default]
    Server,
    /// Remote client: tick, render and input threads.
    Client,
    /// Local client and server in one process.
    Singleplayer,
}

impl Platform {
    /// Whether this platform runs render and input threads.
    #[must_use]
    pub const fn is_client(self) -> bool {
        matches!(self, Self::Client | Self::Singleplayer)
    }

    /// Whether this platform simulates the world authoritatively.
    #[must_use]
    pub const fn is_server(self) -> bool {
        matches!(self, Self::Server | Self::Singleplayer)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Server => "server",
            Self::Client => "client",
            Self::Singleplayer => "singleplayer",
        })
    }
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Which threads to run.
    pub platform: Platform,
    /// Tick pulse in milliseconds.
    pub pulse_ms: u64,
    /// Render driver frame rate.
    pub target_fps: u32,
    /// Input driver poll timeout in milliseconds.
    pub input_poll_ms: u64,
    /// Threads in the async task pool.
    pub worker_threads: usize,
    /// Default tracing filter when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Server,
            pulse_ms: PULSE_EVERY_MS,
            target_fps: TARGET_FPS,
            input_poll_ms: 5,
            worker_threads: 4,
            log_filter: String::from("info"),
        }
    }
}

impl EngineConfig {
    /// Default configuration for `platform`.
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidConfig`] on a parse or validation failure.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| EngineError::InvalidConfig(format!("failed to parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`EngineError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|e| match e {
            EngineError::InvalidConfig(msg) => {
                EngineError::InvalidConfig(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Checks that every rate and count is usable.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> EngineResult<()> {
        if self.pulse_ms == 0 {
            return Err(EngineError::InvalidConfig("pulse_ms must be positive".into()));
        }
        if self.target_fps == 0 {
            return Err(EngineError::InvalidConfig("target_fps must be positive".into()));
        }
        if self.input_poll_ms == 0 {
            return Err(EngineError::InvalidConfig("input_poll_ms must be positive".into()));
        }
        if self.worker_threads == 0 {
            return Err(EngineError::InvalidConfig("worker_threads must be positive".into()));
        }
        Ok(())
    }

    /// Tick pulse interval.
    #[must_use]
    pub fn pulse(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }

    /// Render frame interval.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.target_fps.max(1)))
    }

    /// Input poll timeout.
    #[must_use]
    pub fn input_poll(&self) -> Duration {
        Duration::from_millis(self.input_poll_ms)
    }
}
