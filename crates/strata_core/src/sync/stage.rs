//! # Tick Stages and the Stage Clock
//!
//! Every tick walks the same ordered cycle:
//!
//! ```text
//!  ┌───────┐   ┌────────┐   ┌────────┐   ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//!  │ Tasks │──>│ Stage1 │──>│ Stage2 │──>│ Finalize │──>│ PreSnapshot │──>│ CopySnapshot │──┐
//!  └───────┘   └────────┘   └────────┘   └──────────┘   └─────────────┘   └──────────────┘  │
//!      ^          mutate       mutate       mutate         read-only        exclusive      │
//!      └───────────────────────────────── next tick ───────────────────────────────────────┘
//! ```
//!
//! The [`StageClock`] is the authoritative token: stage and tick number are
//! packed into a single atomic word so a reader can never observe the stage
//! of one tick paired with the number of another.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};

/// One phase of a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TickStage {
    /// Queued synchronous tasks run one at a time on the tick thread.
    Tasks = 0,
    /// First parallel stage. The API is fully open.
    Stage1 = 1,
    /// Second parallel stage (collisions and similar).
    Stage2 = 2,
    /// Last mutation stage of the tick.
    Finalize = 3,
    /// Monitor stage. Data is stable, nothing may be modified.
    PreSnapshot = 4,
    /// Live values are copied to their stable side. No reads.
    CopySnapshot = 5,
}

/// What a stage permits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageAccess {
    /// Live state may be mutated.
    Mutate,
    /// Nothing may be mutated; consistency checks only.
    ReadOnly,
    /// Only the commit routine may touch state.
    ExclusiveCommit,
}

impl TickStage {
    /// All stages in tick order.
    pub const ALL: [Self; 6] = [
        Self::Tasks,
        Self::Stage1,
        Self::Stage2,
        Self::Finalize,
        Self::PreSnapshot,
        Self::CopySnapshot,
    ];

    /// The stage that follows this one. `CopySnapshot` wraps to `Tasks`.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Tasks => Self::Stage1,
            Self::Stage1 => Self::Stage2,
            Self::Stage2 => Self::Finalize,
            Self::Finalize => Self::PreSnapshot,
            Self::PreSnapshot => Self::CopySnapshot,
            Self::CopySnapshot => Self::Tasks,
        }
    }

    /// Declared access mode.
    #[must_use]
    pub const fn access(self) -> StageAccess {
        match self {
            Self::Tasks | Self::Stage1 | Self::Stage2 | Self::Finalize => StageAccess::Mutate,
            Self::PreSnapshot => StageAccess::ReadOnly,
            Self::CopySnapshot => StageAccess::ExclusiveCommit,
        }
    }

    /// Whether async managers are released into this stage.
    ///
    /// `Tasks` and `CopySnapshot` run on the tick thread alone.
    #[must_use]
    pub const fn releases_managers(self) -> bool {
        matches!(
            self,
            Self::Stage1 | Self::Stage2 | Self::Finalize | Self::PreSnapshot
        )
    }

    const fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::Stage1,
            2 => Self::Stage2,
            3 => Self::Finalize,
            4 => Self::PreSnapshot,
            5 => Self::CopySnapshot,
            _ => Self::Tasks,
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for TickStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tasks => "Tasks",
            Self::Stage1 => "Stage1",
            Self::Stage2 => "Stage2",
            Self::Finalize => "Finalize",
            Self::PreSnapshot => "PreSnapshot",
            Self::CopySnapshot => "CopySnapshot",
        };
        f.write_str(name)
    }
}

/// A set of tick stages, stored as a bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StageSet(u8);

impl StageSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Every stage an async manager can be released into.
    pub const MANAGED: Self = Self(
        TickStage::Stage1.bit()
            | TickStage::Stage2.bit()
            | TickStage::Finalize.bit()
            | TickStage::PreSnapshot.bit(),
    );

    /// Builds a set from a list of stages.
    #[must_use]
    pub fn of(stages: &[TickStage]) -> Self {
        Self(stages.iter().fold(0, |acc, stage| acc | stage.bit()))
    }

    /// Returns true if `stage` is in the set.
    #[inline]
    #[must_use]
    pub const fn contains(self, stage: TickStage) -> bool {
        self.0 & stage.bit() != 0
    }

    /// Returns the union of both sets.
    #[must_use]
    pub const fn with(self, stage: TickStage) -> Self {
        Self(self.0 | stage.bit())
    }
}

/// Snapshot of the clock: which stage of which tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageToken {
    /// Current stage.
    pub stage: TickStage,
    /// Current tick number (starts at 0 before the first tick).
    pub tick: u64,
}

impl StageToken {
    const fn pack(self) -> u64 {
        (self.tick << 8) | self.stage as u64
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn unpack(word: u64) -> Self {
        Self {
            stage: TickStage::from_bits((word & 0xFF) as u8),
            tick: word >> 8,
        }
    }
}

/// Shared, authoritative stage token.
///
/// Cloning is cheap and every clone observes the same clock. Only the
/// [`StageBarrier`](super::StageBarrier) moves it forward.
#[derive(Clone, Debug)]
pub struct StageClock {
    word: Arc<AtomicU64>,
}

impl StageClock {
    /// Creates a clock at `Tasks` of tick 0.
    #[must_use]
    pub fn new() -> Self {
        let initial = StageToken {
            stage: TickStage::Tasks,
            tick: 0,
        };
        Self {
            word: Arc::new(AtomicU64::new(initial.pack())),
        }
    }

    /// Reads stage and tick together.
    #[inline]
    #[must_use]
    pub fn current(&self) -> StageToken {
        StageToken::unpack(self.word.load(Ordering::Acquire))
    }

    /// Current stage.
    #[inline]
    #[must_use]
    pub fn stage(&self) -> TickStage {
        self.current().stage
    }

    /// Current tick number.
    #[inline]
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.current().tick
    }

    pub(crate) fn set(&self, token: StageToken) {
        self.word.store(token.pack(), Ordering::Release);
    }

    /// Fails unless the current stage permits mutation of live state.
    ///
    /// # Errors
    ///
    /// [`CoreError::StageViolation`] outside `Tasks`/`Stage1`/`Stage2`/`Finalize`.
    pub fn require_mutation(&self, operation: &'static str) -> CoreResult<()> {
        let stage = self.stage();
        if stage.access() == StageAccess::Mutate {
            return Ok(());
        }
        tracing::error!("{} attempted during {}", operation, stage);
        Err(CoreError::StageViolation { operation, stage })
    }

    /// Fails unless the clock is exactly at `expected`.
    ///
    /// # Errors
    ///
    /// [`CoreError::StageViolation`] naming the actual stage.
    pub fn require_stage(&self, expected: TickStage, operation: &'static str) -> CoreResult<()> {
        let stage = self.stage();
        if stage == expected {
            return Ok(());
        }
        tracing::error!("{} requires {}, clock is at {}", operation, expected, stage);
        Err(CoreError::StageViolation { operation, stage })
    }

    /// Returns true if the clock is at `stage` of tick `sequence`.
    #[must_use]
    pub fn check_sequence(&self, stage: TickStage, sequence: u64) -> bool {
        let now = self.current();
        now.stage == stage && now.tick == sequence
    }

    /// Like [`check_sequence`](Self::check_sequence) but reports the mismatch.
    ///
    /// # Errors
    ///
    /// [`CoreError::SequenceMismatch`] if the caller is out of step.
    pub fn verify_sequence(&self, stage: TickStage, sequence: u64) -> CoreResult<()> {
        let now = self.current();
        if now.stage == stage && now.tick == sequence {
            return Ok(());
        }
        tracing::error!(
            "sequence check failed: expected {}#{}, clock at {}#{}",
            stage,
            sequence,
            now.stage,
            now.tick
        );
        Err(CoreError::SequenceMismatch {
            expected_stage: stage,
            expected_sequence: sequence,
            actual_stage: now.stage,
            actual_sequence: now.tick,
        })
    }
}

impl Default for StageClock {
    fn default() -> Self {
        Self::new()
    }
}
