//! # Core Error Types
//!
//! Sequencing violations raised by the synchronization substrate.
//!
//! Every variant here is a programming error: the caller invoked an
//! operation from the wrong stage, started a driver twice, or asked for a
//! commit while readers may still be running. None of them are retried.

use thiserror::Error;

use crate::sync::TickStage;

/// Errors raised by the core synchronization primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A driver was started while it was already running.
    #[error("attempt was made to start the {what} twice")]
    AlreadyRunning {
        /// Which driver.
        what: &'static str,
    },

    /// A driver was started after it had been stopped.
    #[error("the {what} has been stopped and cannot be restarted")]
    DriverStopped {
        /// Which driver.
        what: &'static str,
    },

    /// A live value or live world mutation outside a mutation stage.
    #[error("{operation} is not permitted during stage {stage}")]
    StageViolation {
        /// The rejected operation.
        operation: &'static str,
        /// The stage the clock was in.
        stage: TickStage,
    },

    /// A snapshot commit was requested outside `CopySnapshot`.
    #[error("snapshot commit requested during stage {stage}, only CopySnapshot may commit")]
    CommitOutsideCopySnapshot {
        /// The stage the clock was in.
        stage: TickStage,
    },

    /// A caller's declared stage/sequence does not match the clock.
    #[error(
        "sequence mismatch: caller expected {expected_stage}#{expected_sequence}, \
         clock is at {actual_stage}#{actual_sequence}"
    )]
    SequenceMismatch {
        /// Stage declared by the caller.
        expected_stage: TickStage,
        /// Sequence declared by the caller.
        expected_sequence: u64,
        /// Authoritative stage.
        actual_stage: TickStage,
        /// Authoritative sequence.
        actual_sequence: u64,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
