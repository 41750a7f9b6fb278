//! Error types for the AI state machine framework.
//!
//! Behavioural failure never surfaces here: states report it through
//! [`StateStatus::Failure`](crate::machine::StateStatus::Failure). These
//! errors cover API misuse, bad configuration and corrupt snapshots.

use thiserror::Error;

/// Result type alias using [`AiError`].
pub type Result<T> = std::result::Result<T, AiError>;

/// Top-level error type for the AI framework.
#[derive(Debug, Error)]
pub enum AiError {
    /// A state id that the machine never defined.
    #[error("Unknown state {state} in machine '{machine}'")]
    UnknownState {
        /// Machine name.
        machine: &'static str,
        /// Debug rendering of the offending id.
        state: String,
    },

    /// A transition table entry points at a state that does not exist.
    #[error("State {from} in machine '{machine}' transitions to unknown state {target}")]
    UnknownTransitionTarget {
        /// Machine name.
        machine: &'static str,
        /// State owning the entry.
        from: String,
        /// Missing target.
        target: String,
    },

    /// The same state id was defined twice.
    #[error("State {state} defined twice in machine '{machine}'")]
    DuplicateState {
        /// Machine name.
        machine: &'static str,
        /// Duplicated id.
        state: String,
    },

    /// A state change was rejected because the machine is locked.
    #[error("Machine '{machine}' is locked ({reason})")]
    MachineLocked {
        /// Machine name.
        machine: &'static str,
        /// Reason given by the innermost lock holder.
        reason: String,
    },

    /// The machine was halted and accepts no further changes.
    #[error("Machine '{0}' has been halted")]
    MachineHalted(&'static str),

    /// `init_default_state` was called more than once.
    #[error("Default state of machine '{0}' was already initialized")]
    DefaultStateAlreadyInitialized(&'static str),

    /// The machine has no states at all.
    #[error("Machine '{0}' has no default state")]
    NoDefaultState(&'static str),

    /// A temporary state request that cannot be honoured.
    #[error("Invalid temporary state {state} for machine '{machine}': {message}")]
    InvalidTemporaryState {
        /// Machine name.
        machine: &'static str,
        /// Requested id.
        state: String,
        /// Why it was refused.
        message: String,
    },

    /// Snapshot encoding or decoding failed.
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// A snapshot was written by a newer format than this build understands.
    #[error("Snapshot version mismatch in {context}: found {found}, newest supported {current}")]
    VersionMismatch {
        /// Which block was being read.
        context: &'static str,
        /// Version found in the data.
        found: u8,
        /// Newest version this build reads.
        current: u8,
    },

    /// Bytes were left over after a snapshot was fully read.
    #[error("Snapshot has {0} trailing bytes")]
    TrailingSnapshotData(usize),

    /// A tuning value is out of range.
    #[error("Invalid AI tuning: {0}")]
    Config(String),

    /// A tuning file could not be parsed.
    #[error("Failed to parse AI tuning '{path}': {message}")]
    ConfigParse {
        /// Source of the data.
        path: String,
        /// Parser message.
        message: String,
    },
}

impl From<bincode::Error> for AiError {
    fn from(err: bincode::Error) -> Self {
        Self::Snapshot(err.to_string())
    }
}
