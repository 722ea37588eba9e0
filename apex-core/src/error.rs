//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
///
/// [`ApexError::InsufficientData`] and [`ApexError::StaleIndex`] are recoverable:
/// the learner skips the iteration or drops the update. The other variants are
/// returned to the caller as they are.
#[derive(Error, Debug)]
pub enum ApexError {
    /// The replay buffer was configured with zero capacity.
    #[error("Capacity of the replay buffer must be positive, got {0}")]
    InvalidCapacity(usize),

    /// Sampling asked for more items than the buffer holds.
    #[error("Cannot sample {requested} items from a buffer holding {available}")]
    InsufficientData {
        /// Requested batch size.
        requested: usize,
        /// Number of live entries.
        available: usize,
    },

    /// A priority update targeted a slot overwritten since it was sampled.
    #[error("Slot {slot} no longer holds the entry of generation {generation}")]
    StaleIndex {
        /// Slot in the circular buffer.
        slot: usize,
        /// Generation held by the caller.
        generation: u64,
    },

    /// A priority was negative, NaN or infinite.
    #[error("Priority must be finite and non-negative, got {0}")]
    InvalidPriority(f32),

    /// A loss or target value was not finite.
    #[error("Numeric instability: {0}")]
    NumericInstability(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A transition does not match the action space.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Parameters cannot be copied between these roles.
    #[error("Cannot copy parameters from {from} to {to}")]
    InvalidSync {
        /// Source role.
        from: String,
        /// Destination role.
        to: String,
    },

    /// Parameter sets do not share names or shapes.
    #[error("Parameter mismatch: {0}")]
    ParameterMismatch(String),

    /// A thread panicked while holding a lock.
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// Failure inside a model or environment.
    #[error(transparent)]
    Model(#[from] anyhow::Error),
}

impl ApexError {
    /// Returns `true` if the caller may skip the operation and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ApexError::InsufficientData { .. } | ApexError::StaleIndex { .. }
        )
    }
}
