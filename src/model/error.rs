use thiserror::Error;

use crate::model::structures::entity::EntityId;

/// Foreground error taxonomy. Everything here is returned as a typed result
/// so the driver can present a retry path; only `Configuration` aborts
/// engine creation.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    /// The selection does not reference the presented group. The caller
    /// should discard it and request a new group.
    #[error("invalid outcome: {0}")]
    InvalidOutcome(String),

    /// Fewer entities available than the requested group size.
    #[error("insufficient population: {available} available, {required} required")]
    InsufficientPopulation { available: usize, required: usize },

    /// A rating update produced a non-finite value for this pair. The
    /// specific update was skipped; other updates in the batch still apply.
    #[error("numeric degenerate update for pair ({winner}, {loser})")]
    NumericDegenerate { winner: EntityId, loser: EntityId },

    /// Malformed configuration, rejected at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An outcome arrived while a previous one was still being resolved.
    #[error("outcome processing already in flight")]
    AlreadyResolving
}

impl EngineError {
    pub fn invalid_outcome(message: impl Into<String>) -> EngineError {
        EngineError::InvalidOutcome(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> EngineError {
        EngineError::Configuration(message.into())
    }
}

/// Background persistence failures. Logged and retried with backoff by the
/// flush scheduler; never surfaced into the selection/outcome path.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write state: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize state: {0}")]
    Serialization(#[from] serde_json::Error)
}
