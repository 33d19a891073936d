//! Error types of the core crate.
use thiserror::Error;

/// Errors raised by the core abstractions.
#[derive(Debug, Error)]
pub enum UapNavError {
    /// A record does not contain the requested key.
    #[error("Record does not have the key {0}")]
    RecordKey(String),

    /// A record value has a different type than requested.
    #[error("Record value cannot be accessed as {0}")]
    RecordValueType(String),

    /// `insert` was called on a rollout buffer whose horizon is exhausted.
    #[error("Rollout buffer is full (horizon = {0})")]
    BufferFull(usize),

    /// A per-environment field does not match the buffer's environment count.
    #[error("{field} has length {got}, expected {expected}")]
    LengthMismatch {
        /// Name of the offending field.
        field: &'static str,
        /// Expected number of environments.
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// The buffer is read before the corresponding slot was written.
    #[error("Rollout slot {0} has not been written")]
    EmptySlot(usize),

    /// An episode finished without emitting a metric the caller requires.
    #[error("Episode metrics are missing {0}")]
    MissingMetric(String),
}
