//! Error taxonomy shared by the event store, projection store, and engines.

use thiserror::Error;

use crate::event::EventId;

/// Top-level error type for every storage and projection operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected an append (constraint violation,
    /// connectivity failure). Not retried.
    #[error("write rejected: {0}")]
    Write(String),

    /// A stream referenced by a validated append advanced past the caller's
    /// expected version. The append had no durable effect.
    #[error("concurrent modification detected: newer events exist in one or more streams since {since}")]
    ConcurrencyConflict {
        /// The event id the caller believed every stream was at.
        since: EventId,
    },

    /// A projection checkpoint was requested while staged events lack ids.
    #[error("cannot save projection {projection_type}/{id}: {count} staged events are not persisted")]
    UnpersistedEvents {
        /// The projection type.
        projection_type: String,
        /// The entity identifier.
        id: String,
        /// Number of staged events without an id.
        count: usize,
    },

    /// A projection checkpoint was requested with nothing to fold.
    #[error("cannot save projection {projection_type}/{id}: no events to save")]
    EmptyEvents {
        /// The projection type.
        projection_type: String,
        /// The entity identifier.
        id: String,
    },

    /// The monotonic generator exhausted its random component within one
    /// millisecond.
    #[error("event id generation failed: {0}")]
    IdGeneration(String),

    /// A payload or view could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A read against the backing store failed.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl StoreError {
    /// Returns `true` for the optimistic-concurrency signal, the one failure a
    /// caller may resolve by re-reading and retrying.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
