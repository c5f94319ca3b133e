//! Todo domain error types.

use eventide_core::error::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by todo command and query handlers.
#[derive(Debug, Error)]
pub enum TodoError {
    /// A command carried invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// A list with this identifier already exists.
    #[error("todo list already exists: {0}")]
    ListExists(Uuid),

    /// No event exists for the list.
    #[error("todo list not found: {0}")]
    ListNotFound(Uuid),

    /// The list was deleted; it accepts no further changes.
    #[error("todo list {0} has been deleted")]
    ListDeleted(Uuid),

    /// The item is not on the list.
    #[error("item {item_id} not found on todo list {list_id}")]
    ItemNotFound {
        /// The list identifier.
        list_id: Uuid,
        /// The item identifier.
        item_id: Uuid,
    },

    /// The item is already on the list.
    #[error("item {item_id} already exists on todo list {list_id}")]
    ItemExists {
        /// The list identifier.
        list_id: Uuid,
        /// The item identifier.
        item_id: Uuid,
    },

    /// A storage operation failed, including optimistic-concurrency
    /// rejections.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TodoError {
    /// Returns `true` if the command lost a race and may be retried.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_conflict())
    }
}
