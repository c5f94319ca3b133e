//! Event data model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::StoreError;

/// Sortable unique event identifier.
///
/// Ordering is plain byte-wise string ordering, which matches creation order
/// for ids issued by [`IdGenerator`](crate::id::IdGenerator).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id and returns the underlying string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EventId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Ulid> for EventId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// An event that has not been appended yet.
///
/// `id` is normally left empty so the store assigns one; a caller-supplied id
/// that collides with an existing row is rejected as a write error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Optional caller-supplied identifier.
    pub id: Option<EventId>,
    /// Discriminant identifying the event's shape.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload.
    pub data: serde_json::Value,
}

impl NewEvent {
    /// Creates an event without an id.
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: None,
            event_type: event_type.into(),
            data,
        }
    }

    /// Sets a caller-supplied id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<EventId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// An event as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    /// Store-assigned or caller-supplied identifier.
    pub id: EventId,
    /// Discriminant identifying the event's shape.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload.
    pub data: serde_json::Value,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Equal to `created_at`; events are never updated.
    pub updated_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Deserializes the payload into a typed structure.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

impl From<StoredEvent> for NewEvent {
    fn from(event: StoredEvent) -> Self {
        Self {
            id: Some(event.id),
            event_type: event.event_type,
            data: event.data,
        }
    }
}
