//! Domain events for todo lists.

use eventide_core::error::StoreError;
use eventide_core::event::NewEvent;
use eventide_core::filter::{DataFilter, StreamDefinition};
use eventide_core::projection::ProjectionEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type for [`ListCreated`].
pub const LIST_CREATED: &str = "LIST_CREATED";
/// Event type for [`ListDeleted`].
pub const LIST_DELETED: &str = "LIST_DELETED";
/// Event type for [`ItemAdded`].
pub const ITEM_ADDED: &str = "ITEM_ADDED";
/// Event type for [`ItemRemoved`].
pub const ITEM_REMOVED: &str = "ITEM_REMOVED";
/// Event type for [`ItemCompleted`].
pub const ITEM_COMPLETED: &str = "ITEM_COMPLETED";
/// Event type for [`ItemUncompleted`].
pub const ITEM_UNCOMPLETED: &str = "ITEM_UNCOMPLETED";

/// Events that change a list's lifecycle.
pub const LIST_EVENT_TYPES: [&str; 2] = [LIST_CREATED, LIST_DELETED];

/// Events that change a list's items.
pub const ITEM_EVENT_TYPES: [&str; 4] = [ITEM_ADDED, ITEM_REMOVED, ITEM_COMPLETED, ITEM_UNCOMPLETED];

/// Emitted when a list is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCreated {
    /// The list identifier.
    pub list_id: Uuid,
    /// Display name.
    pub list_name: String,
}

/// Emitted when a list is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDeleted {
    /// The list identifier.
    pub list_id: Uuid,
}

/// Emitted when an item is added to a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAdded {
    /// The list identifier.
    pub list_id: Uuid,
    /// The item identifier.
    pub item_id: Uuid,
    /// Display name.
    pub item_name: String,
}

/// Emitted when an item is removed from a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRemoved {
    /// The list identifier.
    pub list_id: Uuid,
    /// The item identifier.
    pub item_id: Uuid,
}

/// Emitted when an item is checked off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCompleted {
    /// The list identifier.
    pub list_id: Uuid,
    /// The item identifier.
    pub item_id: Uuid,
}

/// Emitted when a completed item is reopened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUncompleted {
    /// The list identifier.
    pub list_id: Uuid,
    /// The item identifier.
    pub item_id: Uuid,
}

/// Every event the todo domain emits.
#[derive(Debug, Clone, PartialEq)]
pub enum TodoEvent {
    /// A list has been created.
    ListCreated(ListCreated),
    /// A list has been deleted.
    ListDeleted(ListDeleted),
    /// An item has been added.
    ItemAdded(ItemAdded),
    /// An item has been removed.
    ItemRemoved(ItemRemoved),
    /// An item has been completed.
    ItemCompleted(ItemCompleted),
    /// An item has been uncompleted.
    ItemUncompleted(ItemUncompleted),
}

impl TodoEvent {
    /// The stored event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ListCreated(_) => LIST_CREATED,
            Self::ListDeleted(_) => LIST_DELETED,
            Self::ItemAdded(_) => ITEM_ADDED,
            Self::ItemRemoved(_) => ITEM_REMOVED,
            Self::ItemCompleted(_) => ITEM_COMPLETED,
            Self::ItemUncompleted(_) => ITEM_UNCOMPLETED,
        }
    }

    /// The list the event belongs to.
    #[must_use]
    pub fn list_id(&self) -> Uuid {
        match self {
            Self::ListCreated(e) => e.list_id,
            Self::ListDeleted(e) => e.list_id,
            Self::ItemAdded(e) => e.list_id,
            Self::ItemRemoved(e) => e.list_id,
            Self::ItemCompleted(e) => e.list_id,
            Self::ItemUncompleted(e) => e.list_id,
        }
    }

    /// Converts to an unpersisted store event.
    ///
    /// # Panics
    ///
    /// Never in practice: serializing these derived payloads cannot fail.
    #[must_use]
    pub fn to_new_event(&self) -> NewEvent {
        // Serialization of derived Serialize types to Value is infallible.
        let data = match self {
            Self::ListCreated(e) => serde_json::to_value(e),
            Self::ListDeleted(e) => serde_json::to_value(e),
            Self::ItemAdded(e) => serde_json::to_value(e),
            Self::ItemRemoved(e) => serde_json::to_value(e),
            Self::ItemCompleted(e) => serde_json::to_value(e),
            Self::ItemUncompleted(e) => serde_json::to_value(e),
        }
        .expect("todo event serialization is infallible");
        NewEvent::new(self.event_type(), data)
    }

    /// Decodes a stored or staged event. Types outside the todo domain
    /// yield `None`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if a todo event's payload is
    /// malformed.
    pub fn decode(event: &ProjectionEvent<'_>) -> Result<Option<Self>, StoreError> {
        let decoded = match event.event_type() {
            LIST_CREATED => Self::ListCreated(event.decode()?),
            LIST_DELETED => Self::ListDeleted(event.decode()?),
            ITEM_ADDED => Self::ItemAdded(event.decode()?),
            ITEM_REMOVED => Self::ItemRemoved(event.decode()?),
            ITEM_COMPLETED => Self::ItemCompleted(event.decode()?),
            ITEM_UNCOMPLETED => Self::ItemUncompleted(event.decode()?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }
}

/// The identifier filter selecting one list's events.
#[must_use]
pub fn list_identifier(list_id: Uuid) -> DataFilter {
    DataFilter::new().equals("listId", list_id)
}

/// The lifecycle stream of one list.
#[must_use]
pub fn list_stream(list_id: Uuid) -> StreamDefinition {
    StreamDefinition::new(LIST_EVENT_TYPES, list_identifier(list_id))
}

/// The item stream of one list.
#[must_use]
pub fn item_stream(list_id: Uuid) -> StreamDefinition {
    StreamDefinition::new(ITEM_EVENT_TYPES, list_identifier(list_id))
}
