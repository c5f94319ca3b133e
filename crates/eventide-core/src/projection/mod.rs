//! Projections: materialized views folded from event slices.
//!
//! A projection is defined by implementing [`Projection`] plus either
//! [`SingleStreamProjection`] (one event-type set and one identifier filter)
//! or [`MultiStreamProjection`] (several independent stream definitions). The
//! matching engine, [`ProjectionEngine`] or [`MultiStreamProjectionEngine`],
//! loads the saved checkpoint and the events after it on first use, merges
//! staged events, and hands the ordered slice to [`Projection::view`] as a
//! [`Replay`].

mod engine;
#[cfg(test)]
mod mocks;
mod multi_stream;

use std::collections::HashSet;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;
use crate::event::{EventId, NewEvent, StoredEvent};
use crate::filter::{DataFilter, StreamDefinition};
use crate::repository::ProjectionRecord;

pub use engine::ProjectionEngine;
pub use multi_stream::MultiStreamProjectionEngine;

/// Identity and view construction shared by every projection.
pub trait Projection: Send + Sync {
    /// The materialized view. Serialized as the stored projection's `data`.
    type View: Serialize + DeserializeOwned + Send + Sync;

    /// Projection kind, the first half of the storage key.
    fn projection_type(&self) -> &str;

    /// Entity identifier, the second half of the storage key.
    fn id(&self) -> &str;

    /// Builds the view by folding `replay`. Must not perform I/O.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if an event payload cannot be
    /// decoded.
    fn view(&self, replay: &Replay<'_, Self::View>) -> Result<Self::View, StoreError>;
}

/// A projection over a single event-type set filtered by one identifier.
pub trait SingleStreamProjection: Projection {
    /// Event types required to rebuild the view.
    fn event_types(&self) -> Vec<String>;

    /// Payload filter selecting this entity's events, typically
    /// `{foreignKey: entityId}`.
    fn identifier(&self) -> DataFilter;
}

/// A projection reducing over several independently filtered streams that
/// share one checkpoint.
pub trait MultiStreamProjection: Projection {
    /// The streams whose union forms the fold slice.
    fn streams(&self) -> Vec<StreamDefinition>;
}

/// A previously checkpointed view.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedView<V> {
    /// The decoded view.
    pub view: V,
    /// Id of the last event folded into `view`.
    pub latest_event_id: EventId,
}

impl<V: DeserializeOwned> SavedView<V> {
    /// Decodes a stored row.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if `data` does not match `V`.
    pub fn decode(record: ProjectionRecord) -> Result<Self, StoreError> {
        Ok(Self {
            view: serde_json::from_value(record.data)?,
            latest_event_id: record.latest_event_id,
        })
    }
}

/// One element of a fold slice: a durable event or a staged one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionEvent<'a> {
    /// Read from the event store.
    Stored(&'a StoredEvent),
    /// Staged through `apply`; may not have an id yet.
    Staged(&'a NewEvent),
}

impl<'a> ProjectionEvent<'a> {
    /// The event id, if it has one.
    #[must_use]
    pub fn id(&self) -> Option<&'a EventId> {
        match self {
            Self::Stored(event) => Some(&event.id),
            Self::Staged(event) => event.id.as_ref(),
        }
    }

    /// The event type.
    #[must_use]
    pub fn event_type(&self) -> &'a str {
        match self {
            Self::Stored(event) => &event.event_type,
            Self::Staged(event) => &event.event_type,
        }
    }

    /// The raw payload.
    #[must_use]
    pub fn data(&self) -> &'a Value {
        match self {
            Self::Stored(event) => &event.data,
            Self::Staged(event) => &event.data,
        }
    }

    /// Deserializes the payload.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(T::deserialize(self.data())?)
    }

    // Events without an id sort as the empty string.
    fn sort_key(&self) -> &'a str {
        self.id().map_or("", EventId::as_str)
    }
}

/// The ordered fold slice handed to [`Projection::view`].
#[derive(Debug)]
pub struct Replay<'a, V> {
    events: Vec<ProjectionEvent<'a>>,
    saved: Option<&'a SavedView<V>>,
}

impl<'a, V> Replay<'a, V> {
    /// Merges fetched history with staged events, ascending by id.
    ///
    /// A staged event whose id already appears in `history` is folded once.
    #[must_use]
    pub fn new(
        history: &'a [StoredEvent],
        staged: &'a [NewEvent],
        saved: Option<&'a SavedView<V>>,
    ) -> Self {
        let known: HashSet<&EventId> = history.iter().map(|e| &e.id).collect();
        let mut events: Vec<ProjectionEvent<'a>> = history
            .iter()
            .map(ProjectionEvent::Stored)
            .chain(
                staged
                    .iter()
                    .filter(|e| e.id.as_ref().is_none_or(|id| !known.contains(id)))
                    .map(ProjectionEvent::Staged),
            )
            .collect();
        events.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
        Self { events, saved }
    }

    /// The ordered slice.
    #[must_use]
    pub fn events(&self) -> &[ProjectionEvent<'a>] {
        &self.events
    }

    /// Number of events in the slice.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` when nothing happened since the checkpoint.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Id of the last event in the slice.
    #[must_use]
    pub fn last_event_id(&self) -> Option<&'a EventId> {
        self.events.last().and_then(ProjectionEvent::id)
    }

    /// The previously saved view, if one was loaded.
    #[must_use]
    pub fn saved(&self) -> Option<&'a V> {
        self.saved.map(|s| &s.view)
    }

    /// Folds the slice with a pure reducer.
    pub fn reduce_events<T, F>(&self, reducer: F, initial: T) -> T
    where
        F: FnMut(T, &ProjectionEvent<'a>) -> T,
    {
        self.events.iter().fold(initial, reducer)
    }

    /// Folds the slice with a reducer that may reject an event.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `reducer`.
    pub fn try_reduce_events<T, E, F>(&self, reducer: F, initial: T) -> Result<T, E>
    where
        F: FnMut(T, &ProjectionEvent<'a>) -> Result<T, E>,
    {
        self.events.iter().try_fold(initial, reducer)
    }

    /// Reads a value from the saved view, or returns `fallback` when the
    /// projection was never materialized.
    pub fn from_projection_or_default<T>(&self, read: impl FnOnce(&V) -> T, fallback: T) -> T {
        self.saved().map_or(fallback, read)
    }
}
