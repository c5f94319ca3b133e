//! Event and projection repository abstractions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::event::{EventId, NewEvent, StoredEvent};
use crate::filter::{DataFilter, ReadOptions, StreamDefinition};

/// Append-only event log.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Inserts one event, assigning an id if absent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Write` on constraint violation (e.g. a duplicate
    /// caller-supplied id) or connectivity failure.
    async fn append(&self, event: NewEvent) -> Result<StoredEvent, StoreError>;

    /// Inserts all events atomically, assigning each a fresh id in input
    /// order. Caller-supplied ids are replaced.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Write` if any row is rejected; none are persisted.
    async fn append_batch(&self, events: Vec<NewEvent>) -> Result<Vec<StoredEvent>, StoreError>;

    /// Returns the oldest event of `event_type` after `options.after` that
    /// matches `options.data`.
    ///
    /// Despite the name this is the earliest event past the cursor, not the
    /// most recent one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Infrastructure` if the read fails.
    async fn latest(
        &self,
        event_type: &str,
        options: &ReadOptions,
    ) -> Result<Option<StoredEvent>, StoreError>;

    /// Returns every event whose type is in `types` and which `options`
    /// admits, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Infrastructure` if the read fails.
    async fn read_stream(
        &self,
        types: &[&str],
        options: &ReadOptions,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    /// Returns the de-duplicated union of all `streams` after `after`,
    /// ascending by id. A stream's own cursor, when set, further narrows its
    /// slice.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Infrastructure` if any read fails.
    async fn read_streams(
        &self,
        streams: &[StreamDefinition],
        after: Option<&EventId>,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let mut slices = Vec::with_capacity(streams.len());
        for stream in streams {
            let options = stream.read_options(after);
            slices.push(self.read_stream(&stream.type_refs(), &options).await?);
        }
        Ok(merge_streams(slices))
    }

    /// Appends `event` only if no event in any of `streams` has an id greater
    /// than `since`. The check and the insert are one atomic unit.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConcurrencyConflict` if any stream advanced; the
    /// event is not persisted. Returns `StoreError::Write` if the insert
    /// itself is rejected.
    async fn append_with_stream_validation(
        &self,
        event: NewEvent,
        since: &EventId,
        streams: &[StreamDefinition],
    ) -> Result<StoredEvent, StoreError>;
}

/// Unions event slices, keeping one event per id (the last one seen), sorted
/// ascending by id.
#[must_use]
pub fn merge_streams<I>(slices: I) -> Vec<StoredEvent>
where
    I: IntoIterator<Item = Vec<StoredEvent>>,
{
    let mut by_id = BTreeMap::new();
    for event in slices.into_iter().flatten() {
        by_id.insert(event.id.clone(), event);
    }
    by_id.into_values().collect()
}

/// Outcome of a conditional projection write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    /// No row existed; one was inserted.
    Created,
    /// A row existed and the incoming checkpoint did not regress it.
    Updated,
    /// A row existed with a newer checkpoint; nothing changed.
    Skipped,
}

impl SaveStatus {
    /// Returns the lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaveStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "skipped" => Ok(Self::Skipped),
            other => Err(StoreError::Infrastructure(format!(
                "unknown projection save status: {other}"
            ))),
        }
    }
}

/// A stored projection row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionRecord {
    /// The view payload.
    pub data: serde_json::Value,
    /// Id of the last event folded into `data`.
    pub latest_event_id: EventId,
}

/// Result of [`ProjectionRepository::save`].
///
/// On `Skipped`, `data` and `latest_event_id` are the values already stored,
/// not the ones proposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProjection {
    /// What the write did.
    pub status: SaveStatus,
    /// Projection kind.
    #[serde(rename = "type")]
    pub projection_type: String,
    /// Entity identifier.
    pub id: String,
    /// The stored view payload after the write.
    pub data: serde_json::Value,
    /// The stored checkpoint after the write.
    pub latest_event_id: EventId,
}

/// Materialized-view cache keyed by (projection type, entity id).
#[async_trait]
pub trait ProjectionRepository: Send + Sync {
    /// Inserts the projection, or overwrites it when `latest_event_id` is not
    /// older than the stored checkpoint. One atomic conditional upsert.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Write` if the write fails.
    async fn save(
        &self,
        projection_type: &str,
        id: &str,
        data: serde_json::Value,
        latest_event_id: &EventId,
    ) -> Result<SavedProjection, StoreError>;

    /// Loads one projection.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Infrastructure` if the read fails.
    async fn get(
        &self,
        projection_type: &str,
        id: &str,
    ) -> Result<Option<ProjectionRecord>, StoreError>;

    /// Returns every projection of `projection_type` whose data matches
    /// `filter`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Infrastructure` if the read fails.
    async fn query(
        &self,
        projection_type: &str,
        filter: &DataFilter,
    ) -> Result<Vec<ProjectionRecord>, StoreError>;
}

/// The pair of repositories a projection engine reads from and writes to.
#[derive(Clone)]
pub struct Repositories {
    /// Event log.
    pub events: Arc<dyn EventRepository>,
    /// Projection cache.
    pub projections: Arc<dyn ProjectionRepository>,
}

impl Repositories {
    /// Bundles two repositories.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventRepository>,
        projections: Arc<dyn ProjectionRepository>,
    ) -> Self {
        Self {
            events,
            projections,
        }
    }
}

impl fmt::Debug for Repositories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
