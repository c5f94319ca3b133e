use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::error::StoreError;
use crate::event::{EventId, NewEvent, StoredEvent};
use crate::filter::{DataFilter, ReadOptions, StreamDefinition};
use crate::repository::{
    EventRepository, ProjectionRecord, ProjectionRepository, SaveStatus, SavedProjection,
};

pub(super) fn stored(id: &str, event_type: &str, data: Value) -> StoredEvent {
    let now = Utc::now();
    StoredEvent {
        id: EventId::new(id),
        event_type: event_type.to_owned(),
        data,
        created_at: now,
        updated_at: now,
    }
}

/// Fixed history that counts stream reads.
#[derive(Default)]
pub(super) struct MockEvents {
    events: Vec<StoredEvent>,
    pub(super) reads: AtomicUsize,
    pub(super) appends: AtomicUsize,
    pub(super) last_after: Mutex<Option<EventId>>,
}

impl MockEvents {
    pub(super) fn with(events: Vec<StoredEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }
}

#[async_trait]
impl EventRepository for MockEvents {
    async fn append(&self, _event: NewEvent) -> Result<StoredEvent, StoreError> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Write("mock is read-only".into()))
    }

    async fn append_batch(&self, _events: Vec<NewEvent>) -> Result<Vec<StoredEvent>, StoreError> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Write("mock is read-only".into()))
    }

    async fn latest(
        &self,
        event_type: &str,
        options: &ReadOptions,
    ) -> Result<Option<StoredEvent>, StoreError> {
        Ok(self.read_stream(&[event_type], options).await?.into_iter().next())
    }

    async fn read_stream(
        &self,
        types: &[&str],
        options: &ReadOptions,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        *self.last_after.lock().unwrap() = options.after.clone();
        Ok(self
            .events
            .iter()
            .filter(|e| types.contains(&e.event_type.as_str()) && options.admits(e))
            .cloned()
            .collect())
    }

    async fn append_with_stream_validation(
        &self,
        event: NewEvent,
        _since: &EventId,
        _streams: &[StreamDefinition],
    ) -> Result<StoredEvent, StoreError> {
        self.append(event).await
    }
}

/// Projection map that counts reads and writes.
#[derive(Default)]
pub(super) struct MockProjections {
    rows: Mutex<HashMap<(String, String), ProjectionRecord>>,
    pub(super) reads: AtomicUsize,
    pub(super) writes: AtomicUsize,
}

impl MockProjections {
    pub(super) fn insert(&self, projection_type: &str, id: &str, data: Value, latest: &str) {
        self.rows.lock().unwrap().insert(
            (projection_type.to_owned(), id.to_owned()),
            ProjectionRecord {
                data,
                latest_event_id: EventId::new(latest),
            },
        );
    }
}

#[async_trait]
impl ProjectionRepository for MockProjections {
    async fn save(
        &self,
        projection_type: &str,
        id: &str,
        data: Value,
        latest_event_id: &EventId,
    ) -> Result<SavedProjection, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let record = ProjectionRecord {
            data,
            latest_event_id: latest_event_id.clone(),
        };
        let status = match self
            .rows
            .lock()
            .unwrap()
            .insert((projection_type.to_owned(), id.to_owned()), record.clone())
        {
            Some(_) => SaveStatus::Updated,
            None => SaveStatus::Created,
        };
        Ok(SavedProjection {
            status,
            projection_type: projection_type.to_owned(),
            id: id.to_owned(),
            data: record.data,
            latest_event_id: record.latest_event_id,
        })
    }

    async fn get(
        &self,
        projection_type: &str,
        id: &str,
    ) -> Result<Option<ProjectionRecord>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(projection_type.to_owned(), id.to_owned()))
            .cloned())
    }

    async fn query(
        &self,
        _projection_type: &str,
        _filter: &DataFilter,
    ) -> Result<Vec<ProjectionRecord>, StoreError> {
        Ok(Vec::new())
    }
}
