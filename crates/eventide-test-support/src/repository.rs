//! Test repositories — in-memory and failing implementations of the
//! repository traits.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eventide_core::clock::{Clock, SystemClock};
use eventide_core::error::StoreError;
use eventide_core::event::{EventId, NewEvent, StoredEvent};
use eventide_core::filter::{DataFilter, ReadOptions, StreamDefinition};
use eventide_core::id::IdGenerator;
use eventide_core::repository::{
    EventRepository, ProjectionRecord, ProjectionRepository, SaveStatus, SavedProjection,
};
use serde_json::Value;

/// An event log held in memory, ordered by id.
///
/// Every operation runs under one mutex, so the stream check and the insert
/// of `append_with_stream_validation` are atomic. Reads are counted for
/// memoization assertions.
pub struct InMemoryEventRepository {
    events: Mutex<BTreeMap<EventId, StoredEvent>>,
    clock: Arc<dyn Clock>,
    ids: Arc<IdGenerator>,
    reads: AtomicUsize,
}

impl InMemoryEventRepository {
    /// Creates an empty log driven by the system clock and the
    /// process-wide id generator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Mutex::new(BTreeMap::new()),
            clock: Arc::new(SystemClock),
            ids: IdGenerator::shared(),
            reads: AtomicUsize::new(0),
        }
    }

    /// Creates an empty log whose ids and timestamps come from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            events: Mutex::new(BTreeMap::new()),
            ids: Arc::new(IdGenerator::with_clock(clock.clone())),
            clock,
            reads: AtomicUsize::new(0),
        }
    }

    /// Returns a snapshot of every stored event, ascending by id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<StoredEvent> {
        self.events.lock().unwrap().values().cloned().collect()
    }

    /// Number of `read_stream` and `latest` calls served so far.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn stored(&self, id: EventId, event: NewEvent) -> StoredEvent {
        let now = self.clock.now();
        StoredEvent {
            id,
            event_type: event.event_type,
            data: event.data,
            created_at: now,
            updated_at: now,
        }
    }

    fn insert(
        log: &mut BTreeMap<EventId, StoredEvent>,
        event: StoredEvent,
    ) -> Result<StoredEvent, StoreError> {
        if log.contains_key(&event.id) {
            return Err(StoreError::Write(format!(
                "duplicate key value violates unique constraint: id {}",
                event.id
            )));
        }
        log.insert(event.id.clone(), event.clone());
        Ok(event)
    }
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryEventRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEventRepository")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn append(&self, event: NewEvent) -> Result<StoredEvent, StoreError> {
        let id = match event.id.clone() {
            Some(id) => id,
            None => self.ids.next_id()?,
        };
        let stored = self.stored(id, event);
        Self::insert(&mut self.events.lock().unwrap(), stored)
    }

    async fn append_batch(&self, events: Vec<NewEvent>) -> Result<Vec<StoredEvent>, StoreError> {
        let ids = self.ids.next_ids(events.len())?;
        let stored: Vec<StoredEvent> = events
            .into_iter()
            .zip(ids)
            .map(|(event, id)| self.stored(id, event))
            .collect();

        let mut log = self.events.lock().unwrap();
        if let Some(clash) = stored.iter().find(|e| log.contains_key(&e.id)) {
            return Err(StoreError::Write(format!(
                "duplicate key value violates unique constraint: id {}",
                clash.id
            )));
        }
        for event in &stored {
            log.insert(event.id.clone(), event.clone());
        }
        Ok(stored)
    }

    async fn latest(
        &self,
        event_type: &str,
        options: &ReadOptions,
    ) -> Result<Option<StoredEvent>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .events
            .lock()
            .unwrap()
            .values()
            .find(|e| e.event_type == event_type && options.admits(e))
            .cloned())
    }

    async fn read_stream(
        &self,
        types: &[&str],
        options: &ReadOptions,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| types.contains(&e.event_type.as_str()) && options.admits(e))
            .cloned()
            .collect())
    }

    async fn append_with_stream_validation(
        &self,
        event: NewEvent,
        since: &EventId,
        streams: &[StreamDefinition],
    ) -> Result<StoredEvent, StoreError> {
        let id = match event.id.clone() {
            Some(id) => id,
            None => self.ids.next_id()?,
        };
        let stored = self.stored(id, event);

        let mut log = self.events.lock().unwrap();
        let advanced = log
            .range((Bound::Excluded(since.clone()), Bound::Unbounded))
            .any(|(_, e)| streams.iter().any(|stream| stream.contains(e)));
        if advanced {
            return Err(StoreError::ConcurrencyConflict {
                since: since.clone(),
            });
        }
        Self::insert(&mut log, stored)
    }
}

/// A projection table held in memory with the same conditional-write rules
/// as the `PostgreSQL` store.
#[derive(Debug, Default)]
pub struct InMemoryProjectionRepository {
    rows: Mutex<HashMap<(String, String), ProjectionRecord>>,
    writes: AtomicUsize,
}

impl InMemoryProjectionRepository {
    /// Creates an empty projection table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls served so far, including skipped ones.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProjectionRepository for InMemoryProjectionRepository {
    async fn save(
        &self,
        projection_type: &str,
        id: &str,
        data: Value,
        latest_event_id: &EventId,
    ) -> Result<SavedProjection, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        let key = (projection_type.to_owned(), id.to_owned());

        let status = match rows.get(&key) {
            None => SaveStatus::Created,
            Some(current) if current.latest_event_id <= *latest_event_id => SaveStatus::Updated,
            Some(_) => SaveStatus::Skipped,
        };
        if status != SaveStatus::Skipped {
            rows.insert(
                key.clone(),
                ProjectionRecord {
                    data,
                    latest_event_id: latest_event_id.clone(),
                },
            );
        }
        let record = rows[&key].clone();

        Ok(SavedProjection {
            status,
            projection_type: key.0,
            id: key.1,
            data: record.data,
            latest_event_id: record.latest_event_id,
        })
    }

    async fn get(
        &self,
        projection_type: &str,
        id: &str,
    ) -> Result<Option<ProjectionRecord>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(projection_type.to_owned(), id.to_owned()))
            .cloned())
    }

    async fn query(
        &self,
        projection_type: &str,
        filter: &DataFilter,
    ) -> Result<Vec<ProjectionRecord>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut matches: Vec<(&String, &ProjectionRecord)> = rows
            .iter()
            .filter(|((kind, _), record)| kind == projection_type && filter.matches(&record.data))
            .map(|((_, id), record)| (id, record))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(b.0));
        Ok(matches.into_iter().map(|(_, record)| record.clone()).collect())
    }
}

/// An event repository that fails every call. Writes fail with
/// `StoreError::Write`, reads with `StoreError::Infrastructure`.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn append(&self, _event: NewEvent) -> Result<StoredEvent, StoreError> {
        Err(StoreError::Write("connection refused".into()))
    }

    async fn append_batch(&self, _events: Vec<NewEvent>) -> Result<Vec<StoredEvent>, StoreError> {
        Err(StoreError::Write("connection refused".into()))
    }

    async fn latest(
        &self,
        _event_type: &str,
        _options: &ReadOptions,
    ) -> Result<Option<StoredEvent>, StoreError> {
        Err(StoreError::Infrastructure("connection refused".into()))
    }

    async fn read_stream(
        &self,
        _types: &[&str],
        _options: &ReadOptions,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        Err(StoreError::Infrastructure("connection refused".into()))
    }

    async fn append_with_stream_validation(
        &self,
        _event: NewEvent,
        _since: &EventId,
        _streams: &[StreamDefinition],
    ) -> Result<StoredEvent, StoreError> {
        Err(StoreError::Write("connection refused".into()))
    }
}

/// A projection repository that fails every call.
#[derive(Debug)]
pub struct FailingProjectionRepository;

#[async_trait]
impl ProjectionRepository for FailingProjectionRepository {
    async fn save(
        &self,
        _projection_type: &str,
        _id: &str,
        _data: Value,
        _latest_event_id: &EventId,
    ) -> Result<SavedProjection, StoreError> {
        Err(StoreError::Write("connection refused".into()))
    }

    async fn get(
        &self,
        _projection_type: &str,
        _id: &str,
    ) -> Result<Option<ProjectionRecord>, StoreError> {
        Err(StoreError::Infrastructure("connection refused".into()))
    }

    async fn query(
        &self,
        _projection_type: &str,
        _filter: &DataFilter,
    ) -> Result<Vec<ProjectionRecord>, StoreError> {
        Err(StoreError::Infrastructure("connection refused".into()))
    }
}
