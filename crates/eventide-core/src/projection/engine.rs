//! Single-stream projection engine and the replay state shared with the
//! multi-stream variant.

use std::future::Future;

use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{ProjectionEvent, Replay, SavedView, SingleStreamProjection};
use crate::error::StoreError;
use crate::event::{NewEvent, StoredEvent};
use crate::filter::{DataFilter, ReadOptions};
use crate::repository::{Repositories, SavedProjection};

/// Lazily resolved inputs of a replay plus locally staged events.
///
/// Every memo is resolved at most once; concurrent callers await the same
/// in-flight fetch.
pub(super) struct ReplayState<V> {
    pub(super) repositories: Repositories,
    load_existing: bool,
    saved: OnceCell<Option<SavedView<V>>>,
    history: OnceCell<Vec<StoredEvent>>,
    staged: Vec<NewEvent>,
}

impl<V: DeserializeOwned + Send + Sync> ReplayState<V> {
    pub(super) fn new(repositories: Repositories) -> Self {
        Self {
            repositories,
            load_existing: true,
            saved: OnceCell::new(),
            history: OnceCell::new(),
            staged: Vec::new(),
        }
    }

    pub(super) fn skip_saved(&mut self) {
        self.load_existing = false;
    }

    pub(super) fn stage(&mut self, events: impl IntoIterator<Item = NewEvent>) {
        self.staged.extend(events);
    }

    pub(super) fn replace_history(&mut self, events: Vec<StoredEvent>) {
        self.history = OnceCell::from(events);
    }

    pub(super) async fn saved(
        &self,
        projection_type: &str,
        id: &str,
    ) -> Result<Option<&SavedView<V>>, StoreError> {
        let saved = self
            .saved
            .get_or_try_init(|| self.load_saved(projection_type, id))
            .await?;
        Ok(saved.as_ref())
    }

    async fn load_saved(
        &self,
        projection_type: &str,
        id: &str,
    ) -> Result<Option<SavedView<V>>, StoreError> {
        if !self.load_existing {
            return Ok(None);
        }
        let record = self.repositories.projections.get(projection_type, id).await?;
        record.map(SavedView::decode).transpose()
    }

    pub(super) async fn history<F, Fut>(&self, fetch: F) -> Result<&[StoredEvent], StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<StoredEvent>, StoreError>>,
    {
        self.history.get_or_try_init(fetch).await.map(Vec::as_slice)
    }

    pub(super) fn replay<'a>(
        &'a self,
        history: &'a [StoredEvent],
        saved: Option<&'a SavedView<V>>,
    ) -> Replay<'a, V> {
        Replay::new(history, &self.staged, saved)
    }

    /// Rejects a checkpoint while any staged event lacks an id.
    pub(super) fn ensure_persisted(&self, projection_type: &str, id: &str) -> Result<(), StoreError> {
        let count = self.staged.iter().filter(|e| e.id.is_none()).count();
        if count > 0 {
            return Err(StoreError::UnpersistedEvents {
                projection_type: projection_type.to_owned(),
                id: id.to_owned(),
                count,
            });
        }
        Ok(())
    }

    /// Persists `view` with the last event id of `replay` as the checkpoint.
    pub(super) async fn checkpoint(
        &self,
        projection_type: &str,
        id: &str,
        replay: &Replay<'_, V>,
        view: &V,
    ) -> Result<SavedProjection, StoreError>
    where
        V: serde::Serialize,
    {
        if replay.is_empty() {
            return Err(StoreError::EmptyEvents {
                projection_type: projection_type.to_owned(),
                id: id.to_owned(),
            });
        }
        let latest_event_id = replay
            .last_event_id()
            .ok_or_else(|| StoreError::UnpersistedEvents {
                projection_type: projection_type.to_owned(),
                id: id.to_owned(),
                count: 1,
            })?;

        let data = serde_json::to_value(view)?;
        let saved = self
            .repositories
            .projections
            .save(projection_type, id, data, latest_event_id)
            .await?;
        debug!(
            projection_type,
            id,
            latest_event_id = %saved.latest_event_id,
            status = %saved.status,
            "checkpointed projection"
        );
        Ok(saved)
    }
}

/// Replays one event-type set, filtered by the projection's identifier, on
/// top of the last saved checkpoint.
///
/// Nothing is fetched on construction. The saved projection, the identifier,
/// and the event slice are each resolved on first use and memoized for the
/// engine's lifetime.
pub struct ProjectionEngine<P: SingleStreamProjection> {
    projection: P,
    identifier: OnceCell<DataFilter>,
    state: ReplayState<P::View>,
}

impl<P: SingleStreamProjection> ProjectionEngine<P> {
    /// Creates an engine that resumes from the saved projection, if any.
    #[must_use]
    pub fn new(projection: P, repositories: Repositories) -> Self {
        Self {
            projection,
            identifier: OnceCell::new(),
            state: ReplayState::new(repositories),
        }
    }

    /// Ignores any saved projection and replays the full stream.
    #[must_use]
    pub fn without_saved_projection(mut self) -> Self {
        self.state.skip_saved();
        self
    }

    /// The projection definition.
    pub fn projection(&self) -> &P {
        &self.projection
    }

    /// Stages events for folding without persisting them.
    pub fn apply(&mut self, events: impl IntoIterator<Item = NewEvent>) -> &mut Self {
        self.state.stage(events);
        self
    }

    /// Replaces the lazily loaded event slice, bypassing the store read.
    pub fn from_history(&mut self, events: Vec<StoredEvent>) -> &mut Self {
        self.state.replace_history(events);
        self
    }

    /// The previously saved view.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the projection read or decode fails.
    pub async fn saved_projection(&self) -> Result<Option<&SavedView<P::View>>, StoreError> {
        self.state
            .saved(self.projection.projection_type(), self.projection.id())
            .await
    }

    /// The memoized identifier filter.
    pub async fn identifier(&self) -> &DataFilter {
        self.identifier
            .get_or_init(|| async { self.projection.identifier() })
            .await
    }

    async fn history(&self) -> Result<&[StoredEvent], StoreError> {
        self.state.history(|| self.fetch_history()).await
    }

    async fn fetch_history(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let identifier = self.identifier().await.clone();
        let after = self
            .saved_projection()
            .await?
            .map(|saved| saved.latest_event_id.clone());
        let options = ReadOptions::with_data(identifier).after(after);
        let types = self.projection.event_types();
        let types: Vec<&str> = types.iter().map(String::as_str).collect();

        let events = self
            .state
            .repositories
            .events
            .read_stream(&types, &options)
            .await?;
        debug!(
            projection_type = self.projection.projection_type(),
            id = self.projection.id(),
            events = events.len(),
            "loaded projection history"
        );
        Ok(events)
    }

    /// The ordered fold slice: history after the checkpoint merged with
    /// staged events.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if a lazy fetch fails.
    pub async fn replay(&self) -> Result<Replay<'_, P::View>, StoreError> {
        let saved = self.saved_projection().await?;
        let history = self.history().await?;
        Ok(self.state.replay(history, saved))
    }

    /// Folds the slice with a pure reducer.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if a lazy fetch fails.
    pub async fn reduce_events<T, F>(&self, reducer: F, initial: T) -> Result<T, StoreError>
    where
        F: FnMut(T, &ProjectionEvent<'_>) -> T,
    {
        Ok(self.replay().await?.reduce_events(reducer, initial))
    }

    /// Reads a value from the saved view, or `fallback` if none exists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the projection read fails.
    pub async fn from_projection_or_default<T>(
        &self,
        read: impl FnOnce(&P::View) -> T,
        fallback: T,
    ) -> Result<T, StoreError> {
        Ok(self
            .saved_projection()
            .await?
            .map_or(fallback, |saved| read(&saved.view)))
    }

    /// Builds the current view.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if a lazy fetch or the fold fails.
    pub async fn view(&self) -> Result<P::View, StoreError> {
        let replay = self.replay().await?;
        self.projection.view(&replay)
    }

    /// Persists the current view, checkpointed at the last folded event.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnpersistedEvents` if a staged event has no id,
    /// `StoreError::EmptyEvents` if there is nothing to fold, or the
    /// underlying read/write error.
    pub async fn save_projection(&self) -> Result<SavedProjection, StoreError> {
        let (projection_type, id) = (self.projection.projection_type(), self.projection.id());
        self.state.ensure_persisted(projection_type, id)?;
        let replay = self.replay().await?;
        let view = self.projection.view(&replay)?;
        self.state.checkpoint(projection_type, id, &replay, &view).await
    }

    /// Persists `view`, already built from this engine's replay, without
    /// folding again.
    ///
    /// # Errors
    ///
    /// Same as [`Self::save_projection`].
    pub async fn save_view(&self, view: &P::View) -> Result<SavedProjection, StoreError> {
        let (projection_type, id) = (self.projection.projection_type(), self.projection.id());
        self.state.ensure_persisted(projection_type, id)?;
        let replay = self.replay().await?;
        self.state.checkpoint(projection_type, id, &replay, view).await
    }
}
