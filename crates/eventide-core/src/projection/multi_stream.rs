//! Multi-stream projection engine.

use tokio::sync::OnceCell;
use tracing::debug;

use super::engine::ReplayState;
use super::{MultiStreamProjection, ProjectionEvent, Replay, SavedView};
use crate::error::StoreError;
use crate::event::{NewEvent, StoredEvent};
use crate::filter::StreamDefinition;
use crate::repository::{Repositories, SavedProjection};

/// Replays the de-duplicated union of several streams under one checkpoint.
///
/// Behaves like [`ProjectionEngine`](super::ProjectionEngine) except that the
/// memoized identifier is replaced by the memoized stream definitions.
pub struct MultiStreamProjectionEngine<P: MultiStreamProjection> {
    projection: P,
    streams: OnceCell<Vec<StreamDefinition>>,
    state: ReplayState<P::View>,
}

impl<P: MultiStreamProjection> MultiStreamProjectionEngine<P> {
    /// Creates an engine that resumes from the saved projection, if any.
    #[must_use]
    pub fn new(projection: P, repositories: Repositories) -> Self {
        Self {
            projection,
            streams: OnceCell::new(),
            state: ReplayState::new(repositories),
        }
    }

    /// Ignores any saved projection and replays every stream in full.
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

    /// The memoized stream definitions.
    pub async fn streams(&self) -> &[StreamDefinition] {
        self.streams
            .get_or_init(|| async { self.projection.streams() })
            .await
    }

    async fn fetch_history(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let after = self
            .saved_projection()
            .await?
            .map(|saved| saved.latest_event_id.clone());
        let streams = self.streams().await;

        let events = self
            .state
            .repositories
            .events
            .read_streams(streams, after.as_ref())
            .await?;
        debug!(
            projection_type = self.projection.projection_type(),
            id = self.projection.id(),
            streams = streams.len(),
            events = events.len(),
            "loaded multi-stream projection history"
        );
        Ok(events)
    }

    /// The ordered, de-duplicated fold slice.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if a lazy fetch fails.
    pub async fn replay(&self) -> Result<Replay<'_, P::View>, StoreError> {
        let saved = self.saved_projection().await?;
        let history = self.state.history(|| self.fetch_history()).await?;
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::filter::DataFilter;
    use crate::projection::Projection;
    use crate::projection::mocks::{MockEvents, MockProjections, stored};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Seen {
        ids: Vec<String>,
    }

    struct Board;

    impl Projection for Board {
        type View = Seen;

        fn projection_type(&self) -> &str {
            "BOARD"
        }

        fn id(&self) -> &str {
            "b"
        }

        fn view(&self, replay: &Replay<'_, Seen>) -> Result<Seen, StoreError> {
            let ids = replay.reduce_events(
                |mut ids, event| {
                    ids.push(event.id().map(ToString::to_string).unwrap_or_default());
                    ids
                },
                replay.from_projection_or_default(|s| s.ids.clone(), Vec::new()),
            );
            Ok(Seen { ids })
        }
    }

    impl MultiStreamProjection for Board {
        fn streams(&self) -> Vec<StreamDefinition> {
            vec![
                StreamDefinition::new(["OPENED", "CLOSED"], DataFilter::new().equals("boardId", "b")),
                StreamDefinition::new(["CARD"], DataFilter::new().equals("boardId", "b")),
                StreamDefinition::new(["CARD"], DataFilter::new().equals("pinned", true)),
            ]
        }
    }

    fn history() -> Vec<StoredEvent> {
        vec![
            stored("01", "OPENED", json!({"boardId": "b"})),
            stored("02", "CARD", json!({"boardId": "b", "pinned": true})),
            stored("03", "CARD", json!({"boardId": "x", "pinned": true})),
            stored("04", "CARD", json!({"boardId": "x"})),
            stored("05", "CLOSED", json!({"boardId": "b"})),
        ]
    }

    #[tokio::test]
    async fn test_union_is_deduplicated_and_ordered() {
        // Arrange
        let events = Arc::new(MockEvents::with(history()));
        let projections = Arc::new(MockProjections::default());
        let engine =
            MultiStreamProjectionEngine::new(Board, Repositories::new(events, projections));

        // Act
        let view = engine.view().await.unwrap();

        // Assert
        assert_eq!(view.ids, ["01", "02", "03", "05"]);
    }

    #[tokio::test]
    async fn test_streams_are_read_after_shared_checkpoint() {
        let events = Arc::new(MockEvents::with(history()));
        let projections = Arc::new(MockProjections::default());
        projections.insert("BOARD", "b", json!({"ids": ["01", "02"]}), "02");
        let engine = MultiStreamProjectionEngine::new(
            Board,
            Repositories::new(events.clone(), projections.clone()),
        );

        let view = engine.view().await.unwrap();

        assert_eq!(view.ids, ["01", "02", "03", "05"]);
        assert_eq!(events.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrent_views_read_streams_once() {
        let events = Arc::new(MockEvents::with(history()));
        let projections = Arc::new(MockProjections::default());
        let engine = MultiStreamProjectionEngine::new(
            Board,
            Repositories::new(events.clone(), projections.clone()),
        );

        let (a, b) = tokio::join!(engine.view(), engine.replay());

        assert_eq!(a.unwrap().ids.len(), 4);
        assert_eq!(b.unwrap().len(), 4);
        assert_eq!(events.reads.load(Ordering::SeqCst), 3);
        assert_eq!(projections.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_save_projection_checkpoints_union() {
        let events = Arc::new(MockEvents::with(history()));
        let projections = Arc::new(MockProjections::default());
        let engine = MultiStreamProjectionEngine::new(
            Board,
            Repositories::new(events, projections.clone()),
        );

        let saved = engine.save_projection().await.unwrap();

        assert_eq!(saved.latest_event_id.as_str(), "05");
        assert_eq!(projections.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_staged_events_without_ids_block_save() {
        let events = Arc::new(MockEvents::with(history()));
        let projections = Arc::new(MockProjections::default());
        let mut engine =
            MultiStreamProjectionEngine::new(Board, Repositories::new(events, projections));
        engine.apply([NewEvent::new("CARD", json!({"boardId": "b"}))]);

        let result = engine.save_projection().await;

        assert!(matches!(
            result,
            Err(StoreError::UnpersistedEvents { count: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_save_view_persists_built_view() {
        // Arrange
        let events = Arc::new(MockEvents::with(history()));
        let projections = Arc::new(MockProjections::default());
        let engine = MultiStreamProjectionEngine::new(
            Board,
            Repositories::new(events.clone(), projections.clone()),
        );
        let view = engine.view().await.unwrap();

        // Act
        let saved = engine.save_view(&view).await.unwrap();

        // Assert
        assert_eq!(saved.latest_event_id.as_str(), "05");
        assert_eq!(saved.data, json!({"ids": view.ids}));
        assert_eq!(events.reads.load(Ordering::SeqCst), 3);
        assert_eq!(projections.writes.load(Ordering::SeqCst), 1);
    }
}
