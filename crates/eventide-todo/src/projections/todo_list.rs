//! Single-stream projection of a list's items.

use eventide_core::error::StoreError;
use eventide_core::filter::DataFilter;
use eventide_core::projection::{Projection, Replay, SingleStreamProjection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reducers::{fold_todo_events, to_completed_items, to_incomplete_items};
use crate::domain::events::{ITEM_EVENT_TYPES, list_identifier};

/// Projection type of [`TodoList`].
pub const TODO_LIST: &str = "TODO_LIST";

/// Open and completed items of one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListView {
    /// Items not yet completed, in the order they were added.
    pub items: Vec<Uuid>,
    /// Completed items, in completion order.
    pub completed_items: Vec<Uuid>,
}

/// Item events of one list folded into a [`TodoListView`].
#[derive(Debug, Clone)]
pub struct TodoList {
    list_id: Uuid,
    id: String,
}

impl TodoList {
    /// Creates the projection for `list_id`.
    #[must_use]
    pub fn new(list_id: Uuid) -> Self {
        Self {
            list_id,
            id: list_id.to_string(),
        }
    }

    /// The list identifier.
    #[must_use]
    pub fn list_id(&self) -> Uuid {
        self.list_id
    }
}

impl Projection for TodoList {
    type View = TodoListView;

    fn projection_type(&self) -> &str {
        TODO_LIST
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn view(&self, replay: &Replay<'_, TodoListView>) -> Result<TodoListView, StoreError> {
        let items = replay.from_projection_or_default(|v| v.items.clone(), Vec::new());
        let completed = replay.from_projection_or_default(|v| v.completed_items.clone(), Vec::new());
        Ok(TodoListView {
            items: fold_todo_events(replay, to_incomplete_items, items)?,
            completed_items: fold_todo_events(replay, to_completed_items, completed)?,
        })
    }
}

impl SingleStreamProjection for TodoList {
    fn event_types(&self) -> Vec<String> {
        ITEM_EVENT_TYPES.iter().map(ToString::to_string).collect()
    }

    fn identifier(&self) -> DataFilter {
        list_identifier(self.list_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use eventide_core::event::NewEvent;
    use eventide_core::projection::ProjectionEngine;
    use eventide_core::repository::{EventRepository, Repositories, SaveStatus};
    use eventide_test_support::{InMemoryEventRepository, InMemoryProjectionRepository};

    use super::*;
    use crate::domain::events::{ItemAdded, ItemCompleted, ItemUncompleted, ListCreated, TodoEvent};

    struct Fixture {
        events: Arc<InMemoryEventRepository>,
        projections: Arc<InMemoryProjectionRepository>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                events: Arc::new(InMemoryEventRepository::new()),
                projections: Arc::new(InMemoryProjectionRepository::new()),
            }
        }

        fn repositories(&self) -> Repositories {
            Repositories::new(self.events.clone(), self.projections.clone())
        }

        async fn append(&self, event: TodoEvent) {
            self.events.append(event.to_new_event()).await.unwrap();
        }

        fn engine(&self, list_id: Uuid) -> ProjectionEngine<TodoList> {
            ProjectionEngine::new(TodoList::new(list_id), self.repositories())
        }
    }

    fn item_added(list_id: Uuid, item_id: Uuid) -> TodoEvent {
        TodoEvent::ItemAdded(ItemAdded {
            list_id,
            item_id,
            item_name: "Milk".into(),
        })
    }

    #[tokio::test]
    async fn test_view_builds_from_item_events() {
        // Arrange
        let fixture = Fixture::new();
        let (list_id, item_id) = (Uuid::now_v7(), Uuid::now_v7());
        fixture
            .append(TodoEvent::ListCreated(ListCreated {
                list_id,
                list_name: "Test List".into(),
            }))
            .await;
        fixture.append(item_added(list_id, item_id)).await;
        fixture
            .append(TodoEvent::ItemCompleted(ItemCompleted { list_id, item_id }))
            .await;

        // Act
        let view = fixture.engine(list_id).view().await.unwrap();

        // Assert
        assert!(view.items.is_empty());
        assert_eq!(view.completed_items, [item_id]);
    }

    #[tokio::test]
    async fn test_other_lists_are_ignored() {
        let fixture = Fixture::new();
        let (mine, theirs) = (Uuid::now_v7(), Uuid::now_v7());
        fixture.append(item_added(theirs, Uuid::now_v7())).await;

        let view = fixture.engine(mine).view().await.unwrap();

        assert_eq!(view, TodoListView::default());
    }

    #[tokio::test]
    async fn test_saved_view_is_resumed_with_new_events() {
        // Arrange
        let fixture = Fixture::new();
        let (list_id, item_id) = (Uuid::now_v7(), Uuid::now_v7());
        fixture.append(item_added(list_id, item_id)).await;
        fixture
            .append(TodoEvent::ItemCompleted(ItemCompleted { list_id, item_id }))
            .await;
        let saved = fixture.engine(list_id).save_projection().await.unwrap();
        fixture
            .append(TodoEvent::ItemUncompleted(ItemUncompleted { list_id, item_id }))
            .await;

        // Act
        let engine = fixture.engine(list_id);
        let replayed = engine.replay().await.unwrap().len();
        let view = engine.view().await.unwrap();

        // Assert
        assert_eq!(saved.status, SaveStatus::Created);
        assert_eq!(replayed, 1);
        assert_eq!(view.items, [item_id]);
        assert!(view.completed_items.is_empty());
    }

    #[tokio::test]
    async fn test_staged_events_preview_without_persisting() {
        let fixture = Fixture::new();
        let (list_id, item_id) = (Uuid::now_v7(), Uuid::now_v7());
        let mut engine = fixture.engine(list_id);

        engine.apply([item_added(list_id, item_id).to_new_event()]);
        let view = engine.view().await.unwrap();

        assert_eq!(view.items, [item_id]);
        assert!(fixture.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_the_view() {
        let fixture = Fixture::new();
        let list_id = Uuid::now_v7();
        fixture
            .events
            .append(NewEvent::new(
                "ITEM_ADDED",
                serde_json::json!({"listId": list_id, "itemId": 42}),
            ))
            .await
            .unwrap();

        let result = fixture.engine(list_id).view().await;

        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
