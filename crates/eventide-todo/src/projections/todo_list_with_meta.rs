//! Multi-stream projection joining a list's lifecycle with its items.

use eventide_core::error::StoreError;
use eventide_core::filter::StreamDefinition;
use eventide_core::projection::{MultiStreamProjection, Projection, Replay};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reducers::{ListMeta, fold_todo_events, to_completed_items, to_incomplete_items, to_list_meta};
use crate::domain::events::{item_stream, list_stream};

/// Projection type of [`TodoListWithMeta`].
pub const TODO_LIST_WITH_META: &str = "TODO_LIST_WITH_META";

/// A list's name, deletion state, and items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListWithMetaView {
    /// The list identifier.
    pub list_id: Uuid,
    /// Display name; empty if the creation event has not been seen.
    pub list_name: String,
    /// Whether the list has been deleted.
    pub is_deleted: bool,
    /// Items not yet completed.
    pub items: Vec<Uuid>,
    /// Completed items.
    pub completed_items: Vec<Uuid>,
}

/// The list and item streams of one list under a shared checkpoint.
#[derive(Debug, Clone)]
pub struct TodoListWithMeta {
    list_id: Uuid,
    id: String,
}

impl TodoListWithMeta {
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

impl Projection for TodoListWithMeta {
    type View = TodoListWithMetaView;

    fn projection_type(&self) -> &str {
        TODO_LIST_WITH_META
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn view(&self, replay: &Replay<'_, TodoListWithMetaView>) -> Result<TodoListWithMetaView, StoreError> {
        let meta = replay.from_projection_or_default(
            |v| ListMeta {
                list_name: v.list_name.clone(),
                is_deleted: v.is_deleted,
            },
            ListMeta::default(),
        );
        let items = replay.from_projection_or_default(|v| v.items.clone(), Vec::new());
        let completed = replay.from_projection_or_default(|v| v.completed_items.clone(), Vec::new());

        let meta = fold_todo_events(replay, to_list_meta, meta)?;
        Ok(TodoListWithMetaView {
            list_id: self.list_id,
            list_name: meta.list_name,
            is_deleted: meta.is_deleted,
            items: fold_todo_events(replay, to_incomplete_items, items)?,
            completed_items: fold_todo_events(replay, to_completed_items, completed)?,
        })
    }
}

impl MultiStreamProjection for TodoListWithMeta {
    fn streams(&self) -> Vec<StreamDefinition> {
        vec![list_stream(self.list_id), item_stream(self.list_id)]
    }
}
