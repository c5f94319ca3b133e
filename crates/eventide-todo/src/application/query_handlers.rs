//! Query handlers for todo lists.
//!
//! Reads replay the projection from its last checkpoint and write a new
//! checkpoint whenever events arrived since, so the next read folds less.

use eventide_core::error::StoreError;
use eventide_core::filter::DataFilter;
use eventide_core::projection::{MultiStreamProjectionEngine, Projection, ProjectionEngine};
use eventide_core::repository::Repositories;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::TodoError;
use crate::projections::{
    TODO_LIST_WITH_META, TodoList, TodoListView, TodoListWithMeta, TodoListWithMetaView,
};

/// Returns the open and completed items of a list.
///
/// A list without events yields an empty view.
///
/// # Errors
///
/// Returns `TodoError::Store` if a read, decode, or checkpoint write fails.
#[instrument(skip(repositories))]
pub async fn get_todo_list(
    list_id: Uuid,
    repositories: &Repositories,
) -> Result<TodoListView, TodoError> {
    let engine = ProjectionEngine::new(TodoList::new(list_id), repositories.clone());
    let replay = engine.replay().await?;
    let view = engine.projection().view(&replay)?;
    if !replay.is_empty() {
        let saved = engine.save_view(&view).await?;
        debug!(status = %saved.status, "checkpointed todo list");
    }
    Ok(view)
}

/// Returns a list with its name and deletion flag.
///
/// # Errors
///
/// Returns `TodoError::ListNotFound` if the list has no events, or
/// `TodoError::Store` if a read, decode, or checkpoint write fails.
#[instrument(skip(repositories))]
pub async fn get_todo_list_with_meta(
    list_id: Uuid,
    repositories: &Repositories,
) -> Result<TodoListWithMetaView, TodoError> {
    let engine =
        MultiStreamProjectionEngine::new(TodoListWithMeta::new(list_id), repositories.clone());
    let saved = engine.saved_projection().await?;
    let replay = engine.replay().await?;
    if replay.is_empty() {
        return saved
            .map(|s| s.view.clone())
            .ok_or(TodoError::ListNotFound(list_id));
    }

    let view = engine.projection().view(&replay)?;
    let checkpoint = engine.save_view(&view).await?;
    debug!(status = %checkpoint.status, "checkpointed todo list with meta");
    Ok(view)
}

/// Returns every checkpointed list whose stored view matches `filter`,
/// ordered by list id.
///
/// Only lists that have been read through [`get_todo_list_with_meta`] at
/// least once are visible here.
///
/// # Errors
///
/// Returns `TodoError::Store` if the query or a decode fails.
#[instrument(skip(repositories))]
pub async fn find_lists(
    filter: &DataFilter,
    repositories: &Repositories,
) -> Result<Vec<TodoListWithMetaView>, TodoError> {
    let records = repositories
        .projections
        .query(TODO_LIST_WITH_META, filter)
        .await?;
    let views = records
        .into_iter()
        .map(|record| serde_json::from_value(record.data).map_err(StoreError::from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(views)
}
