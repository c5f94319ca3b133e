//! Command handlers for todo lists.
//!
//! Each handler rebuilds the list from its projection, checks the command
//! against that state, and appends one event guarded by stream validation
//! at the version the state was read at. A concurrent writer surfaces as
//! `TodoError::Store(StoreError::ConcurrencyConflict)`.

use eventide_core::event::{EventId, StoredEvent};
use eventide_core::projection::{MultiStreamProjectionEngine, Projection};
use eventide_core::repository::Repositories;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::commands::{
    AddItem, CompleteItem, CreateList, DeleteList, RemoveItem, UncompleteItem,
};
use crate::domain::events::{
    ItemAdded, ItemCompleted, ItemRemoved, ItemUncompleted, ListCreated, ListDeleted, TodoEvent,
    item_stream, list_stream,
};
use crate::error::TodoError;
use crate::projections::{TodoListWithMeta, TodoListWithMetaView};

/// Outcome of a successful command.
#[derive(Debug, Clone)]
pub struct TodoCommandResult {
    /// The list the command targeted.
    pub list_id: Uuid,
    /// The appended event.
    pub stored_event: StoredEvent,
}

/// A list as of a known position in its streams.
#[derive(Debug, Clone)]
pub struct ListState {
    /// The folded view.
    pub view: TodoListWithMetaView,
    /// Id of the last event folded into `view`.
    pub version: EventId,
}

impl ListState {
    fn has_item(&self, item_id: Uuid) -> bool {
        self.view.items.contains(&item_id) || self.view.completed_items.contains(&item_id)
    }
}

/// Loads the current state of a list, or `None` if it has no events.
///
/// # Errors
///
/// Returns `TodoError::Store` if a read or decode fails.
pub async fn load_list(
    list_id: Uuid,
    repositories: &Repositories,
) -> Result<Option<ListState>, TodoError> {
    let engine =
        MultiStreamProjectionEngine::new(TodoListWithMeta::new(list_id), repositories.clone());
    let saved = engine.saved_projection().await?;
    let replay = engine.replay().await?;

    let Some(version) = replay
        .last_event_id()
        .or_else(|| saved.map(|s| &s.latest_event_id))
        .cloned()
    else {
        return Ok(None);
    };
    let view = engine.projection().view(&replay)?;
    Ok(Some(ListState { view, version }))
}

async fn load_live_list(list_id: Uuid, repositories: &Repositories) -> Result<ListState, TodoError> {
    let state = load_list(list_id, repositories)
        .await?
        .ok_or(TodoError::ListNotFound(list_id))?;
    if state.view.is_deleted {
        return Err(TodoError::ListDeleted(list_id));
    }
    Ok(state)
}

/// Appends `event` provided neither of the list's streams moved past
/// `version`.
///
/// # Errors
///
/// Returns `TodoError::Store` wrapping `StoreError::ConcurrencyConflict` if
/// either stream advanced, or the underlying write error.
pub async fn append_to_list(
    version: &EventId,
    event: &TodoEvent,
    repositories: &Repositories,
) -> Result<TodoCommandResult, TodoError> {
    let list_id = event.list_id();
    let stored_event = repositories
        .events
        .append_with_stream_validation(
            event.to_new_event(),
            version,
            &[list_stream(list_id), item_stream(list_id)],
        )
        .await?;
    info!(
        %list_id,
        event_type = event.event_type(),
        event_id = %stored_event.id,
        "appended todo event"
    );
    Ok(TodoCommandResult {
        list_id,
        stored_event,
    })
}

fn require_name(kind: &str, name: &str) -> Result<(), TodoError> {
    if name.trim().is_empty() {
        return Err(TodoError::Validation(format!("{kind} name must not be empty")));
    }
    Ok(())
}

/// Handles the `CreateList` command.
///
/// # Errors
///
/// Returns `TodoError::Validation` for an empty name, `TodoError::ListExists`
/// if the list has events, or `TodoError::Store` if the append fails or a
/// concurrent create won.
#[instrument(skip_all, fields(list_id = %command.list_id))]
pub async fn handle_create_list(
    command: &CreateList,
    repositories: &Repositories,
) -> Result<TodoCommandResult, TodoError> {
    require_name("list", &command.list_name)?;
    if load_list(command.list_id, repositories).await?.is_some() {
        return Err(TodoError::ListExists(command.list_id));
    }

    let event = TodoEvent::ListCreated(ListCreated {
        list_id: command.list_id,
        list_name: command.list_name.clone(),
    });
    // The empty id sorts before every generated id.
    append_to_list(&EventId::new(""), &event, repositories).await
}

/// Handles the `DeleteList` command.
///
/// # Errors
///
/// Returns `TodoError::ListNotFound`, `TodoError::ListDeleted`, or
/// `TodoError::Store`.
#[instrument(skip_all, fields(list_id = %command.list_id))]
pub async fn handle_delete_list(
    command: &DeleteList,
    repositories: &Repositories,
) -> Result<TodoCommandResult, TodoError> {
    let state = load_live_list(command.list_id, repositories).await?;
    let event = TodoEvent::ListDeleted(ListDeleted {
        list_id: command.list_id,
    });
    append_to_list(&state.version, &event, repositories).await
}

/// Handles the `AddItem` command.
///
/// # Errors
///
/// Returns `TodoError::Validation` for an empty name, `TodoError::ItemExists`
/// if the item is already on the list, or the list and store errors of
/// [`handle_delete_list`].
#[instrument(skip_all, fields(list_id = %command.list_id, item_id = %command.item_id))]
pub async fn handle_add_item(
    command: &AddItem,
    repositories: &Repositories,
) -> Result<TodoCommandResult, TodoError> {
    require_name("item", &command.item_name)?;
    let state = load_live_list(command.list_id, repositories).await?;
    if state.has_item(command.item_id) {
        return Err(TodoError::ItemExists {
            list_id: command.list_id,
            item_id: command.item_id,
        });
    }

    let event = TodoEvent::ItemAdded(ItemAdded {
        list_id: command.list_id,
        item_id: command.item_id,
        item_name: command.item_name.clone(),
    });
    append_to_list(&state.version, &event, repositories).await
}

/// Handles the `RemoveItem` command.
///
/// # Errors
///
/// Returns `TodoError::ItemNotFound` if the item is not on the list, or the
/// list and store errors of [`handle_delete_list`].
#[instrument(skip_all, fields(list_id = %command.list_id, item_id = %command.item_id))]
pub async fn handle_remove_item(
    command: &RemoveItem,
    repositories: &Repositories,
) -> Result<TodoCommandResult, TodoError> {
    let state = load_live_list(command.list_id, repositories).await?;
    if !state.has_item(command.item_id) {
        return Err(TodoError::ItemNotFound {
            list_id: command.list_id,
            item_id: command.item_id,
        });
    }

    let event = TodoEvent::ItemRemoved(ItemRemoved {
        list_id: command.list_id,
        item_id: command.item_id,
    });
    append_to_list(&state.version, &event, repositories).await
}

/// Handles the `CompleteItem` command.
///
/// # Errors
///
/// Returns `TodoError::ItemNotFound` if the item is not open, or the list
/// and store errors of [`handle_delete_list`].
#[instrument(skip_all, fields(list_id = %command.list_id, item_id = %command.item_id))]
pub async fn handle_complete_item(
    command: &CompleteItem,
    repositories: &Repositories,
) -> Result<TodoCommandResult, TodoError> {
    let state = load_live_list(command.list_id, repositories).await?;
    if !state.view.items.contains(&command.item_id) {
        return Err(TodoError::ItemNotFound {
            list_id: command.list_id,
            item_id: command.item_id,
        });
    }

    let event = TodoEvent::ItemCompleted(ItemCompleted {
        list_id: command.list_id,
        item_id: command.item_id,
    });
    append_to_list(&state.version, &event, repositories).await
}

/// Handles the `UncompleteItem` command.
///
/// # Errors
///
/// Returns `TodoError::ItemNotFound` if the item is not completed, or the
/// list and store errors of [`handle_delete_list`].
#[instrument(skip_all, fields(list_id = %command.list_id, item_id = %command.item_id))]
pub async fn handle_uncomplete_item(
    command: &UncompleteItem,
    repositories: &Repositories,
) -> Result<TodoCommandResult, TodoError> {
    let state = load_live_list(command.list_id, repositories).await?;
    if !state.view.completed_items.contains(&command.item_id) {
        return Err(TodoError::ItemNotFound {
            list_id: command.list_id,
            item_id: command.item_id,
        });
    }

    let event = TodoEvent::ItemUncompleted(ItemUncompleted {
        list_id: command.list_id,
        item_id: command.item_id,
    });
    append_to_list(&state.version, &event, repositories).await
}
