//! Pure reducers shared by the todo projections.
//!
//! Item lists keep first-insertion order and never hold duplicates.

use eventide_core::error::StoreError;
use eventide_core::projection::Replay;
use uuid::Uuid;

use crate::domain::events::TodoEvent;

/// Name and deletion flag of a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMeta {
    /// Display name; empty until the list is created.
    pub list_name: String,
    /// Whether the list has been deleted.
    pub is_deleted: bool,
}

fn insert(mut items: Vec<Uuid>, item_id: Uuid) -> Vec<Uuid> {
    if !items.contains(&item_id) {
        items.push(item_id);
    }
    items
}

fn remove(mut items: Vec<Uuid>, item_id: Uuid) -> Vec<Uuid> {
    items.retain(|id| *id != item_id);
    items
}

/// Items that are on the list and not completed.
#[must_use]
pub fn to_incomplete_items(items: Vec<Uuid>, event: &TodoEvent) -> Vec<Uuid> {
    match event {
        TodoEvent::ItemAdded(e) => insert(items, e.item_id),
        TodoEvent::ItemUncompleted(e) => insert(items, e.item_id),
        TodoEvent::ItemCompleted(e) => remove(items, e.item_id),
        TodoEvent::ItemRemoved(e) => remove(items, e.item_id),
        _ => items,
    }
}

/// Items that are on the list and completed.
#[must_use]
pub fn to_completed_items(items: Vec<Uuid>, event: &TodoEvent) -> Vec<Uuid> {
    match event {
        TodoEvent::ItemCompleted(e) => insert(items, e.item_id),
        TodoEvent::ItemUncompleted(e) => remove(items, e.item_id),
        TodoEvent::ItemRemoved(e) => remove(items, e.item_id),
        _ => items,
    }
}

/// Name and deletion state.
#[must_use]
pub fn to_list_meta(meta: ListMeta, event: &TodoEvent) -> ListMeta {
    match event {
        TodoEvent::ListCreated(e) => ListMeta {
            list_name: e.list_name.clone(),
            ..meta
        },
        TodoEvent::ListDeleted(_) => ListMeta {
            is_deleted: true,
            ..meta
        },
        _ => meta,
    }
}

/// Folds the todo events of `replay` with `reducer`, skipping foreign
/// event types.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if a payload is malformed.
pub fn fold_todo_events<V, T, F>(replay: &Replay<'_, V>, mut reducer: F, initial: T) -> Result<T, StoreError>
where
    F: FnMut(T, &TodoEvent) -> T,
{
    replay.try_reduce_events(
        |acc, event| {
            Ok(match TodoEvent::decode(event)? {
                Some(todo) => reducer(acc, &todo),
                None => acc,
            })
        },
        initial,
    )
}
