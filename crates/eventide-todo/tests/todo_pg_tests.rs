//! End-to-end todo scenarios against `PostgreSQL`.

use std::sync::Arc;

use eventide_core::filter::{DataFilter, ReadOptions};
use eventide_core::projection::{MultiStreamProjectionEngine, ProjectionEngine};
use eventide_core::repository::{EventRepository, Repositories, SaveStatus};
use eventide_event_store::pg_event_repository::PgEventRepository;
use eventide_event_store::pg_projection_repository::PgProjectionRepository;
use eventide_todo::application::command_handlers::{
    append_to_list, handle_add_item, handle_complete_item, handle_create_list, handle_delete_list,
    handle_uncomplete_item, load_list,
};
use eventide_todo::application::query_handlers::{find_lists, get_todo_list, get_todo_list_with_meta};
use eventide_todo::domain::commands::{AddItem, CompleteItem, CreateList, DeleteList, UncompleteItem};
use eventide_todo::domain::events::{
    ITEM_ADDED, ITEM_EVENT_TYPES, ItemAdded, LIST_CREATED, TodoEvent, item_stream, list_stream,
};
use eventide_todo::projections::{TodoList, TodoListWithMeta};
use sqlx::PgPool;
use uuid::Uuid;

fn repositories(pool: PgPool) -> Repositories {
    Repositories::new(
        Arc::new(PgEventRepository::new(pool.clone())),
        Arc::new(PgProjectionRepository::new(pool)),
    )
}

async fn seed_list(repositories: &Repositories, name: &str) -> (Uuid, Uuid) {
    let (list_id, item_id) = (Uuid::now_v7(), Uuid::now_v7());
    handle_create_list(
        &CreateList {
            list_id,
            list_name: name.into(),
        },
        repositories,
    )
    .await
    .unwrap();
    handle_add_item(
        &AddItem {
            list_id,
            item_id,
            item_name: "Milk".into(),
        },
        repositories,
    )
    .await
    .unwrap();
    handle_complete_item(&CompleteItem { list_id, item_id }, repositories)
        .await
        .unwrap();
    (list_id, item_id)
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_events_are_saved_and_filtered(pool: PgPool) {
    // Arrange
    let repositories = repositories(pool);
    let (list_id, item_id) = seed_list(&repositories, "Groceries").await;
    seed_list(&repositories, "Chores").await;

    // Act
    let items = repositories
        .events
        .read_stream(
            &[ITEM_ADDED],
            &ReadOptions::with_data(DataFilter::new().equals("listId", list_id)),
        )
        .await
        .unwrap();
    let created = repositories
        .events
        .read_stream(&[LIST_CREATED], &ReadOptions::default())
        .await
        .unwrap();

    // Assert
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].data["itemId"], item_id.to_string());
    assert_eq!(created.len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_and_item_streams_merge(pool: PgPool) {
    let repositories = repositories(pool);
    let (list_id, _) = seed_list(&repositories, "Groceries").await;

    let merged = repositories
        .events
        .read_streams(&[list_stream(list_id), item_stream(list_id)], None)
        .await
        .unwrap();

    let types: Vec<&str> = merged.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, ["LIST_CREATED", "ITEM_ADDED", "ITEM_COMPLETED"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_projection_builds_saves_and_resumes(pool: PgPool) {
    // Arrange
    let repositories = repositories(pool);
    let (list_id, item_id) = seed_list(&repositories, "Groceries").await;

    // Act
    let engine = ProjectionEngine::new(TodoList::new(list_id), repositories.clone());
    let built = engine.view().await.unwrap();
    let saved = engine.save_projection().await.unwrap();
    handle_uncomplete_item(&UncompleteItem { list_id, item_id }, &repositories)
        .await
        .unwrap();
    let resumed = ProjectionEngine::new(TodoList::new(list_id), repositories.clone());
    let replayed = resumed.replay().await.unwrap().len();
    let updated = resumed.view().await.unwrap();

    // Assert
    assert!(built.items.is_empty());
    assert_eq!(built.completed_items, [item_id]);
    assert_eq!(saved.status, SaveStatus::Created);
    assert_eq!(replayed, 1);
    assert_eq!(updated.items, [item_id]);
    assert!(updated.completed_items.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_checkpoint_save_is_skipped(pool: PgPool) {
    let repositories = repositories(pool);
    let (list_id, item_id) = seed_list(&repositories, "Groceries").await;
    let stale = ProjectionEngine::new(TodoList::new(list_id), repositories.clone())
        .without_saved_projection();
    stale.view().await.unwrap();
    handle_uncomplete_item(&UncompleteItem { list_id, item_id }, &repositories)
        .await
        .unwrap();
    get_todo_list(list_id, &repositories).await.unwrap();

    let result = stale.save_projection().await.unwrap();

    assert_eq!(result.status, SaveStatus::Skipped);
    assert_eq!(result.data["items"][0], item_id.to_string());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_multi_stream_projection_tracks_meta(pool: PgPool) {
    // Arrange
    let repositories = repositories(pool);
    let (list_id, _) = seed_list(&repositories, "Test List").await;
    let before = MultiStreamProjectionEngine::new(TodoListWithMeta::new(list_id), repositories.clone());
    let view = before.view().await.unwrap();
    before.save_projection().await.unwrap();

    // Act
    handle_delete_list(&DeleteList { list_id }, &repositories)
        .await
        .unwrap();
    let after = get_todo_list_with_meta(list_id, &repositories).await.unwrap();

    // Assert
    assert_eq!(view.list_name, "Test List");
    assert!(!view.is_deleted);
    assert_eq!(after.list_name, "Test List");
    assert!(after.is_deleted);
    assert_eq!(after.completed_items.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_validated_append_succeeds_when_streams_are_unchanged(pool: PgPool) {
    let repositories = repositories(pool);
    let (list_id, _) = seed_list(&repositories, "Groceries").await;
    let state = load_list(list_id, &repositories).await.unwrap().unwrap();

    let event = TodoEvent::ItemAdded(ItemAdded {
        list_id,
        item_id: Uuid::now_v7(),
        item_name: "Eggs".into(),
    });
    let result = append_to_list(&state.version, &event, &repositories).await;

    assert!(result.unwrap().stored_event.id > state.version);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_validated_append_conflicts_when_a_stream_advanced(pool: PgPool) {
    // Arrange
    let repositories = repositories(pool);
    let (list_id, _) = seed_list(&repositories, "Groceries").await;
    let state = load_list(list_id, &repositories).await.unwrap().unwrap();
    handle_add_item(
        &AddItem {
            list_id,
            item_id: Uuid::now_v7(),
            item_name: "Bread".into(),
        },
        &repositories,
    )
    .await
    .unwrap();

    // Act
    let event = TodoEvent::ItemAdded(ItemAdded {
        list_id,
        item_id: Uuid::now_v7(),
        item_name: "Eggs".into(),
    });
    let result = append_to_list(&state.version, &event, &repositories).await;

    // Assert
    assert!(result.unwrap_err().is_conflict());
    let items = repositories
        .events
        .read_stream(
            &ITEM_EVENT_TYPES,
            &ReadOptions::with_data(DataFilter::new().equals("listId", list_id)),
        )
        .await
        .unwrap();
    assert_eq!(items.len(), 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_validated_append_ignores_other_lists(pool: PgPool) {
    let repositories = repositories(pool);
    let (list_id, _) = seed_list(&repositories, "Groceries").await;
    let state = load_list(list_id, &repositories).await.unwrap().unwrap();
    seed_list(&repositories, "Chores").await;

    let event = TodoEvent::ItemAdded(ItemAdded {
        list_id,
        item_id: Uuid::now_v7(),
        item_name: "Eggs".into(),
    });
    let result = append_to_list(&state.version, &event, &repositories).await;

    assert!(result.is_ok());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_lists_queries_checkpointed_views(pool: PgPool) {
    let repositories = repositories(pool);
    let (groceries, _) = seed_list(&repositories, "Groceries").await;
    let (chores, _) = seed_list(&repositories, "Chores").await;
    handle_delete_list(&DeleteList { list_id: chores }, &repositories)
        .await
        .unwrap();
    for list_id in [groceries, chores] {
        get_todo_list_with_meta(list_id, &repositories).await.unwrap();
    }

    let live = find_lists(&DataFilter::new().equals("isDeleted", false), &repositories)
        .await
        .unwrap();

    assert_eq!(live.len(), 1);
    assert_eq!(live[0].list_id, groceries);
}
