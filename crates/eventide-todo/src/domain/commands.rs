//! Commands for todo lists.

use uuid::Uuid;

/// Command to create a list.
#[derive(Debug, Clone)]
pub struct CreateList {
    /// The list identifier.
    pub list_id: Uuid,
    /// Display name.
    pub list_name: String,
}

/// Command to delete a list.
#[derive(Debug, Clone)]
pub struct DeleteList {
    /// The list identifier.
    pub list_id: Uuid,
}

/// Command to add an item to a list.
#[derive(Debug, Clone)]
pub struct AddItem {
    /// The list identifier.
    pub list_id: Uuid,
    /// The item identifier.
    pub item_id: Uuid,
    /// Display name.
    pub item_name: String,
}

/// Command to remove an item from a list.
#[derive(Debug, Clone)]
pub struct RemoveItem {
    /// The list identifier.
    pub list_id: Uuid,
    /// The item identifier.
    pub item_id: Uuid,
}

/// Command to check off an item.
#[derive(Debug, Clone)]
pub struct CompleteItem {
    /// The list identifier.
    pub list_id: Uuid,
    /// The item identifier.
    pub item_id: Uuid,
}

/// Command to reopen a completed item.
#[derive(Debug, Clone)]
pub struct UncompleteItem {
    /// The list identifier.
    pub list_id: Uuid,
    /// The item identifier.
    pub item_id: Uuid,
}
