//! Todo list projections and the reducers they fold with.

pub mod reducers;
pub mod todo_list;
pub mod todo_list_with_meta;

pub use todo_list::{TODO_LIST, TodoList, TodoListView};
pub use todo_list_with_meta::{TODO_LIST_WITH_META, TodoListWithMeta, TodoListWithMetaView};
