//! Command and query handlers for todo lists.

pub mod command_handlers;
pub mod query_handlers;
