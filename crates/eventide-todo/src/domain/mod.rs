//! Events, commands, and stream definitions for todo lists.

pub mod commands;
pub mod events;
