//! Eventide Todo — a reference domain built on the event and projection
//! stores.
//!
//! Todo lists exercise every storage operation: commands append through
//! stream validation, and queries replay single-stream and multi-stream
//! projections on top of their saved checkpoints.

pub mod application;
pub mod domain;
pub mod error;
pub mod projections;
