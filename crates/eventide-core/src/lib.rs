//! Eventide Core — event-sourcing storage abstractions.
//!
//! This crate defines the event and projection data model, the repository
//! traits a backing store implements, the sortable identifier generator, and
//! the projection engines that fold event slices into materialized views. It
//! contains no infrastructure code.

pub mod clock;
pub mod error;
pub mod event;
pub mod filter;
pub mod id;
pub mod projection;
pub mod repository;
