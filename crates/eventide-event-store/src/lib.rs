//! Eventide Event Store — `PostgreSQL` persistence for events and projections.
//!
//! Provides [`PgEventRepository`](pg_event_repository::PgEventRepository) and
//! [`PgProjectionRepository`](pg_projection_repository::PgProjectionRepository),
//! the table configuration they share, and the DDL that creates their tables.

pub mod config;
pub mod pg_event_repository;
pub mod pg_projection_repository;
pub mod schema;
mod sql;
