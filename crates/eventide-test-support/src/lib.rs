//! Shared test doubles for Eventide: in-memory repositories with the same
//! ordering, filtering, and concurrency semantics as the `PostgreSQL` stores,
//! failure-injecting repositories, and a controllable clock.

mod clock;
mod repository;

pub use clock::FixedClock;
pub use repository::{
    FailingEventRepository, FailingProjectionRepository, InMemoryEventRepository,
    InMemoryProjectionRepository,
};
