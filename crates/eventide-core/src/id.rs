//! Sortable, monotonically increasing event identifiers.
//!
//! Ids are ULIDs: a 48-bit millisecond timestamp followed by 80 random bits,
//! rendered as 26 Crockford base32 characters so string order equals time
//! order. Within one generator, ids requested in the same millisecond (or
//! after the clock steps backwards) increment the previous id instead of
//! drawing fresh randomness, so every id is strictly greater than the last.
//! Across generators ordering only approximates wall-clock time.

use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use ulid::Generator;

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::event::EventId;

static SHARED: LazyLock<Arc<IdGenerator>> = LazyLock::new(|| Arc::new(IdGenerator::new()));

/// Issues strictly increasing [`EventId`]s.
pub struct IdGenerator {
    clock: Arc<dyn Clock>,
    generator: Mutex<Generator>,
}

impl IdGenerator {
    /// The process-wide generator. Every handle issues ids from one
    /// monotonic sequence.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED)
    }

    /// Creates a generator driven by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a generator driven by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            generator: Mutex::new(Generator::new()),
        }
    }

    /// Returns the next id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::IdGeneration` if the random component overflows
    /// within a single millisecond.
    pub fn next_id(&self) -> Result<EventId, StoreError> {
        let now = self.clock.system_time();
        let mut generator = self.generator.lock().unwrap_or_else(PoisonError::into_inner);
        generator
            .generate_from_datetime(now)
            .map(EventId::from)
            .map_err(|e| StoreError::IdGeneration(e.to_string()))
    }

    /// Returns `count` consecutive ids, issued under one lock so no other
    /// caller's id interleaves.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::IdGeneration` on overflow.
    pub fn next_ids(&self, count: usize) -> Result<Vec<EventId>, StoreError> {
        let now = self.clock.system_time();
        let mut generator = self.generator.lock().unwrap_or_else(PoisonError::into_inner);
        (0..count)
            .map(|_| {
                generator
                    .generate_from_datetime(now)
                    .map(EventId::from)
                    .map_err(|e| StoreError::IdGeneration(e.to_string()))
            })
            .collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    #[derive(Debug)]
    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn test_ids_within_one_tick_are_strictly_increasing() {
        // Arrange
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap());
        let ids = IdGenerator::with_clock(Arc::new(clock));

        // Act
        let issued: Vec<EventId> = (0..100).map(|_| ids.next_id().unwrap()).collect();

        // Assert
        for pair in issued.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_batch_ids_are_strictly_increasing_and_follow_prior_ids() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap());
        let ids = IdGenerator::with_clock(Arc::new(clock));
        let first = ids.next_id().unwrap();

        let batch = ids.next_ids(5).unwrap();

        assert_eq!(batch.len(), 5);
        assert!(first < batch[0]);
        assert!(batch.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_later_ticks_sort_after_earlier_ticks() {
        let early = IdGenerator::with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        )));
        let late = IdGenerator::with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 1).unwrap(),
        )));

        assert!(early.next_id().unwrap() < late.next_id().unwrap());
    }

    #[test]
    fn test_shared_handles_interleave_strictly_increasing() {
        // Arrange
        let first = IdGenerator::shared();
        let second = IdGenerator::shared();

        // Act
        let issued: Vec<EventId> = (0..200)
            .map(|n| {
                if n % 2 == 0 {
                    first.next_id().unwrap()
                } else {
                    second.next_id().unwrap()
                }
            })
            .collect();

        // Assert
        assert!(Arc::ptr_eq(&first, &second));
        for pair in issued.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_ids_are_26_character_ulids() {
        let id = IdGenerator::new().next_id().unwrap();

        assert_eq!(id.as_str().len(), 26);
        assert!(ulid::Ulid::from_string(id.as_str()).is_ok());
    }
}
