//! Clock abstraction for event timestamps and identifier generation.

use std::time::SystemTime;

use chrono::{DateTime, Utc};

/// Abstraction over system time so ids and timestamps are reproducible in tests.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current time as a `SystemTime`, the form the id generator
    /// consumes.
    fn system_time(&self) -> SystemTime {
        SystemTime::from(self.now())
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
