//! Clock abstraction.
//!
//! Every component that stamps timestamps receives a clock explicitly, so
//! tests can pin time and no code reaches for ambient global state.

use chrono::{DateTime, TimeZone, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that always returns a fixed instant. Intended for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Creates a fixed clock pinned to the given instant.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Creates a fixed clock from a unix timestamp in seconds.
    pub fn at_unix(secs: i64) -> Self {
        Self(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
