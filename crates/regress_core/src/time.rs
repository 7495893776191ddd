//! Time types for trace replay.
//!
//! Trace timestamps are raw integers in the unit the instrumentation used.
//! A [`TimeScale`] converts the gap between two of them into wall time.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timestamp recorded in a trace event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceTime(i64);

impl TraceTime {
    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Signed distance from `earlier` to `self`, in trace units
    #[must_use]
    pub const fn units_since(&self, earlier: TraceTime) -> i128 {
        self.0 as i128 - earlier.0 as i128
    }
}

impl std::fmt::Display for TraceTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl From<i64> for TraceTime {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Wall-clock nanoseconds represented by one trace time unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeScale(u64);

impl TimeScale {
    /// Trace timestamps are nanoseconds
    pub const NANOSECONDS: Self = Self(1);
    /// Trace timestamps are microseconds
    pub const MICROSECONDS: Self = Self(1_000);
    /// Trace timestamps are milliseconds
    pub const MILLISECONDS: Self = Self(1_000_000);

    /// Create a scale from nanoseconds per trace unit
    #[must_use]
    pub const fn from_nanos_per_unit(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds per trace unit
    #[must_use]
    pub const fn nanos_per_unit(&self) -> u64 {
        self.0
    }

    /// Wall time to wait between two consecutive events.
    ///
    /// Returns `None` when no suspension is needed (equal or decreasing
    /// timestamps, or a zero scale).
    #[must_use]
    pub fn delay_between(&self, previous: TraceTime, next: TraceTime) -> Option<Duration> {
        let units = next.units_since(previous);
        if units <= 0 || self.0 == 0 {
            return None;
        }
        let nanos = (units as u128).saturating_mul(self.0 as u128);
        let nanos = u64::try_from(nanos).unwrap_or(u64::MAX);
        Some(Duration::from_nanos(nanos))
    }
}

impl Default for TimeScale {
    fn default() -> Self {
        Self::NANOSECONDS
    }
}

impl std::fmt::Display for TimeScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns/unit", self.0)
    }
}
