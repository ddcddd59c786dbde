//! Monotonic time types used throughout the engine.
//!
//! A thin newtype over microseconds so the core never depends on a
//! particular wall-clock source. The daemon binary stamps real
//! `Instant`s from `std::time::Instant`; tests stamp synthetic ones
//! directly, which keeps eviction timing deterministic without sleeping.

use core::fmt;
use core::ops::{Add, Sub};

/// A point in monotonic time, in microseconds since some unspecified epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Instant(i64);

impl Instant {
    pub const ZERO: Instant = Instant(0);

    pub const fn from_micros(micros: i64) -> Instant {
        Instant(micros)
    }

    pub const fn from_millis(millis: i64) -> Instant {
        Instant(millis * 1000)
    }

    pub const fn from_secs(secs: i64) -> Instant {
        Instant(secs * 1_000_000)
    }

    pub const fn total_micros(&self) -> i64 {
        self.0
    }

    /// Samples the real monotonic clock, anchored at an arbitrary
    /// process-local epoch (first call).
    pub fn now() -> Instant {
        use std::sync::OnceLock;
        use std::time::Instant as StdInstant;

        static EPOCH: OnceLock<StdInstant> = OnceLock::new();
        let epoch = EPOCH.get_or_init(StdInstant::now);
        Instant::from_micros(epoch.elapsed().as_micros() as i64)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:06}s", self.0 / 1_000_000, self.0.rem_euclid(1_000_000))
    }
}

/// A span of monotonic time, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    pub const fn from_micros(micros: i64) -> Duration {
        Duration(micros)
    }

    pub const fn from_millis(millis: i64) -> Duration {
        Duration(millis * 1000)
    }

    pub const fn from_secs(secs: i64) -> Duration {
        Duration(secs * 1_000_000)
    }

    pub const fn total_micros(&self) -> i64 {
        self.0
    }

    pub const fn as_secs(&self) -> i64 {
        self.0 / 1_000_000
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:06}s", self.0 / 1_000_000, self.0.rem_euclid(1_000_000))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;
    fn add(self, rhs: Duration) -> Instant {
        Instant(self.0 + rhs.0)
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;
    fn sub(self, rhs: Duration) -> Instant {
        Instant(self.0 - rhs.0)
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;
    fn sub(self, rhs: Instant) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_and_arithmetic() {
        let t0 = Instant::from_secs(10);
        let t1 = t0 + Duration::from_secs(5);
        assert!(t1 > t0);
        assert_eq!(t1 - t0, Duration::from_secs(5));
    }
}
