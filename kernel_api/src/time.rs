//! Time abstractions
//!
//! Deadlines inside the core are absolute tick counts. Drivers speak in
//! [`Duration`]s; a [`TickRate`] converts between the two.

use core::ops::{Add, Sub};
use serde::{Deserialize, Serialize};

/// A duration of time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Duration {
    nanos: u64,
}

impl Duration {
    /// The empty duration
    pub const ZERO: Duration = Duration { nanos: 0 };

    /// Creates a duration from nanoseconds
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Creates a duration from microseconds
    pub const fn from_micros(micros: u64) -> Self {
        Self {
            nanos: micros.saturating_mul(1_000),
        }
    }

    /// Creates a duration from milliseconds
    pub const fn from_millis(millis: u64) -> Self {
        Self {
            nanos: millis.saturating_mul(1_000_000),
        }
    }

    /// Creates a duration from seconds
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            nanos: secs.saturating_mul(1_000_000_000),
        }
    }

    /// Returns the duration in nanoseconds
    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Returns the duration in microseconds
    pub const fn as_micros(&self) -> u64 {
        self.nanos / 1_000
    }

    /// Returns the duration in milliseconds
    pub const fn as_millis(&self) -> u64 {
        self.nanos / 1_000_000
    }

    /// Returns true for a zero-length duration
    pub const fn is_zero(&self) -> bool {
        self.nanos == 0
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, other: Duration) -> Self::Output {
        Duration::from_nanos(self.nanos.saturating_add(other.nanos))
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, other: Duration) -> Self::Output {
        Duration::from_nanos(self.nanos.saturating_sub(other.nanos))
    }
}

/// Frequency of the clock tick
///
/// A timeout never fires early: conversions round up, and any non-zero
/// duration lasts at least one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRate {
    hz: u64,
}

impl TickRate {
    /// Creates a tick rate; a zero rate is clamped to 1 Hz
    pub const fn from_hz(hz: u64) -> Self {
        Self {
            hz: if hz == 0 { 1 } else { hz },
        }
    }

    /// Returns the rate in hertz
    pub const fn hz(&self) -> u64 {
        self.hz
    }

    /// Converts a duration to whole ticks, rounding up
    pub fn ticks_for(&self, duration: Duration) -> u64 {
        let ticks = u128::from(duration.as_nanos()) * u128::from(self.hz);
        let ticks = ticks.div_ceil(1_000_000_000);
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    /// Converts ticks to a duration, rounding down
    pub fn duration_of(&self, ticks: u64) -> Duration {
        let nanos = u128::from(ticks) * 1_000_000_000 / u128::from(self.hz);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Default for TickRate {
    fn default() -> Self {
        Self::from_hz(1000)
    }
}
