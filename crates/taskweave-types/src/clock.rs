//! Wall-clock instants in the wire's fixed ISO-8601 form.
//!
//! The only accepted text form is `YYYY-MM-DDTHH:MM:SS.mmmZ`: UTC, exactly
//! millisecond precision, `Z` suffix. Because the form is fixed-width, string
//! order and chronological order agree, but comparisons go through the parsed
//! millisecond value anyway.
//!
//! Wall clock is an ordering tiebreaker only; nothing infers causality from it.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use time::macros::format_description;

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// A UTC instant with millisecond precision.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct WallClock(i64);

impl WallClock {
    /// From Unix milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Current time, truncated to milliseconds.
    pub fn now() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self((nanos / 1_000_000) as i64)
    }

    /// Parse the exact wire form. Anything else (offsets, missing or extra
    /// fraction digits, lowercase `z`) is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let fmt = format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        );
        let dt = time::PrimitiveDateTime::parse(s, fmt).ok()?.assume_utc();
        let clock = Self((dt.unix_timestamp_nanos() / 1_000_000) as i64);
        // Round-trip guards against lenient component parsing.
        (clock.format().as_deref() == Some(s)).then_some(clock)
    }

    /// Render the wire form. `None` only for instants outside years 0..=9999.
    pub fn format(&self) -> Option<String> {
        let fmt = format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        );
        let dt = OffsetDateTime::from_unix_timestamp_nanos(self.0 as i128 * 1_000_000).ok()?;
        if !(0..=9999).contains(&dt.year()) {
            return None;
        }
        dt.format(fmt).ok()
    }

    pub fn plus_millis(&self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    pub fn plus_days(&self, days: i64) -> Self {
        self.plus_millis(days.saturating_mul(MILLIS_PER_DAY))
    }

    /// Fractional days from `self` until `later` (negative when `later` is past).
    pub fn days_until(&self, later: WallClock) -> f64 {
        (later.0 - self.0) as f64 / MILLIS_PER_DAY as f64
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format() {
            Some(s) => f.write_str(&s),
            None => write!(f, "@{}ms", self.0),
        }
    }
}

impl fmt::Debug for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WallClock({self})")
    }
}

impl Serialize for WallClock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.format() {
            Some(s) => serializer.serialize_str(&s),
            None => Err(serde::ser::Error::custom("wall clock out of range")),
        }
    }
}

impl<'de> Deserialize<'de> for WallClock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        WallClock::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid wall clock: {raw}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
