// stepchain-core/src/core/time.rs
// ============================================================================
// Module: Stepchain Deterministic Time
// Description: Second-resolution UTC timestamps and the deterministic clock.
// Purpose: Keep every timestamp in a run derivable from the caller's seed.
// Dependencies: chrono, serde
// ============================================================================

//! ## Overview
//! Stepchain never reads process time. Every timestamp flows from a
//! [`DeterministicClock`] seeded by the caller; successive calls advance by a
//! fixed one-second step so `updated_at` strictly advances on every mutation
//! while replays remain byte-identical.
//!
//! The canonical wire form is `YYYY-MM-DDTHH:MM:SSZ` (ISO-8601 UTC, second
//! resolution, no offset, no fraction).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Strict ISO-8601 UTC wire format at second resolution.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Second-resolution UTC timestamp with a canonical string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

/// Timestamp parsing errors.
#[derive(Debug, Error)]
pub enum TimeError {
    /// Input does not match the canonical `YYYY-MM-DDTHH:MM:SSZ` form.
    #[error("timestamp must be ISO-8601 UTC (YYYY-MM-DDTHH:MM:SSZ): {0}")]
    InvalidFormat(String),
}

impl Timestamp {
    /// Parses a canonical ISO-8601 UTC timestamp.
    ///
    /// Parsing is strict: the value must round-trip to the same bytes, so
    /// non-padded fields or trailing garbage are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::InvalidFormat`] when the input is not canonical.
    pub fn parse(value: &str) -> Result<Self, TimeError> {
        let parsed = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
            .map_err(|_| TimeError::InvalidFormat(value.to_string()))?;
        let candidate = Self(parsed);
        if candidate.to_string() != value {
            return Err(TimeError::InvalidFormat(value.to_string()));
        }
        Ok(candidate)
    }

    /// Returns this timestamp advanced by the given number of seconds.
    ///
    /// Saturates at the representable maximum; the calendar range makes
    /// saturation unreachable for any realistic run.
    #[must_use]
    pub fn plus_seconds(self, seconds: i64) -> Self {
        self.0
            .checked_add_signed(chrono::Duration::seconds(seconds))
            .map_or(Self(NaiveDateTime::MAX), Self)
    }

    /// Returns the signed difference `self - earlier` in milliseconds.
    #[must_use]
    pub fn millis_since(self, earlier: Self) -> i64 {
        (self.0 - earlier.0).num_milliseconds()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Deterministic Clock
// ============================================================================

/// Caller-seeded monotonic clock.
///
/// # Invariants
/// - Successive [`DeterministicClock::now`] calls return strictly increasing
///   timestamps.
/// - The full sequence of readings is a pure function of the seed.
#[derive(Debug, Clone)]
pub struct DeterministicClock {
    /// Seed timestamp supplied by the caller.
    seed: Timestamp,
    /// Number of readings taken so far.
    ticks: i64,
}

impl DeterministicClock {
    /// Creates a clock whose first reading equals the seed.
    #[must_use]
    pub const fn new(seed: Timestamp) -> Self {
        Self {
            seed,
            ticks: 0,
        }
    }

    /// Returns the seed timestamp.
    #[must_use]
    pub const fn seed(&self) -> Timestamp {
        self.seed
    }

    /// Returns the number of readings taken so far.
    #[must_use]
    pub const fn ticks(&self) -> i64 {
        self.ticks
    }

    /// Returns the next clock reading and advances by one second.
    pub fn now(&mut self) -> Timestamp {
        let reading = self.seed.plus_seconds(self.ticks);
        self.ticks += 1;
        reading
    }
}
