// crates/db-agent-core/src/core/time.rs
// ============================================================================
// Module: Agent Time Model
// Description: Canonical timestamp representation and injectable clocks.
// Purpose: Provide deterministic, replayable time values across agent records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The core never reads wall-clock time directly; every component that needs
//! the current time receives a [`Clock`]. Production wires [`SystemClock`];
//! tests wire [`FixedClock`] so receipts and replay decisions are
//! reproducible byte-for-byte.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing or formatting timestamps.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// Timestamp string could not be parsed as RFC 3339.
    #[error("invalid timestamp: {0}")]
    Parse(String),
    /// Timestamp could not be formatted.
    #[error("timestamp formatting failed: {0}")]
    Format(String),
}

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical UTC timestamp used in receipts, tasks, and replay checks.
///
/// # Invariants
/// - Always normalized to UTC.
/// - Serializes as an RFC 3339 string with a `Z` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Parses an ISO-8601 / RFC 3339 timestamp, normalizing to UTC.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Parse`] when the input is not a valid RFC 3339
    /// timestamp.
    pub fn parse(raw: &str) -> Result<Self, TimeError> {
        OffsetDateTime::parse(raw, &Rfc3339)
            .map(|value| Self(value.to_offset(time::UtcOffset::UTC)))
            .map_err(|err| TimeError::Parse(err.to_string()))
    }

    /// Builds a timestamp from unix seconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Parse`] when the value is outside the supported
    /// datetime range.
    pub fn from_unix_seconds(seconds: i64) -> Result<Self, TimeError> {
        OffsetDateTime::from_unix_timestamp(seconds)
            .map(Self)
            .map_err(|err| TimeError::Parse(err.to_string()))
    }

    /// Returns the timestamp as unix seconds.
    #[must_use]
    pub const fn unix_seconds(&self) -> i64 {
        self.0.unix_timestamp()
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn unix_millis(&self) -> i128 {
        self.0.unix_timestamp_nanos() / 1_000_000
    }

    /// Formats the timestamp as an RFC 3339 string.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Format`] when formatting fails.
    pub fn format(&self) -> Result<String, TimeError> {
        self.0.format(&Rfc3339).map_err(|err| TimeError::Format(err.to_string()))
    }

    /// Returns this timestamp shifted by whole seconds.
    ///
    /// Saturates at the supported datetime range boundaries.
    #[must_use]
    pub fn plus_seconds(&self, seconds: i64) -> Self {
        Self(self.0.saturating_add(time::Duration::seconds(seconds)))
    }

    /// Returns the signed difference `self - other` in whole seconds.
    #[must_use]
    pub fn seconds_since(&self, other: &Self) -> i64 {
        (self.0 - other.0).whole_seconds()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format() {
            Ok(formatted) => f.write_str(&formatted),
            Err(_) => f.write_str("<invalid-timestamp>"),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let formatted = self.format().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Injectable time source.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> Timestamp;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time source for production use.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(OffsetDateTime::now_utc())
    }
}

/// Fixed time source for deterministic tests.
///
/// # Invariants
/// - Always returns the timestamp supplied at construction.
pub struct FixedClock {
    /// The pinned timestamp.
    now: Timestamp,
}

impl FixedClock {
    /// Creates a fixed clock pinned to the given timestamp.
    #[must_use]
    pub const fn new(now: Timestamp) -> Self {
        Self {
            now,
        }
    }

    /// Creates a fixed clock from an RFC 3339 string.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Parse`] when the input is invalid.
    pub fn parse(raw: &str) -> Result<Self, TimeError> {
        Ok(Self::new(Timestamp::parse(raw)?))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.now
    }
}
