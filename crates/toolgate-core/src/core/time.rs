// crates/toolgate-core/src/core/time.rs
// ============================================================================
// Module: Toolgate Time Model
// Description: Canonical timestamp representation for grants, breakers, and audit.
// Purpose: Keep time arithmetic explicit and clock-injected.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Toolgate components never read the wall clock directly; they receive
//! [`Timestamp`] values from an injected [`crate::interfaces::Clock`]. This
//! keeps expiry, recovery windows, and audit timestamps reproducible in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Unix epoch timestamp in milliseconds.
///
/// # Invariants
/// - Values come from an injected clock; monotonicity is a clock responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(value: i64) -> Self {
        Self(value)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns this timestamp shifted forward by `duration`, saturating.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Returns the elapsed duration since `earlier`, or zero when `earlier` is later.
    #[must_use]
    pub fn duration_since(self, earlier: Self) -> Duration {
        let delta = self.0.saturating_sub(earlier.0);
        u64::try_from(delta).map_or(Duration::ZERO, Duration::from_millis)
    }
}
