// crates/toolgate-core/src/runtime/clock.rs
// ============================================================================
// Module: Toolgate Clocks
// Description: System and manually advanced clock implementations.
// Purpose: Supply timestamps to the runtime through the Clock interface.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! [`SystemClock`] reads wall-clock unix milliseconds. [`ManualClock`] only
//! moves when advanced, which makes expiry and recovery windows testable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::core::Timestamp;
use crate::interfaces::Clock;

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Wall-clock time source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp::from_unix_millis(i64::try_from(now.as_millis()).unwrap_or(i64::MAX))
    }
}

/// Clock that moves only when advanced. Clones share the same time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    /// Current unix milliseconds.
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock starting at `start`.
    #[must_use]
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.as_unix_millis())),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, duration: Duration) {
        let step = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(step, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.millis.load(Ordering::SeqCst))
    }
}
