// crates/toolgate-core/src/runtime/breaker.rs
// ============================================================================
// Module: Toolgate Circuit Breakers
// Description: Per-tool CLOSED/OPEN/HALF_OPEN breakers with lazy creation.
// Purpose: Stop dispatching to a failing tool until its recovery window elapses.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The registry holds one breaker per tool, created on first reference. Each
//! breaker sits behind its own mutex, so every transition for a tool is
//! applied atomically and tools never contend with each other.
//!
//! State machine:
//! - CLOSED opens after `failure_threshold` consecutive failures.
//! - OPEN rejects every attempt until `recovery_timeout` has elapsed since it
//!   opened; the first attempt after that moves it to HALF_OPEN.
//! - HALF_OPEN closes on the first success and reopens on any failure,
//!   restarting the recovery window.
//!
//! Breaker state is volatile and starts CLOSED in every process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::BreakerPolicy;
use crate::core::BreakerSettings;
use crate::core::ControlError;
use crate::core::Timestamp;
use crate::core::ToolName;
use crate::interfaces::Clock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected.
    Open,
    /// Calls are admitted as recovery trial calls.
    HalfOpen,
}

impl BreakerState {
    /// Returns the canonical label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

/// Result of asking a breaker for admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed.
    Permitted,
    /// The breaker is open; the tool must not be invoked.
    Rejected(ControlError),
}

/// State change produced by a breaker operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerTransition {
    /// Tool whose breaker changed.
    pub tool: ToolName,
    /// Previous state.
    pub from: BreakerState,
    /// New state.
    pub to: BreakerState,
    /// Consecutive failures at the time of the change.
    pub consecutive_failures: u32,
    /// Time of the change.
    pub at: Timestamp,
}

/// Admission decision plus any transition it caused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// Admission decision.
    pub admission: Admission,
    /// OPEN to HALF_OPEN transition triggered by this attempt.
    pub transition: Option<BreakerTransition>,
}

/// Read-only view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Tool name.
    pub tool: ToolName,
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failures.
    pub consecutive_failures: u32,
    /// Configured threshold.
    pub failure_threshold: u32,
    /// Configured recovery window in milliseconds.
    pub recovery_timeout_ms: u64,
    /// Time of the last failure.
    pub last_failure_at: Option<Timestamp>,
    /// Time the breaker last opened.
    pub opened_at: Option<Timestamp>,
    /// True when an OPEN breaker would admit a trial call now.
    pub trial_ready: bool,
    /// Lifetime failure count.
    pub total_failures: u64,
    /// Lifetime success count.
    pub total_successes: u64,
}

/// Circuit breaker registry errors.
#[derive(Debug, Error)]
pub enum BreakerError {
    /// A breaker lock was poisoned.
    #[error("circuit breaker state poisoned: {0}")]
    Poisoned(String),
}

// ============================================================================
// SECTION: Breaker
// ============================================================================

/// Mutable state for one tool's breaker.
#[derive(Debug)]
struct CircuitBreaker {
    /// Current state.
    state: BreakerState,
    /// Consecutive failures since the last success.
    consecutive_failures: u32,
    /// Time of the last failure.
    last_failure_at: Option<Timestamp>,
    /// Time the breaker last opened.
    opened_at: Option<Timestamp>,
    /// Threshold and recovery window.
    policy: BreakerPolicy,
    /// Lifetime failure count.
    total_failures: u64,
    /// Lifetime success count.
    total_successes: u64,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    const fn new(policy: BreakerPolicy) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            opened_at: None,
            policy,
            total_failures: 0,
            total_successes: 0,
        }
    }

    /// Returns the remaining recovery wait at `now`, or `None` when elapsed.
    fn remaining_wait(&self, now: Timestamp) -> Option<u64> {
        let opened_at = self.opened_at?;
        let elapsed = now.duration_since(opened_at);
        let remaining = self.policy.recovery_timeout.saturating_sub(elapsed);
        if remaining.is_zero() {
            None
        } else {
            Some(u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX))
        }
    }

    /// Moves to `to`, returning the transition when the state changed.
    fn transition(
        &mut self,
        tool: &ToolName,
        to: BreakerState,
        now: Timestamp,
    ) -> Option<BreakerTransition> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        Some(BreakerTransition {
            tool: tool.clone(),
            from,
            to,
            consecutive_failures: self.consecutive_failures,
            at: now,
        })
    }

    /// Builds a snapshot at `now`.
    fn snapshot(&self, tool: &ToolName, now: Timestamp) -> BreakerSnapshot {
        BreakerSnapshot {
            tool: tool.clone(),
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            failure_threshold: self.policy.failure_threshold.get(),
            recovery_timeout_ms: u64::try_from(self.policy.recovery_timeout.as_millis())
                .unwrap_or(u64::MAX),
            last_failure_at: self.last_failure_at,
            opened_at: self.opened_at,
            trial_ready: self.state == BreakerState::Open && self.remaining_wait(now).is_none(),
            total_failures: self.total_failures,
            total_successes: self.total_successes,
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Shared handle to one breaker.
type BreakerHandle = Arc<Mutex<CircuitBreaker>>;

/// Registry of per-tool circuit breakers.
pub struct CircuitBreakerRegistry {
    /// Thresholds and per-tool overrides.
    settings: BreakerSettings,
    /// Breakers by tool, created lazily.
    breakers: RwLock<BTreeMap<ToolName, BreakerHandle>>,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(settings: BreakerSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            breakers: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Asks whether `tool` may be attempted now.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Poisoned`] when breaker state is unavailable.
    pub fn attempt(&self, tool: &ToolName) -> Result<AttemptOutcome, BreakerError> {
        let handle = self.breaker(tool)?;
        let now = self.clock.now();
        let mut breaker = lock_breaker(&handle, tool)?;
        let outcome = match breaker.state {
            BreakerState::Closed | BreakerState::HalfOpen => AttemptOutcome {
                admission: Admission::Permitted,
                transition: None,
            },
            BreakerState::Open => match breaker.remaining_wait(now) {
                Some(remaining_ms) => AttemptOutcome {
                    admission: Admission::Rejected(ControlError::circuit_open(tool, remaining_ms)),
                    transition: None,
                },
                None => AttemptOutcome {
                    admission: Admission::Permitted,
                    transition: breaker.transition(tool, BreakerState::HalfOpen, now),
                },
            },
        };
        drop(breaker);
        Ok(outcome)
    }

    /// Records a successful call.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Poisoned`] when breaker state is unavailable.
    pub fn record_success(
        &self,
        tool: &ToolName,
    ) -> Result<Option<BreakerTransition>, BreakerError> {
        let handle = self.breaker(tool)?;
        let now = self.clock.now();
        let mut breaker = lock_breaker(&handle, tool)?;
        breaker.total_successes = breaker.total_successes.saturating_add(1);
        let transition = match breaker.state {
            BreakerState::Closed => {
                breaker.consecutive_failures = 0;
                None
            }
            BreakerState::HalfOpen => {
                breaker.consecutive_failures = 0;
                breaker.opened_at = None;
                breaker.transition(tool, BreakerState::Closed, now)
            }
            // Late success from a call admitted before the breaker opened.
            BreakerState::Open => None,
        };
        drop(breaker);
        Ok(transition)
    }

    /// Records a failed call.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Poisoned`] when breaker state is unavailable.
    pub fn record_failure(
        &self,
        tool: &ToolName,
    ) -> Result<Option<BreakerTransition>, BreakerError> {
        let handle = self.breaker(tool)?;
        let now = self.clock.now();
        let mut breaker = lock_breaker(&handle, tool)?;
        breaker.total_failures = breaker.total_failures.saturating_add(1);
        breaker.consecutive_failures = breaker.consecutive_failures.saturating_add(1);
        breaker.last_failure_at = Some(now);
        let transition = match breaker.state {
            BreakerState::Closed => {
                if breaker.consecutive_failures >= breaker.policy.failure_threshold.get() {
                    breaker.opened_at = Some(now);
                    breaker.transition(tool, BreakerState::Open, now)
                } else {
                    None
                }
            }
            BreakerState::HalfOpen => {
                breaker.opened_at = Some(now);
                breaker.transition(tool, BreakerState::Open, now)
            }
            BreakerState::Open => None,
        };
        drop(breaker);
        Ok(transition)
    }

    /// Forces a breaker back to CLOSED. Operator action.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Poisoned`] when breaker state is unavailable.
    pub fn reset(&self, tool: &ToolName) -> Result<Option<BreakerTransition>, BreakerError> {
        let handle = self.breaker(tool)?;
        let now = self.clock.now();
        let mut breaker = lock_breaker(&handle, tool)?;
        breaker.consecutive_failures = 0;
        breaker.opened_at = None;
        let transition = breaker.transition(tool, BreakerState::Closed, now);
        drop(breaker);
        Ok(transition)
    }

    /// Returns snapshots of every known breaker, ordered by tool name.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Poisoned`] when breaker state is unavailable.
    pub fn snapshot(&self) -> Result<Vec<BreakerSnapshot>, BreakerError> {
        let now = self.clock.now();
        let handles: Vec<(ToolName, BreakerHandle)> = {
            let guard = self
                .breakers
                .read()
                .map_err(|_| BreakerError::Poisoned("registry".to_string()))?;
            guard.iter().map(|(tool, handle)| (tool.clone(), Arc::clone(handle))).collect()
        };
        handles
            .iter()
            .map(|(tool, handle)| Ok(lock_breaker(handle, tool)?.snapshot(tool, now)))
            .collect()
    }

    /// Returns the tools whose breakers are currently OPEN.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Poisoned`] when breaker state is unavailable.
    pub fn open_circuits(&self) -> Result<Vec<ToolName>, BreakerError> {
        Ok(self
            .snapshot()?
            .into_iter()
            .filter(|snapshot| snapshot.state == BreakerState::Open)
            .map(|snapshot| snapshot.tool)
            .collect())
    }

    /// Returns the breaker for `tool`, creating it on first reference.
    fn breaker(&self, tool: &ToolName) -> Result<BreakerHandle, BreakerError> {
        {
            let guard = self
                .breakers
                .read()
                .map_err(|_| BreakerError::Poisoned("registry".to_string()))?;
            if let Some(handle) = guard.get(tool) {
                return Ok(Arc::clone(handle));
            }
        }
        let mut guard =
            self.breakers.write().map_err(|_| BreakerError::Poisoned("registry".to_string()))?;
        let handle = guard
            .entry(tool.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(CircuitBreaker::new(self.settings.policy_for(tool))))
            })
            .clone();
        drop(guard);
        Ok(handle)
    }
}

/// Locks one breaker, mapping poisoning to an error.
fn lock_breaker<'a>(
    handle: &'a BreakerHandle,
    tool: &ToolName,
) -> Result<std::sync::MutexGuard<'a, CircuitBreaker>, BreakerError> {
    handle.lock().map_err(|_| BreakerError::Poisoned(tool.to_string()))
}
