// crates/toolgate-core/src/runtime/degradation.rs
// ============================================================================
// Module: Toolgate Degradation Manager
// Description: Per-turn failure budgets, remediation policy, and turn ledgers.
// Purpose: Decide whether a classified failure is contained or ends the turn.
// Dependencies: crate::core, tokio-util
// ============================================================================

//! ## Overview
//! Each turn owns a ledger: failure counters, the tools that succeeded,
//! failed, were skipped or degraded, an abort reason once aborted, and a
//! cancellation token that releases any confirmation still pending.
//!
//! [`DegradationManager::on_failure`] first asks the policy table for a
//! remediation. A retry within its bound is resolved inside the call and
//! leaves the ledger untouched. Any other outcome is the call's final
//! failure: both counters are incremented once, then the turn aborts when
//! the total reaches its cap, when the consecutive count reaches its cap, or
//! when the failed call was a hard dependency. The table is an exhaustive
//! match over (category, level) with optional overrides.
//!
//! Only skipped tools are unavailable to later steps. A degraded tool
//! produced a usable fallback result.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::BudgetSettings;
use crate::core::ControlError;
use crate::core::DegradationStrategy;
use crate::core::ErrorCategory;
use crate::core::PermissionLevel;
use crate::core::PolicyOverride;
use crate::core::RetryPolicy;
use crate::core::ToolCall;
use crate::core::ToolName;
use crate::core::TurnId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Reason a turn was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// A failure cap was reached.
    BudgetExceeded {
        /// Total failures at abort.
        total_failures: u32,
        /// Consecutive failures at abort.
        consecutive_failures: u32,
    },
    /// A tool that later steps depend on failed.
    DependencyFailed {
        /// Failed tool.
        tool: ToolName,
    },
    /// A call depends on a tool that failed or was skipped earlier.
    DependencyUnavailable {
        /// Call that could not run.
        tool: ToolName,
        /// Missing dependency.
        dependency: ToolName,
    },
    /// Policy selected fail-fast for the failure.
    FailFast {
        /// Tool that failed.
        tool: ToolName,
        /// Failure category.
        category: ErrorCategory,
    },
}

impl AbortReason {
    /// Returns a one-line explanation suitable for the user.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::BudgetExceeded {
                total_failures,
                consecutive_failures,
            } => format!(
                "failure budget exhausted ({total_failures} total, {consecutive_failures} \
                 consecutive)"
            ),
            Self::DependencyFailed {
                tool,
            } => format!("{tool} failed and later steps depend on it"),
            Self::DependencyUnavailable {
                tool,
                dependency,
            } => format!("{tool} depends on {dependency}, which did not complete"),
            Self::FailFast {
                tool,
                category,
            } => format!("{tool} failed with {category} and policy is fail-fast"),
        }
    }
}

/// Remediation for a contained failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Remediation {
    /// Re-attempt after `delay`.
    Retry {
        /// Retry number, starting at 1.
        attempt: u32,
        /// Delay before the re-attempt.
        delay: Duration,
    },
    /// Continue the turn without this tool's result.
    Skip,
    /// Substitute the tool's fallback result when it has one.
    Degrade,
}

/// Outcome of [`DegradationManager::on_failure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The failure is contained; the turn continues.
    Continue(Remediation),
    /// The turn is over.
    AbortTurn(AbortReason),
}

/// Inputs describing one classified failure.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    /// Turn the failure belongs to.
    pub turn_id: &'a TurnId,
    /// Failed tool.
    pub tool: &'a ToolName,
    /// Tool's declared level.
    pub level: PermissionLevel,
    /// Classified error.
    pub error: &'a ControlError,
    /// True when later steps depend on this call.
    pub is_dependency: bool,
    /// Retries already spent on this call.
    pub retries_used: u32,
}

/// Decision on whether a call may be dispatched in its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchGate {
    /// Dispatch may proceed.
    Proceed,
    /// The turn was already aborted; nothing may be dispatched.
    TurnAborted(AbortReason),
    /// This call aborted the turn because a dependency is unavailable.
    DependencyUnavailable(AbortReason),
}

/// Recorded failure of one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    /// Failed tool.
    pub tool: ToolName,
    /// Failure category.
    pub category: ErrorCategory,
    /// Failure detail.
    pub message: String,
}

/// What happened during a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSummary {
    /// Turn identifier.
    pub turn_id: TurnId,
    /// Tools that completed.
    pub succeeded: Vec<ToolName>,
    /// Failures in order of occurrence.
    pub failed: Vec<FailedStep>,
    /// Tools whose results were skipped.
    pub skipped: Vec<ToolName>,
    /// Tools that returned a fallback result.
    pub degraded: Vec<ToolName>,
    /// Abort reason, when the turn was aborted.
    pub aborted: Option<AbortReason>,
    /// Total failures.
    pub total_failures: u32,
    /// Consecutive failures at the end of the turn.
    pub consecutive_failures: u32,
}

/// Read-only budget state for one active turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Turn identifier.
    pub turn_id: TurnId,
    /// Total failures.
    pub total_failures: u32,
    /// Consecutive failures.
    pub consecutive_failures: u32,
    /// Total failure cap.
    pub max_total_failures: u32,
    /// Consecutive failure cap.
    pub max_consecutive_failures: u32,
    /// True once the turn has aborted.
    pub aborted: bool,
}

/// Degradation manager errors.
#[derive(Debug, Error)]
pub enum DegradationError {
    /// Turn ledger lock was poisoned.
    #[error("turn ledger mutex poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Turn Ledger
// ============================================================================

/// Mutable per-turn state.
#[derive(Debug)]
struct TurnLedger {
    /// Total failures.
    total_failures: u32,
    /// Consecutive failures since the last success.
    consecutive_failures: u32,
    /// Completed tools.
    succeeded: Vec<ToolName>,
    /// Failures in order.
    failed: Vec<FailedStep>,
    /// Skipped tools.
    skipped: Vec<ToolName>,
    /// Degraded tools.
    degraded: Vec<ToolName>,
    /// Tools whose results are unavailable to later steps.
    unavailable: BTreeSet<ToolName>,
    /// Abort reason once aborted.
    aborted: Option<AbortReason>,
    /// Token cancelled when the turn aborts or ends.
    cancel: CancellationToken,
}

impl TurnLedger {
    /// Creates an empty ledger.
    fn new() -> Self {
        Self {
            total_failures: 0,
            consecutive_failures: 0,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            degraded: Vec::new(),
            unavailable: BTreeSet::new(),
            aborted: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Marks the turn aborted and releases pending waits. First reason wins.
    fn abort(&mut self, reason: AbortReason) -> AbortReason {
        let reason = self.aborted.get_or_insert(reason).clone();
        self.cancel.cancel();
        reason
    }

    /// Builds the summary for this ledger.
    fn summary(&self, turn_id: &TurnId) -> TurnSummary {
        TurnSummary {
            turn_id: turn_id.clone(),
            succeeded: self.succeeded.clone(),
            failed: self.failed.clone(),
            skipped: self.skipped.clone(),
            degraded: self.degraded.clone(),
            aborted: self.aborted.clone(),
            total_failures: self.total_failures,
            consecutive_failures: self.consecutive_failures,
        }
    }
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Failure budget and degradation policy for all active turns.
pub struct DegradationManager {
    /// Failure caps.
    budget: BudgetSettings,
    /// Retry bounds.
    retry: RetryPolicy,
    /// Policy table overrides.
    overrides: BTreeMap<(ErrorCategory, PermissionLevel), DegradationStrategy>,
    /// Active turn ledgers.
    turns: Mutex<BTreeMap<TurnId, TurnLedger>>,
}

impl DegradationManager {
    /// Creates a manager. Later overrides replace earlier ones for the same cell.
    #[must_use]
    pub fn new(budget: BudgetSettings, retry: RetryPolicy, overrides: &[PolicyOverride]) -> Self {
        Self {
            budget,
            retry,
            overrides: overrides
                .iter()
                .map(|entry| ((entry.category, entry.level), entry.strategy))
                .collect(),
            turns: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the default remediation strategy for a failure.
    #[must_use]
    pub const fn default_strategy(
        category: ErrorCategory,
        level: PermissionLevel,
    ) -> DegradationStrategy {
        use DegradationStrategy::FailFast;
        use DegradationStrategy::Retry;
        use DegradationStrategy::Skip;
        use ErrorCategory as C;
        use PermissionLevel as L;
        match (category, level) {
            (C::PermissionDenied | C::BudgetExceeded | C::Internal, _)
            | (
                C::Validation | C::CircuitOpen | C::ToolExecution | C::Timeout | C::ExternalService,
                L::Write | L::Execute | L::Admin,
            ) => FailFast,
            (C::Validation | C::CircuitOpen, L::Read | L::Network) => Skip,
            (C::ToolExecution | C::Timeout | C::ExternalService, L::Read | L::Network) => Retry,
        }
    }

    /// Returns the strategy in force for a failure, applying overrides.
    #[must_use]
    pub fn strategy_for(&self, category: ErrorCategory, level: PermissionLevel) -> DegradationStrategy {
        self.overrides
            .get(&(category, level))
            .copied()
            .unwrap_or_else(|| Self::default_strategy(category, level))
    }

    /// Opens a turn ledger, or returns the existing one's cancellation token.
    ///
    /// # Errors
    ///
    /// Returns [`DegradationError::Poisoned`] when ledger state is unavailable.
    pub fn begin_turn(&self, turn_id: &TurnId) -> Result<CancellationToken, DegradationError> {
        let mut turns = self.lock()?;
        let token = turns.entry(turn_id.clone()).or_insert_with(TurnLedger::new).cancel.clone();
        drop(turns);
        Ok(token)
    }

    /// Checks whether a call may be dispatched in its turn.
    ///
    /// Aborts the turn when the call depends on a tool whose result is unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`DegradationError::Poisoned`] when ledger state is unavailable.
    pub fn gate_dispatch(
        &self,
        turn_id: &TurnId,
        call: &ToolCall,
    ) -> Result<DispatchGate, DegradationError> {
        let mut turns = self.lock()?;
        let ledger = turns.entry(turn_id.clone()).or_insert_with(TurnLedger::new);
        if let Some(reason) = &ledger.aborted {
            return Ok(DispatchGate::TurnAborted(reason.clone()));
        }
        let missing = call.depends_on.iter().find(|dep| ledger.unavailable.contains(*dep)).cloned();
        let gate = match missing {
            Some(dependency) => {
                DispatchGate::DependencyUnavailable(ledger.abort(AbortReason::DependencyUnavailable {
                    tool: call.tool.clone(),
                    dependency,
                }))
            }
            None => DispatchGate::Proceed,
        };
        drop(turns);
        Ok(gate)
    }

    /// Records a successful call, resetting the consecutive counter.
    ///
    /// # Errors
    ///
    /// Returns [`DegradationError::Poisoned`] when ledger state is unavailable.
    pub fn on_success(&self, turn_id: &TurnId, tool: &ToolName) -> Result<(), DegradationError> {
        let mut turns = self.lock()?;
        let ledger = turns.entry(turn_id.clone()).or_insert_with(TurnLedger::new);
        ledger.consecutive_failures = 0;
        ledger.succeeded.push(tool.clone());
        ledger.unavailable.remove(tool);
        drop(turns);
        Ok(())
    }

    /// Records a classified failure and decides its disposition.
    ///
    /// A retry leaves the ledger untouched; every other disposition counts
    /// the call once against the turn's budget.
    ///
    /// # Errors
    ///
    /// Returns [`DegradationError::Poisoned`] when ledger state is unavailable.
    pub fn on_failure(
        &self,
        ctx: FailureContext<'_>,
    ) -> Result<FailureDisposition, DegradationError> {
        let strategy = self.strategy_for(ctx.error.category, ctx.level);
        let mut turns = self.lock()?;
        let ledger = turns.entry(ctx.turn_id.clone()).or_insert_with(TurnLedger::new);
        if let Some(reason) = &ledger.aborted {
            let reason = reason.clone();
            drop(turns);
            return Ok(FailureDisposition::AbortTurn(reason));
        }
        let remediation = self.remediate(strategy, &ctx);
        if let Ok(retry @ Remediation::Retry {
            ..
        }) = remediation
        {
            drop(turns);
            return Ok(FailureDisposition::Continue(retry));
        }

        ledger.total_failures = ledger.total_failures.saturating_add(1);
        ledger.consecutive_failures = ledger.consecutive_failures.saturating_add(1);
        ledger.failed.push(FailedStep {
            tool: ctx.tool.clone(),
            category: ctx.error.category,
            message: ctx.error.message.clone(),
        });
        let disposition = if ledger.total_failures >= self.budget.max_total_failures.get()
            || ledger.consecutive_failures >= self.budget.max_consecutive_failures.get()
        {
            FailureDisposition::AbortTurn(ledger.abort(AbortReason::BudgetExceeded {
                total_failures: ledger.total_failures,
                consecutive_failures: ledger.consecutive_failures,
            }))
        } else if ctx.is_dependency {
            FailureDisposition::AbortTurn(ledger.abort(AbortReason::DependencyFailed {
                tool: ctx.tool.clone(),
            }))
        } else {
            match remediation {
                Ok(Remediation::Skip) => {
                    ledger.skipped.push(ctx.tool.clone());
                    ledger.unavailable.insert(ctx.tool.clone());
                    FailureDisposition::Continue(Remediation::Skip)
                }
                Ok(other) => FailureDisposition::Continue(other),
                Err(reason) => FailureDisposition::AbortTurn(ledger.abort(reason)),
            }
        };
        if matches!(disposition, FailureDisposition::AbortTurn(_)) {
            ledger.unavailable.insert(ctx.tool.clone());
        }
        drop(turns);
        Ok(disposition)
    }

    /// Returns the abort reason of a turn, when it has aborted.
    ///
    /// # Errors
    ///
    /// Returns [`DegradationError::Poisoned`] when ledger state is unavailable.
    pub fn aborted(&self, turn_id: &TurnId) -> Result<Option<AbortReason>, DegradationError> {
        Ok(self.lock()?.get(turn_id).and_then(|ledger| ledger.aborted.clone()))
    }

    /// Records that a degrade remediation produced a fallback result.
    ///
    /// # Errors
    ///
    /// Returns [`DegradationError::Poisoned`] when ledger state is unavailable.
    pub fn on_degraded(&self, turn_id: &TurnId, tool: &ToolName) -> Result<(), DegradationError> {
        let mut turns = self.lock()?;
        let ledger = turns.entry(turn_id.clone()).or_insert_with(TurnLedger::new);
        ledger.degraded.push(tool.clone());
        ledger.unavailable.remove(tool);
        drop(turns);
        Ok(())
    }

    /// Records that a call's result is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DegradationError::Poisoned`] when ledger state is unavailable.
    pub fn on_skip(&self, turn_id: &TurnId, tool: &ToolName) -> Result<(), DegradationError> {
        let mut turns = self.lock()?;
        let ledger = turns.entry(turn_id.clone()).or_insert_with(TurnLedger::new);
        ledger.skipped.push(tool.clone());
        ledger.unavailable.insert(tool.clone());
        drop(turns);
        Ok(())
    }

    /// Aborts a turn and releases its pending confirmations.
    ///
    /// # Errors
    ///
    /// Returns [`DegradationError::Poisoned`] when ledger state is unavailable.
    pub fn abort_turn(
        &self,
        turn_id: &TurnId,
        reason: AbortReason,
    ) -> Result<AbortReason, DegradationError> {
        let mut turns = self.lock()?;
        let reason = turns.entry(turn_id.clone()).or_insert_with(TurnLedger::new).abort(reason);
        drop(turns);
        Ok(reason)
    }

    /// Returns the current summary of a turn.
    ///
    /// # Errors
    ///
    /// Returns [`DegradationError::Poisoned`] when ledger state is unavailable.
    pub fn summary(&self, turn_id: &TurnId) -> Result<Option<TurnSummary>, DegradationError> {
        Ok(self.lock()?.get(turn_id).map(|ledger| ledger.summary(turn_id)))
    }

    /// Closes a turn, returning its final summary.
    ///
    /// # Errors
    ///
    /// Returns [`DegradationError::Poisoned`] when ledger state is unavailable.
    pub fn end_turn(&self, turn_id: &TurnId) -> Result<Option<TurnSummary>, DegradationError> {
        let ledger = self.lock()?.remove(turn_id);
        Ok(ledger.map(|ledger| {
            ledger.cancel.cancel();
            ledger.summary(turn_id)
        }))
    }

    /// Returns budget snapshots for every active turn.
    ///
    /// # Errors
    ///
    /// Returns [`DegradationError::Poisoned`] when ledger state is unavailable.
    pub fn snapshot(&self) -> Result<Vec<BudgetSnapshot>, DegradationError> {
        let turns = self.lock()?;
        Ok(turns
            .iter()
            .map(|(turn_id, ledger)| BudgetSnapshot {
                turn_id: turn_id.clone(),
                total_failures: ledger.total_failures,
                consecutive_failures: ledger.consecutive_failures,
                max_total_failures: self.budget.max_total_failures.get(),
                max_consecutive_failures: self.budget.max_consecutive_failures.get(),
                aborted: ledger.aborted.is_some(),
            })
            .collect())
    }

    /// Maps a strategy to a remediation, or to an abort reason.
    fn remediate(
        &self,
        strategy: DegradationStrategy,
        ctx: &FailureContext<'_>,
    ) -> Result<Remediation, AbortReason> {
        let fail_fast = || AbortReason::FailFast {
            tool: ctx.tool.clone(),
            category: ctx.error.category,
        };
        match strategy {
            DegradationStrategy::FailFast => Err(fail_fast()),
            DegradationStrategy::Retry => {
                let rule = self.retry.rule_for(ctx.error.category);
                if ctx.retries_used < rule.max_retries {
                    Ok(Remediation::Retry {
                        attempt: ctx.retries_used.saturating_add(1),
                        delay: rule.delay,
                    })
                } else if ctx.level.is_critical() {
                    Err(fail_fast())
                } else {
                    Ok(Remediation::Skip)
                }
            }
            DegradationStrategy::Skip => Ok(Remediation::Skip),
            DegradationStrategy::Degrade => Ok(Remediation::Degrade),
        }
    }

    /// Locks the ledger map.
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<TurnId, TurnLedger>>, DegradationError> {
        self.turns.lock().map_err(|_| DegradationError::Poisoned)
    }
}
