// crates/toolgate-core/src/core/settings.rs
// ============================================================================
// Module: Toolgate Control Plane Settings
// Description: Typed thresholds, timeouts, and policy inputs for the runtime.
// Purpose: Carry validated configuration into breaker, authority, and governor.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Settings are plain data with defaults matching the documented behavior:
//! breakers open after 5 consecutive failures and recover after 30 s, turns
//! abort at 3 total or 2 consecutive failures, confirmations time out after
//! 60 s, and tools time out after 30 s. Thresholds are `NonZeroU32`, so a zero
//! threshold cannot be represented; [`ControlPlaneSettings::validate`] rejects
//! the remaining invalid combinations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::errors::ErrorCategory;
use crate::core::identifiers::ToolName;
use crate::core::permission::PermissionLevel;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default consecutive failures before a breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: NonZeroU32 = non_zero(5);
/// Default breaker recovery window.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);
/// Default per-turn total failure cap.
pub const DEFAULT_MAX_TOTAL_FAILURES: NonZeroU32 = non_zero(3);
/// Default per-turn consecutive failure cap.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: NonZeroU32 = non_zero(2);
/// Default confirmation window.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);
/// Default tool execution timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on any tool execution timeout.
pub const MAX_TOOL_TIMEOUT: Duration = Duration::from_secs(600);

/// Builds a non-zero constant, clamping zero to one.
const fn non_zero(value: u32) -> NonZeroU32 {
    match NonZeroU32::new(value) {
        Some(value) => value,
        None => NonZeroU32::MIN,
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Settings validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Settings are internally inconsistent or out of range.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Circuit Breaker Settings
// ============================================================================

/// Threshold and recovery window for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerPolicy {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: NonZeroU32,
    /// Time an open breaker waits before admitting a trial call.
    pub recovery_timeout: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
        }
    }
}

/// Breaker settings with per-tool overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Policy for tools without an override.
    pub default: BreakerPolicy,
    /// Tool-specific policies.
    pub per_tool: BTreeMap<ToolName, BreakerPolicy>,
}

impl BreakerSettings {
    /// Returns the policy in force for `tool`.
    #[must_use]
    pub fn policy_for(&self, tool: &ToolName) -> BreakerPolicy {
        self.per_tool.get(tool).copied().unwrap_or(self.default)
    }
}

// ============================================================================
// SECTION: Budget and Retry Settings
// ============================================================================

/// Per-turn failure caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSettings {
    /// Total failures after which the turn aborts.
    pub max_total_failures: NonZeroU32,
    /// Consecutive failures after which the turn aborts.
    pub max_consecutive_failures: NonZeroU32,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            max_total_failures: DEFAULT_MAX_TOTAL_FAILURES,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

/// Retry bound and delay for one error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRule {
    /// Maximum re-attempts within one call.
    pub max_retries: u32,
    /// Delay before each re-attempt.
    pub delay: Duration,
}

impl RetryRule {
    /// Rule that never retries.
    pub const NEVER: Self = Self {
        max_retries: 0,
        delay: Duration::ZERO,
    };
}

/// Bounded retry policy keyed by transient error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Rule for tool execution failures.
    pub tool_execution: RetryRule,
    /// Rule for external service failures.
    pub external_service: RetryRule,
    /// Rule for timeouts.
    pub timeout: RetryRule,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tool_execution: RetryRule {
                max_retries: 2,
                delay: Duration::from_secs(1),
            },
            external_service: RetryRule {
                max_retries: 3,
                delay: Duration::from_secs(1),
            },
            timeout: RetryRule {
                max_retries: 1,
                delay: Duration::from_secs(2),
            },
        }
    }
}

impl RetryPolicy {
    /// Returns the retry rule for a category.
    #[must_use]
    pub const fn rule_for(&self, category: ErrorCategory) -> RetryRule {
        match category {
            ErrorCategory::ToolExecution => self.tool_execution,
            ErrorCategory::ExternalService => self.external_service,
            ErrorCategory::Timeout => self.timeout,
            ErrorCategory::PermissionDenied
            | ErrorCategory::Validation
            | ErrorCategory::CircuitOpen
            | ErrorCategory::BudgetExceeded
            | ErrorCategory::Internal => RetryRule::NEVER,
        }
    }
}

// ============================================================================
// SECTION: Degradation Settings
// ============================================================================

/// Remediation selected for a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationStrategy {
    /// Abort the turn.
    FailFast,
    /// Re-attempt within the retry bound.
    Retry,
    /// Continue the turn without this tool's result.
    Skip,
    /// Substitute the tool's lower-fidelity fallback.
    Degrade,
}

impl DegradationStrategy {
    /// Returns the canonical label for the strategy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailFast => "fail_fast",
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Degrade => "degrade",
        }
    }
}

/// Replacement strategy for one (category, level) cell of the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverride {
    /// Error category.
    pub category: ErrorCategory,
    /// Permission level of the failed tool.
    pub level: PermissionLevel,
    /// Strategy to apply.
    pub strategy: DegradationStrategy,
}

// ============================================================================
// SECTION: Authority and Timing Settings
// ============================================================================

/// Authority policy inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritySettings {
    /// Levels denied regardless of grants.
    pub always_blocked: BTreeSet<PermissionLevel>,
    /// Levels that route to the confirmation gate when no grant exists.
    pub confirmable: BTreeSet<PermissionLevel>,
}

impl Default for AuthoritySettings {
    fn default() -> Self {
        Self {
            always_blocked: BTreeSet::from([PermissionLevel::Admin]),
            confirmable: BTreeSet::from([
                PermissionLevel::Write,
                PermissionLevel::Execute,
                PermissionLevel::Network,
            ]),
        }
    }
}

/// Aggregate settings for one control plane instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPlaneSettings {
    /// Circuit breaker settings.
    pub breaker: BreakerSettings,
    /// Failure budget caps.
    pub budget: BudgetSettings,
    /// Retry bounds.
    pub retry: RetryPolicy,
    /// Degradation table overrides.
    pub policy_overrides: Vec<PolicyOverride>,
    /// Authority policy.
    pub authority: AuthoritySettings,
    /// Confirmation window.
    pub confirmation_timeout: Duration,
    /// Timeout for tools that do not declare one.
    pub default_tool_timeout: Duration,
}

impl Default for ControlPlaneSettings {
    fn default() -> Self {
        Self {
            breaker: BreakerSettings::default(),
            budget: BudgetSettings::default(),
            retry: RetryPolicy::default(),
            policy_overrides: Vec::new(),
            authority: AuthoritySettings::default(),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            default_tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl ControlPlaneSettings {
    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] when a value is out of range or policies conflict.
    pub fn validate(&self) -> Result<(), SettingsError> {
        validate_recovery(&self.breaker.default, "breaker")?;
        for (tool, policy) in &self.breaker.per_tool {
            validate_recovery(policy, &format!("breaker override for {tool}"))?;
        }
        if self.confirmation_timeout.is_zero() {
            return Err(SettingsError::Invalid(
                "confirmation timeout must be greater than zero".to_string(),
            ));
        }
        validate_tool_timeout(self.default_tool_timeout)?;
        if self.authority.confirmable.contains(&PermissionLevel::Read) {
            return Err(SettingsError::Invalid(
                "read level cannot require confirmation; read calls need an explicit grant"
                    .to_string(),
            ));
        }
        if let Some(level) =
            self.authority.confirmable.intersection(&self.authority.always_blocked).next()
        {
            return Err(SettingsError::Invalid(format!(
                "level {level} cannot be both blocked and confirmable"
            )));
        }
        for entry in &self.policy_overrides {
            if entry.level.is_critical()
                && matches!(entry.strategy, DegradationStrategy::Skip | DegradationStrategy::Degrade)
            {
                return Err(SettingsError::Invalid(format!(
                    "{} is not allowed for critical level {}",
                    entry.strategy.as_str(),
                    entry.level
                )));
            }
            if entry.strategy == DegradationStrategy::Retry && !entry.category.is_transient() {
                return Err(SettingsError::Invalid(format!(
                    "retry is not allowed for non-transient category {}",
                    entry.category
                )));
            }
        }
        Ok(())
    }
}

/// Validates a tool timeout against bounds.
///
/// # Errors
///
/// Returns [`SettingsError::Invalid`] when the timeout is zero or above [`MAX_TOOL_TIMEOUT`].
pub fn validate_tool_timeout(timeout: Duration) -> Result<(), SettingsError> {
    if timeout.is_zero() || timeout > MAX_TOOL_TIMEOUT {
        return Err(SettingsError::Invalid(format!(
            "tool timeout must be between 1 ms and {} s",
            MAX_TOOL_TIMEOUT.as_secs()
        )));
    }
    Ok(())
}

/// Rejects zero recovery windows.
fn validate_recovery(policy: &BreakerPolicy, label: &str) -> Result<(), SettingsError> {
    if policy.recovery_timeout.is_zero() {
        return Err(SettingsError::Invalid(format!(
            "{label} recovery timeout must be greater than zero"
        )));
    }
    Ok(())
}
