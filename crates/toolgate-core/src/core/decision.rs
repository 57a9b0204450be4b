// crates/toolgate-core/src/core/decision.rs
// ============================================================================
// Module: Toolgate Authority Decisions
// Description: Authority outcomes, decision records, and confirmation requests.
// Purpose: Provide immutable records produced by authority checks.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every authority check produces one [`AuthorityDecision`]. Decisions are
//! never mutated after creation and are always appended to the audit log.
//! [`PendingConfirmation`] describes a call waiting on an external approver.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ConfirmationId;
use crate::core::identifiers::GrantId;
use crate::core::identifiers::ToolName;
use crate::core::identifiers::TurnId;
use crate::core::permission::PermissionLevel;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Outcome of an authority check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorityOutcome {
    /// An active grant authorizes the call.
    Allow,
    /// The call is refused.
    Deny,
    /// The call needs explicit approval before it may proceed.
    ConfirmRequired,
    /// Approval was refused, timed out, or was cancelled.
    ConfirmDenied,
}

/// Reason attached to non-allow outcomes and to allow-after-confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// No grant covers the tool.
    NoGrant,
    /// The only covering grants have expired.
    GrantExpired,
    /// The only covering grants were revoked.
    GrantRevoked,
    /// The only covering grants were single-use and already used.
    GrantConsumed,
    /// A covering grant exists but at an insufficient level.
    InsufficientLevel,
    /// The level is blocked outright by configuration.
    LevelBlocked,
    /// Grants exist for a one-time scope consumed by this call.
    OneTimeConsumed,
    /// Approver approved the call.
    ConfirmationApproved,
    /// Approver refused the call.
    ConfirmationDenied,
    /// The confirmation window elapsed.
    ConfirmationTimedOut,
    /// The turn ended while the confirmation was pending.
    ConfirmationCancelled,
}

// ============================================================================
// SECTION: Decision Record
// ============================================================================

/// Immutable record of one authority check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityDecision {
    /// Turn the check belongs to.
    pub turn_id: TurnId,
    /// Tool being authorized.
    pub tool: ToolName,
    /// Level the tool requires.
    pub level: PermissionLevel,
    /// Check outcome.
    pub outcome: AuthorityOutcome,
    /// Reason for the outcome, when one applies.
    pub reason: Option<DecisionReason>,
    /// Grant that authorized the call.
    pub matched_grant: Option<GrantId>,
    /// Decision time.
    pub decided_at: Timestamp,
}

impl AuthorityDecision {
    /// Returns true when the decision authorizes the call.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.outcome == AuthorityOutcome::Allow
    }
}

// ============================================================================
// SECTION: Confirmations
// ============================================================================

/// Call awaiting an external approval decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    /// Confirmation identifier.
    pub id: ConfirmationId,
    /// Tool awaiting approval.
    pub tool: ToolName,
    /// Call parameters shown to the approver.
    pub params: Value,
    /// Level requiring confirmation.
    pub level: PermissionLevel,
    /// Turn the call belongs to.
    pub turn_id: TurnId,
    /// Creation time.
    pub requested_at: Timestamp,
    /// Time after which the confirmation resolves to denial.
    pub deadline: Timestamp,
}

/// Decision reported by an approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Approve the call and issue a session grant.
    Approve,
    /// Refuse the call.
    Deny,
}

/// Resolution of a confirmation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// Approved; the call proceeds under the new session grant.
    Approved {
        /// Session grant issued by the approval.
        grant: GrantId,
    },
    /// Explicitly refused.
    Denied,
    /// No decision before the deadline.
    TimedOut,
    /// The owning turn was cancelled before a decision arrived.
    Cancelled,
}

impl ConfirmationOutcome {
    /// Returns the decision reason recorded for this outcome.
    #[must_use]
    pub const fn reason(&self) -> DecisionReason {
        match self {
            Self::Approved {
                ..
            } => DecisionReason::ConfirmationApproved,
            Self::Denied => DecisionReason::ConfirmationDenied,
            Self::TimedOut => DecisionReason::ConfirmationTimedOut,
            Self::Cancelled => DecisionReason::ConfirmationCancelled,
        }
    }
}
