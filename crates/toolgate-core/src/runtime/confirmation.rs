// crates/toolgate-core/src/runtime/confirmation.rs
// ============================================================================
// Module: Toolgate Confirmation Gate
// Description: Suspend-and-resume approval of sensitive tool calls.
// Purpose: Hold WRITE, EXECUTE, and NETWORK calls until an approver decides.
// Dependencies: crate::core, crate::interfaces, tokio, tokio-util
// ============================================================================

//! ## Overview
//! A request registers a pending confirmation, then races the approver
//! against a cancellation token. The token is a child of the turn's token
//! and is also cancelled by a timer task when the window elapses, so
//! timeout, turn abort, and [`ConfirmationGate::cancel`] all release the
//! waiter through the same path. None of them ever approves.
//!
//! Approval issues a session grant scoped to the tool at the requested
//! level; later calls in the session pass the authority without asking again.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::ApprovalDecision;
use crate::core::AuditActor;
use crate::core::AuditDraft;
use crate::core::AuditEventType;
use crate::core::ConfirmationId;
use crate::core::ConfirmationOutcome;
use crate::core::GrantScope;
use crate::core::GrantSource;
use crate::core::PendingConfirmation;
use crate::core::PermissionLevel;
use crate::core::ToolName;
use crate::core::TurnId;
use crate::interfaces::Clock;
use crate::interfaces::ConfirmationApprover;
use crate::runtime::audit_log::AuditError;
use crate::runtime::audit_log::AuditLog;
use crate::runtime::authority::AuthorityError;
use crate::runtime::authority::GrantRequest;
use crate::runtime::authority::ToolAuthority;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Confirmation gate errors.
#[derive(Debug, Error)]
pub enum ConfirmationError {
    /// The session grant could not be issued.
    #[error("confirmation grant failure: {0}")]
    Authority(#[from] AuthorityError),
    /// The request or resolution could not be recorded.
    #[error("confirmation audit failure: {0}")]
    Audit(#[from] AuditError),
    /// Pending registry lock was poisoned.
    #[error("pending confirmation registry poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Pending request plus the token that releases its waiter.
struct PendingEntry {
    /// Request details.
    request: PendingConfirmation,
    /// Token cancelled on timeout, turn abort, or explicit cancel.
    release: CancellationToken,
}

/// Call to be confirmed.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationRequest<'a> {
    /// Tool awaiting approval.
    pub tool: &'a ToolName,
    /// Call parameters shown to the approver.
    pub params: &'a Value,
    /// Level requiring confirmation.
    pub level: PermissionLevel,
    /// Turn the call belongs to.
    pub turn_id: &'a TurnId,
    /// Window override; the gate default applies when absent.
    pub timeout: Option<Duration>,
}

/// Approval gate for sensitive calls.
pub struct ConfirmationGate {
    /// External approver.
    approver: Arc<dyn ConfirmationApprover>,
    /// Authority issuing session grants on approval.
    authority: Arc<ToolAuthority>,
    /// Audit log for request and resolution entries.
    audit: Arc<AuditLog>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Default confirmation window.
    default_timeout: Duration,
    /// Requests awaiting a decision.
    pending: Mutex<BTreeMap<ConfirmationId, PendingEntry>>,
    /// Counter for confirmation identifiers.
    next_id: AtomicU64,
}

impl ConfirmationGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(
        approver: Arc<dyn ConfirmationApprover>,
        authority: Arc<ToolAuthority>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            approver,
            authority,
            audit,
            clock,
            default_timeout,
            pending: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Suspends until the approver decides, the window elapses, or the turn ends.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError`] when the request cannot be audited or an
    /// approval cannot be turned into a session grant. The call must not
    /// proceed in either case.
    pub async fn request(
        &self,
        call: ConfirmationRequest<'_>,
        turn_token: &CancellationToken,
    ) -> Result<ConfirmationOutcome, ConfirmationError> {
        let window = call.timeout.unwrap_or(self.default_timeout);
        let requested_at = self.clock.now();
        let serial = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = ConfirmationId::new(format!("confirm-{}-{serial}", requested_at.as_unix_millis()));
        let pending = PendingConfirmation {
            id: id.clone(),
            tool: call.tool.clone(),
            params: call.params.clone(),
            level: call.level,
            turn_id: call.turn_id.clone(),
            requested_at,
            deadline: requested_at.saturating_add(window),
        };
        self.audit.append(AuditDraft::for_turn(
            call.turn_id,
            AuditEventType::Confirmation,
            AuditActor::Gate,
            json!({
                "action": "requested",
                "confirmation_id": id,
                "tool": call.tool,
                "level": call.level,
                "deadline": pending.deadline,
            }),
        ))?;

        let release = turn_token.child_token();
        self.lock()?.insert(id.clone(), PendingEntry {
            request: pending.clone(),
            release: release.clone(),
        });

        let timed_out = Arc::new(AtomicBool::new(false));
        let timer = {
            let release = release.clone();
            let timed_out = Arc::clone(&timed_out);
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                timed_out.store(true, Ordering::SeqCst);
                release.cancel();
            })
        };
        let decision = release.run_until_cancelled(self.approver.decide(&pending)).await;
        timer.abort();
        let removed = self.lock().map(|mut registry| registry.remove(&id));

        let outcome = match decision {
            Some(ApprovalDecision::Approve) => {
                let grant = self.authority.grant(
                    GrantRequest::new(
                        GrantScope::Tool(call.tool.clone()),
                        call.level,
                        GrantSource::Session,
                    ),
                    Some(call.turn_id),
                )?;
                ConfirmationOutcome::Approved {
                    grant: grant.id,
                }
            }
            Some(ApprovalDecision::Deny) => ConfirmationOutcome::Denied,
            None if timed_out.load(Ordering::SeqCst) && !turn_token.is_cancelled() => {
                ConfirmationOutcome::TimedOut
            }
            None => ConfirmationOutcome::Cancelled,
        };
        let waited = self.clock.now().duration_since(requested_at);
        self.audit.append(AuditDraft::for_turn(
            call.turn_id,
            AuditEventType::Confirmation,
            AuditActor::Gate,
            json!({
                "action": "resolved",
                "confirmation_id": id,
                "tool": call.tool,
                "outcome": outcome,
                "waited_ms": u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            }),
        ))?;
        removed.map_err(|_| ConfirmationError::Poisoned)?;
        Ok(outcome)
    }

    /// Returns every pending confirmation in identifier order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::Poisoned`] when the registry is unavailable.
    pub fn pending(&self) -> Result<Vec<PendingConfirmation>, ConfirmationError> {
        Ok(self.lock()?.values().map(|entry| entry.request.clone()).collect())
    }

    /// Cancels a pending confirmation. Returns false when it is not pending.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::Poisoned`] when the registry is unavailable.
    pub fn cancel(&self, id: &ConfirmationId) -> Result<bool, ConfirmationError> {
        let entry = self.lock()?.remove(id);
        Ok(entry.is_some_and(|entry| {
            entry.release.cancel();
            true
        }))
    }

    /// Locks the pending registry.
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<ConfirmationId, PendingEntry>>, ConfirmationError> {
        self.pending.lock().map_err(|_| ConfirmationError::Poisoned)
    }
}
