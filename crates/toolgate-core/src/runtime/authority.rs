// crates/toolgate-core/src/runtime/authority.rs
// ============================================================================
// Module: Toolgate Tool Authority
// Description: Grant evaluation, one-time consumption, and revocation.
// Purpose: Decide whether a tool call is permitted and record every decision.
// Dependencies: crate::core, crate::interfaces, crate::runtime::audit_log
// ============================================================================

//! ## Overview
//! The authority holds every grant in one read-mostly map. Checks take the
//! read lock; revocation, consumption, and issuance take the write lock, so a
//! revoked grant is invisible to every check that starts after `revoke`
//! returns. Nothing is implied: a READ call without a grant is denied, and
//! WRITE, EXECUTE, or NETWORK calls without a grant are routed to the
//! confirmation gate. Levels listed as blocked are denied outright.
//!
//! A call whose only covering grants are revoked, consumed, or expired is
//! denied at every level. Confirmation never re-issues access an operator
//! took away.
//!
//! Every decision is appended to the audit log before it is returned. If the
//! append fails, the check fails and the call does not proceed.
//!
//! ## Invariants
//! - Session grants are consulted before persistent grants.
//! - Config and user grants are persisted with their revoked and consumed
//!   flags, so a restart never resurrects a revoked grant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::AuditActor;
use crate::core::AuditDraft;
use crate::core::AuditEventType;
use crate::core::AuthorityDecision;
use crate::core::AuthorityOutcome;
use crate::core::AuthoritySettings;
use crate::core::ConfirmationOutcome;
use crate::core::DecisionReason;
use crate::core::GrantId;
use crate::core::GrantScope;
use crate::core::GrantSource;
use crate::core::GrantState;
use crate::core::PermissionGrant;
use crate::core::PermissionLevel;
use crate::core::Timestamp;
use crate::core::ToolName;
use crate::core::TurnId;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::sha256_hex;
use crate::interfaces::Clock;
use crate::interfaces::GrantStore;
use crate::interfaces::StoreError;
use crate::runtime::audit_log::AuditError;
use crate::runtime::audit_log::AuditLog;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool authority errors.
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The decision could not be recorded.
    #[error("authority audit failure: {0}")]
    Audit(#[from] AuditError),
    /// Grant persistence failed.
    #[error("grant store failure: {0}")]
    Store(String),
    /// Referenced grant does not exist.
    #[error("unknown grant: {0}")]
    UnknownGrant(GrantId),
    /// Request was rejected.
    #[error("invalid grant request: {0}")]
    Invalid(String),
    /// Grant lock was poisoned.
    #[error("grant table lock poisoned")]
    Poisoned,
}

impl From<StoreError> for AuthorityError {
    fn from(error: StoreError) -> Self {
        Self::Store(error.to_string())
    }
}

// ============================================================================
// SECTION: Grant Requests
// ============================================================================

/// Request to issue a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRequest {
    /// Target of the grant.
    pub scope: GrantScope,
    /// Authorized level.
    pub level: PermissionLevel,
    /// Optional expiry.
    pub expires_at: Option<Timestamp>,
    /// Single-use flag.
    pub one_time: bool,
    /// Grant origin.
    pub source: GrantSource,
}

impl GrantRequest {
    /// Creates a reusable, non-expiring grant request.
    #[must_use]
    pub const fn new(scope: GrantScope, level: PermissionLevel, source: GrantSource) -> Self {
        Self {
            scope,
            level,
            expires_at: None,
            one_time: false,
            source,
        }
    }

    /// Sets an expiry.
    #[must_use]
    pub const fn expiring_at(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Makes the grant single-use.
    #[must_use]
    pub const fn single_use(mut self) -> Self {
        self.one_time = true;
        self
    }
}

/// Deterministic identifier for a grant declared in configuration.
#[must_use]
pub fn config_grant_id(scope: &GrantScope, level: PermissionLevel) -> GrantId {
    GrantId::new(format!("config:{}:{level}", scope.label()))
}

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Result of scanning the grant table for a call.
enum Selection {
    /// An active covering grant.
    Usable {
        /// Grant identifier.
        id: GrantId,
        /// True when the grant is single-use.
        one_time: bool,
    },
    /// No active covering grant; the most specific reason why.
    Missing(DecisionReason),
}

/// Ranks denial reasons so the most informative one is reported.
const fn reason_priority(reason: DecisionReason) -> u8 {
    match reason {
        DecisionReason::GrantRevoked => 4,
        DecisionReason::GrantConsumed => 3,
        DecisionReason::GrantExpired => 2,
        DecisionReason::InsufficientLevel => 1,
        DecisionReason::NoGrant
        | DecisionReason::LevelBlocked
        | DecisionReason::OneTimeConsumed
        | DecisionReason::ConfirmationApproved
        | DecisionReason::ConfirmationDenied
        | DecisionReason::ConfirmationTimedOut
        | DecisionReason::ConfirmationCancelled => 0,
    }
}

/// Picks the best active covering grant.
///
/// Ordering: session before persistent, then tool, level, wildcard scope,
/// then reusable before single-use.
fn select(
    grants: &BTreeMap<GrantId, PermissionGrant>,
    tool: &ToolName,
    level: PermissionLevel,
    now: Timestamp,
) -> Selection {
    let mut best: Option<((bool, u8, bool), &PermissionGrant)> = None;
    let mut missing = DecisionReason::NoGrant;
    for grant in grants.values() {
        let Some(rank) = grant.scope.match_rank(tool, level) else {
            continue;
        };
        let inactive = match grant.state_at(now) {
            GrantState::Active if grant.level.covers(level) => {
                let key = (grant.source != GrantSource::Session, rank, grant.one_time);
                if best.as_ref().is_none_or(|(current, _)| key < *current) {
                    best = Some((key, grant));
                }
                continue;
            }
            GrantState::Active => DecisionReason::InsufficientLevel,
            GrantState::Expired => DecisionReason::GrantExpired,
            GrantState::Revoked => DecisionReason::GrantRevoked,
            GrantState::Consumed => DecisionReason::GrantConsumed,
        };
        if reason_priority(inactive) > reason_priority(missing) {
            missing = inactive;
        }
    }
    best.map_or(Selection::Missing(missing), |(_, grant)| Selection::Usable {
        id: grant.id.clone(),
        one_time: grant.one_time,
    })
}

// ============================================================================
// SECTION: Authority
// ============================================================================

/// Permission authority for tool calls.
pub struct ToolAuthority {
    /// Blocked and confirmable levels.
    settings: AuthoritySettings,
    /// Every known grant, session and persistent.
    grants: RwLock<BTreeMap<GrantId, PermissionGrant>>,
    /// Durable store for non-session grants.
    store: Arc<dyn GrantStore>,
    /// Audit log receiving every decision.
    audit: Arc<AuditLog>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Counter for issued grant identifiers.
    next_id: AtomicU64,
}

impl ToolAuthority {
    /// Creates the authority from configured grants and the stored grant state.
    ///
    /// Configured grants receive deterministic identifiers; a stored record
    /// with the same identifier keeps its revoked and consumed flags.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError`] when stored grants cannot be read or a
    /// configured grant is not a config-sourced request.
    pub fn new(
        settings: AuthoritySettings,
        configured: &[GrantRequest],
        store: Arc<dyn GrantStore>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthorityError> {
        let now = clock.now();
        let mut grants: BTreeMap<GrantId, PermissionGrant> = BTreeMap::new();
        for stored in store.load_grants()? {
            if stored.source != GrantSource::Session {
                grants.insert(stored.id.clone(), stored);
            }
        }
        for request in configured {
            if request.source != GrantSource::Config {
                return Err(AuthorityError::Invalid(format!(
                    "configured grant for {} must have source config",
                    request.scope.label()
                )));
            }
            let id = config_grant_id(&request.scope, request.level);
            let previous = grants.get(&id);
            let grant = PermissionGrant {
                id: id.clone(),
                scope: request.scope.clone(),
                level: request.level,
                granted_at: previous.map_or(now, |grant| grant.granted_at),
                expires_at: request.expires_at,
                one_time: request.one_time,
                source: GrantSource::Config,
                revoked: previous.is_some_and(|grant| grant.revoked),
                consumed: previous.is_some_and(|grant| grant.consumed),
            };
            if previous != Some(&grant) {
                store.put_grant(&grant)?;
            }
            grants.insert(id, grant);
        }
        Ok(Self {
            settings,
            grants: RwLock::new(grants),
            store,
            audit,
            clock,
            next_id: AtomicU64::new(1),
        })
    }

    /// Decides whether `tool` may run at `level` and records the decision.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError`] when the decision cannot be recorded or a
    /// consumed one-time grant cannot be persisted.
    pub fn check(
        &self,
        tool: &ToolName,
        params: &Value,
        level: PermissionLevel,
        turn_id: &TurnId,
    ) -> Result<AuthorityDecision, AuthorityError> {
        let now = self.clock.now();
        let (outcome, reason, matched_grant) = if self.settings.always_blocked.contains(&level) {
            (AuthorityOutcome::Deny, Some(DecisionReason::LevelBlocked), None)
        } else {
            let selection = select(&*self.read()?, tool, level, now);
            let selection = match selection {
                Selection::Usable {
                    one_time: true,
                    ..
                } => self.consume_one_time(tool, level, turn_id, now)?,
                other => other,
            };
            match selection {
                Selection::Usable {
                    id,
                    one_time,
                } => {
                    let reason = one_time.then_some(DecisionReason::OneTimeConsumed);
                    (AuthorityOutcome::Allow, reason, Some(id))
                }
                Selection::Missing(
                    reason @ (DecisionReason::GrantRevoked
                    | DecisionReason::GrantConsumed
                    | DecisionReason::GrantExpired),
                ) => (AuthorityOutcome::Deny, Some(reason), None),
                Selection::Missing(reason) if self.settings.confirmable.contains(&level) => {
                    (AuthorityOutcome::ConfirmRequired, Some(reason), None)
                }
                Selection::Missing(reason) => (AuthorityOutcome::Deny, Some(reason), None),
            }
        };
        let decision = AuthorityDecision {
            turn_id: turn_id.clone(),
            tool: tool.clone(),
            level,
            outcome,
            reason,
            matched_grant,
            decided_at: now,
        };
        self.record_decision(&decision, params)?;
        Ok(decision)
    }

    /// Records the final decision for a call that went through confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError`] when the decision cannot be recorded.
    pub fn resolve_confirmation(
        &self,
        tool: &ToolName,
        params: &Value,
        level: PermissionLevel,
        turn_id: &TurnId,
        outcome: &ConfirmationOutcome,
    ) -> Result<AuthorityDecision, AuthorityError> {
        let (authority_outcome, matched_grant) = match outcome {
            ConfirmationOutcome::Approved {
                grant,
            } => (AuthorityOutcome::Allow, Some(grant.clone())),
            ConfirmationOutcome::Denied
            | ConfirmationOutcome::TimedOut
            | ConfirmationOutcome::Cancelled => (AuthorityOutcome::ConfirmDenied, None),
        };
        let decision = AuthorityDecision {
            turn_id: turn_id.clone(),
            tool: tool.clone(),
            level,
            outcome: authority_outcome,
            reason: Some(outcome.reason()),
            matched_grant,
            decided_at: self.clock.now(),
        };
        self.record_decision(&decision, params)?;
        Ok(decision)
    }

    /// Issues a grant. Non-session grants are persisted before they take effect.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError`] when the request is invalid or the grant
    /// cannot be persisted or audited.
    pub fn grant(
        &self,
        request: GrantRequest,
        turn_id: Option<&TurnId>,
    ) -> Result<PermissionGrant, AuthorityError> {
        if request.source == GrantSource::Config {
            return Err(AuthorityError::Invalid(
                "config grants are only loaded at startup".to_string(),
            ));
        }
        if self.settings.always_blocked.contains(&request.level) {
            return Err(AuthorityError::Invalid(format!(
                "level {} is blocked and cannot be granted",
                request.level
            )));
        }
        let now = self.clock.now();
        if request.expires_at.is_some_and(|expiry| expiry <= now) {
            return Err(AuthorityError::Invalid("grant expiry must be in the future".to_string()));
        }
        let serial = self.next_id.fetch_add(1, Ordering::Relaxed);
        let grant = PermissionGrant {
            id: GrantId::new(format!(
                "{}:{}-{serial}",
                request.source.as_str(),
                now.as_unix_millis()
            )),
            scope: request.scope,
            level: request.level,
            granted_at: now,
            expires_at: request.expires_at,
            one_time: request.one_time,
            source: request.source,
            revoked: false,
            consumed: false,
        };
        if grant.source != GrantSource::Session {
            self.store.put_grant(&grant)?;
        }
        self.write()?.insert(grant.id.clone(), grant.clone());
        let actor = match grant.source {
            GrantSource::Session => AuditActor::Gate,
            GrantSource::User | GrantSource::Config => AuditActor::Operator,
        };
        self.record_grant_change("created", &grant, actor, turn_id)?;
        Ok(grant)
    }

    /// Revokes a grant. Takes effect for every check that starts afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::UnknownGrant`] when no such grant exists, or
    /// a store or audit error. The grant stays revoked in memory even when
    /// persistence fails.
    pub fn revoke(&self, id: &GrantId) -> Result<PermissionGrant, AuthorityError> {
        let revoked = {
            let mut grants = self.write()?;
            let grant = grants.get_mut(id).ok_or_else(|| AuthorityError::UnknownGrant(id.clone()))?;
            grant.revoked = true;
            grant.clone()
        };
        if revoked.source != GrantSource::Session {
            self.store.put_grant(&revoked)?;
        }
        self.record_grant_change("revoked", &revoked, AuditActor::Operator, None)?;
        Ok(revoked)
    }

    /// Drops every session grant and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError`] when the removal cannot be audited.
    pub fn clear_session_grants(&self) -> Result<usize, AuthorityError> {
        let removed = {
            let mut grants = self.write()?;
            let before = grants.len();
            grants.retain(|_, grant| grant.source != GrantSource::Session);
            before - grants.len()
        };
        self.audit.append(AuditDraft::detached(
            AuditEventType::GrantChange,
            AuditActor::System,
            json!({ "action": "session_cleared", "removed": removed }),
        ))?;
        Ok(removed)
    }

    /// Returns every grant active now.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Poisoned`] when the grant table is unavailable.
    pub fn active_grants(&self) -> Result<Vec<PermissionGrant>, AuthorityError> {
        let now = self.clock.now();
        Ok(self.read()?.values().filter(|grant| grant.is_active(now)).cloned().collect())
    }

    /// Returns every known grant, including inactive ones.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Poisoned`] when the grant table is unavailable.
    pub fn all_grants(&self) -> Result<Vec<PermissionGrant>, AuthorityError> {
        Ok(self.read()?.values().cloned().collect())
    }

    /// Consumes a single-use grant under the write lock.
    ///
    /// Re-selects so a concurrent check cannot consume the same grant twice.
    fn consume_one_time(
        &self,
        tool: &ToolName,
        level: PermissionLevel,
        turn_id: &TurnId,
        now: Timestamp,
    ) -> Result<Selection, AuthorityError> {
        let consumed = {
            let mut grants = self.write()?;
            let selection = select(&grants, tool, level, now);
            let Selection::Usable {
                id,
                one_time: true,
            } = selection
            else {
                return Ok(selection);
            };
            let Some(grant) = grants.get_mut(&id) else {
                return Err(AuthorityError::UnknownGrant(id));
            };
            grant.consumed = true;
            grant.clone()
        };
        if consumed.source != GrantSource::Session {
            self.store.put_grant(&consumed)?;
        }
        self.record_grant_change("consumed", &consumed, AuditActor::Authority, Some(turn_id))?;
        Ok(Selection::Usable {
            id: consumed.id,
            one_time: true,
        })
    }

    /// Appends an authority decision to the audit log.
    fn record_decision(
        &self,
        decision: &AuthorityDecision,
        params: &Value,
    ) -> Result<(), AuthorityError> {
        let digest = canonical_json_bytes(params)
            .map(|bytes| sha256_hex(&bytes))
            .map_err(|err| AuthorityError::Invalid(err.to_string()))?;
        self.audit.append(AuditDraft::for_turn(
            &decision.turn_id,
            AuditEventType::AuthorityCheck,
            AuditActor::Authority,
            json!({
                "tool": decision.tool,
                "level": decision.level,
                "outcome": decision.outcome,
                "reason": decision.reason,
                "matched_grant": decision.matched_grant,
                "params_sha256": digest,
            }),
        ))?;
        Ok(())
    }

    /// Appends a grant lifecycle entry to the audit log.
    fn record_grant_change(
        &self,
        action: &str,
        grant: &PermissionGrant,
        actor: AuditActor,
        turn_id: Option<&TurnId>,
    ) -> Result<(), AuthorityError> {
        let payload = json!({
            "action": action,
            "grant_id": grant.id,
            "scope": grant.scope.label(),
            "level": grant.level,
            "source": grant.source,
            "one_time": grant.one_time,
            "expires_at": grant.expires_at,
        });
        let draft = match turn_id {
            Some(turn_id) => {
                AuditDraft::for_turn(turn_id, AuditEventType::GrantChange, actor, payload)
            }
            None => AuditDraft::detached(AuditEventType::GrantChange, actor, payload),
        };
        self.audit.append(draft)?;
        Ok(())
    }

    /// Acquires the grant table for reading.
    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<GrantId, PermissionGrant>>, AuthorityError> {
        self.grants.read().map_err(|_| AuthorityError::Poisoned)
    }

    /// Acquires the grant table for writing.
    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, BTreeMap<GrantId, PermissionGrant>>, AuthorityError> {
        self.grants.write().map_err(|_| AuthorityError::Poisoned)
    }
}
