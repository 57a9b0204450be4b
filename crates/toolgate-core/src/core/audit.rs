// crates/toolgate-core/src/core/audit.rs
// ============================================================================
// Module: Toolgate Audit Records
// Description: Audit entries, drafts, verification reports, and review bundles.
// Purpose: Define the persisted and exported shape of the hash-chained ledger.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`AuditEntry`] is created once by the audit log and never changed. Its
//! `hash` is an HMAC tag over the canonical form of [`ChainMaterial`], which
//! includes the predecessor's hash. The first entry links to [`GENESIS_HASH`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::TurnId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Predecessor hash of the first entry in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Format version of exported review bundles.
pub const REVIEW_BUNDLE_VERSION: u32 = 1;

// ============================================================================
// SECTION: Event Classification
// ============================================================================

/// Audit event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// Authority decision.
    AuthorityCheck,
    /// Tool execution attempt, rejection, or result.
    ToolExecute,
    /// Confirmation requested or resolved.
    Confirmation,
    /// Circuit breaker state change.
    CircuitTransition,
    /// Grant created, revoked, or consumed.
    GrantChange,
    /// Turn aborted or closed.
    TurnLifecycle,
}

impl AuditEventType {
    /// Returns the canonical label for the event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorityCheck => "AUTHORITY_CHECK",
            Self::ToolExecute => "TOOL_EXECUTE",
            Self::Confirmation => "CONFIRMATION",
            Self::CircuitTransition => "CIRCUIT_TRANSITION",
            Self::GrantChange => "GRANT_CHANGE",
            Self::TurnLifecycle => "TURN_LIFECYCLE",
        }
    }

    /// Parses a canonical label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        [
            Self::AuthorityCheck,
            Self::ToolExecute,
            Self::Confirmation,
            Self::CircuitTransition,
            Self::GrantChange,
            Self::TurnLifecycle,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == label)
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component or party responsible for an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditActor {
    /// Tool authority.
    Authority,
    /// Confirmation gate.
    Gate,
    /// Tool executor.
    Executor,
    /// Circuit breaker registry.
    Breaker,
    /// Degradation manager.
    Governor,
    /// Human operator acting through an administrative surface.
    Operator,
    /// Process-level events.
    System,
}

impl AuditActor {
    /// Returns the canonical label for the actor.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authority => "authority",
            Self::Gate => "gate",
            Self::Executor => "executor",
            Self::Breaker => "breaker",
            Self::Governor => "governor",
            Self::Operator => "operator",
            Self::System => "system",
        }
    }

    /// Parses a canonical label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        [
            Self::Authority,
            Self::Gate,
            Self::Executor,
            Self::Breaker,
            Self::Governor,
            Self::Operator,
            Self::System,
        ]
        .into_iter()
        .find(|actor| actor.as_str() == label)
    }
}

// ============================================================================
// SECTION: Entries
// ============================================================================

/// Event submitted for appending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDraft {
    /// Turn the event belongs to; `None` only for operator and system events.
    pub turn_id: Option<TurnId>,
    /// Event type.
    pub event_type: AuditEventType,
    /// Responsible actor.
    pub actor: AuditActor,
    /// Event payload.
    pub payload: Value,
}

impl AuditDraft {
    /// Creates a draft for an event within a turn.
    #[must_use]
    pub fn for_turn(
        turn_id: &TurnId,
        event_type: AuditEventType,
        actor: AuditActor,
        payload: Value,
    ) -> Self {
        Self {
            turn_id: Some(turn_id.clone()),
            event_type,
            actor,
            payload,
        }
    }

    /// Creates a draft for an event outside any turn.
    #[must_use]
    pub const fn detached(event_type: AuditEventType, actor: AuditActor, payload: Value) -> Self {
        Self {
            turn_id: None,
            event_type,
            actor,
            payload,
        }
    }
}

/// Persisted, hash-chained audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic sequence number starting at 1.
    pub seq: u64,
    /// Turn correlation key.
    pub turn_id: Option<TurnId>,
    /// Event type.
    pub event_type: AuditEventType,
    /// Responsible actor.
    pub actor: AuditActor,
    /// Append time, fixed at write.
    pub recorded_at: Timestamp,
    /// Event payload.
    pub payload: Value,
    /// Hash of the predecessor entry.
    pub prev_hash: String,
    /// HMAC tag of this entry's chain material.
    pub hash: String,
}

impl AuditEntry {
    /// Returns the hashed material for this entry.
    #[must_use]
    pub fn material(&self) -> ChainMaterial<'_> {
        ChainMaterial {
            seq: self.seq,
            turn_id: self.turn_id.as_ref(),
            event_type: self.event_type,
            actor: self.actor,
            recorded_at: self.recorded_at,
            payload: &self.payload,
            prev_hash: &self.prev_hash,
        }
    }
}

/// Fields covered by an entry's chain tag.
#[derive(Debug, Serialize)]
pub struct ChainMaterial<'a> {
    /// Sequence number.
    pub seq: u64,
    /// Turn correlation key.
    pub turn_id: Option<&'a TurnId>,
    /// Event type.
    pub event_type: AuditEventType,
    /// Responsible actor.
    pub actor: AuditActor,
    /// Append time.
    pub recorded_at: Timestamp,
    /// Event payload.
    pub payload: &'a Value,
    /// Predecessor hash.
    pub prev_hash: &'a str,
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Kind of chain divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainBreak {
    /// Sequence numbers are not contiguous.
    SequenceGap,
    /// `prev_hash` does not equal the predecessor's hash.
    PredecessorMismatch,
    /// The stored hash does not match the recomputed tag.
    HashMismatch,
    /// The stored tail differs from the writer's chain head.
    HeadMismatch,
    /// The entry could not be canonicalized.
    Unreadable,
    /// A bundle was tagged with a different key than the verifier holds.
    KeyMismatch,
    /// Bundle metadata disagrees with its entries.
    MetadataMismatch,
}

/// Result of verifying the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    /// True when no divergence was found.
    pub valid: bool,
    /// Number of entries checked.
    pub entries_checked: u64,
    /// Sequence position of the first divergence.
    pub broken_at: Option<u64>,
    /// Divergence kind.
    pub reason: Option<ChainBreak>,
    /// Expected value at the divergence.
    pub expected: Option<String>,
    /// Observed value at the divergence.
    pub actual: Option<String>,
}

impl VerifyResult {
    /// Creates a successful result.
    #[must_use]
    pub const fn intact(entries_checked: u64) -> Self {
        Self {
            valid: true,
            entries_checked,
            broken_at: None,
            reason: None,
            expected: None,
            actual: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn broken(
        entries_checked: u64,
        position: u64,
        reason: ChainBreak,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            valid: false,
            entries_checked,
            broken_at: Some(position),
            reason: Some(reason),
            expected: Some(expected.into()),
            actual: Some(actual.into()),
        }
    }
}

// ============================================================================
// SECTION: Export
// ============================================================================

/// Inclusive sequence range for reads and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRange {
    /// First sequence number, inclusive.
    pub from_seq: u64,
    /// Last sequence number, inclusive; `None` means the current head.
    pub to_seq: Option<u64>,
}

impl AuditRange {
    /// Range covering the entire log.
    pub const ALL: Self = Self {
        from_seq: 1,
        to_seq: None,
    };

    /// Creates a bounded range.
    #[must_use]
    pub const fn new(from_seq: u64, to_seq: Option<u64>) -> Self {
        Self {
            from_seq,
            to_seq,
        }
    }
}

/// Self-describing export of a chain segment for external review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewBundle {
    /// Bundle format version.
    pub format_version: u32,
    /// Export time.
    pub exported_at: Timestamp,
    /// Number of exported entries.
    pub entry_count: u64,
    /// First exported sequence number.
    pub first_seq: Option<u64>,
    /// Last exported sequence number.
    pub last_seq: Option<u64>,
    /// Predecessor hash of the first exported entry.
    pub anchor_hash: String,
    /// Hash of the last exported entry.
    pub final_hash: String,
    /// Public fingerprint of the key that tagged the chain.
    pub key_fingerprint: String,
    /// Exported entries in sequence order.
    pub entries: Vec<AuditEntry>,
}

/// Aggregate audit log statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    /// Total entries written.
    pub entry_count: u64,
    /// Sequence number of the chain head.
    pub head_seq: u64,
    /// Hash of the chain head.
    pub head_hash: String,
    /// Entry counts by event type label.
    pub by_event_type: BTreeMap<String, u64>,
}
