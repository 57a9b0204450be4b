// crates/toolgate-core/src/runtime/audit_log.rs
// ============================================================================
// Module: Toolgate Audit Log
// Description: Single-writer, HMAC-chained, append-only audit ledger.
// Purpose: Record every decision point and make tampering evident.
// Dependencies: crate::core, crate::interfaces, thiserror
// ============================================================================

//! ## Overview
//! [`AuditLog`] serializes appends through one mutex that owns the chain head,
//! so sequence numbers and predecessor links are assigned in a single order.
//! Each entry's hash is an HMAC-SHA256 tag, keyed by an in-memory
//! [`AuditKey`], over the RFC 8785 form of the entry's chain material.
//!
//! Verification walks the stored chain, recomputing each tag, and reports the
//! first divergence. The writer's in-memory head is compared to the stored
//! tail, so dropping the newest entry is also detected.
//!
//! Security posture: whoever holds both the store and the key can forge a
//! consistent chain. The log is tamper-evident against anyone else.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use thiserror::Error;

use crate::core::AuditDraft;
use crate::core::AuditEntry;
use crate::core::AuditKey;
use crate::core::AuditRange;
use crate::core::AuditStats;
use crate::core::ChainBreak;
use crate::core::GENESIS_HASH;
use crate::core::REVIEW_BUNDLE_VERSION;
use crate::core::ReviewBundle;
use crate::core::TurnId;
use crate::core::VerifyResult;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::hmac_canonical_json;
use crate::core::hashing::tags_match;
use crate::interfaces::AuditStore;
use crate::interfaces::Clock;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Entries read per page while verifying or exporting.
const PAGE_SIZE: usize = 512;
/// Maximum entries in one review bundle.
pub const MAX_EXPORT_ENTRIES: u64 = 100_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Audit log errors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Underlying store failed.
    #[error("audit store error: {0}")]
    Store(String),
    /// Canonicalization or tagging failed.
    #[error("audit hashing error: {0}")]
    Hash(String),
    /// Requested range is empty or out of bounds.
    #[error("invalid audit range: {0}")]
    InvalidRange(String),
    /// The stored tail does not form a valid head.
    #[error("audit chain head invalid: {0}")]
    InvalidHead(String),
    /// The writer lock was poisoned by a panic.
    #[error("audit writer mutex poisoned")]
    Poisoned,
}

impl From<StoreError> for AuditError {
    fn from(error: StoreError) -> Self {
        Self::Store(error.to_string())
    }
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

/// Sequence number and hash of the newest entry.
#[derive(Debug, Clone)]
struct ChainHead {
    /// Sequence number of the newest entry, zero when empty.
    seq: u64,
    /// Hash of the newest entry, [`GENESIS_HASH`] when empty.
    hash: String,
}

/// Append-only, hash-chained audit ledger.
pub struct AuditLog {
    /// Backing store.
    store: Arc<dyn AuditStore>,
    /// Chain key, never persisted.
    key: Arc<AuditKey>,
    /// Time source for `recorded_at`.
    clock: Arc<dyn Clock>,
    /// Writer lock owning the chain head.
    head: Mutex<ChainHead>,
}

impl AuditLog {
    /// Opens the log over a store, resuming from the stored tail.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the tail cannot be read or does not
    /// carry the key's tag.
    pub fn open(
        store: Arc<dyn AuditStore>,
        key: Arc<AuditKey>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuditError> {
        let head = match store.last_entry()? {
            None => ChainHead {
                seq: 0,
                hash: GENESIS_HASH.to_string(),
            },
            Some(entry) => {
                let expected = hmac_canonical_json(key.expose(), &entry.material())
                    .map_err(|err| AuditError::Hash(err.to_string()))?;
                if !tags_match(&expected, &entry.hash) {
                    return Err(AuditError::InvalidHead(format!(
                        "tail entry {} does not verify under the configured key",
                        entry.seq
                    )));
                }
                ChainHead {
                    seq: entry.seq,
                    hash: entry.hash,
                }
            }
        };
        Ok(Self {
            store,
            key,
            clock,
            head: Mutex::new(head),
        })
    }

    /// Appends an event and returns the sealed entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when tagging or persistence fails. The chain
    /// head only advances after the store accepts the entry.
    pub fn append(&self, draft: AuditDraft) -> Result<AuditEntry, AuditError> {
        let mut head = self.head.lock().map_err(|_| AuditError::Poisoned)?;
        let seq = head
            .seq
            .checked_add(1)
            .ok_or_else(|| AuditError::InvalidRange("sequence overflow".to_string()))?;
        let mut entry = AuditEntry {
            seq,
            turn_id: draft.turn_id,
            event_type: draft.event_type,
            actor: draft.actor,
            recorded_at: self.clock.now(),
            payload: draft.payload,
            prev_hash: head.hash.clone(),
            hash: String::new(),
        };
        entry.hash = hmac_canonical_json(self.key.expose(), &entry.material())
            .map_err(|err| AuditError::Hash(err.to_string()))?;
        self.store.append(&entry)?;
        head.seq = seq;
        head.hash.clone_from(&entry.hash);
        drop(head);
        Ok(entry)
    }

    /// Verifies every stored entry against its predecessor and the writer head.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when entries cannot be read. Tampering is
    /// reported through [`VerifyResult`], not as an error.
    pub fn verify_chain(&self) -> Result<VerifyResult, AuditError> {
        let head = self.snapshot_head()?;
        verify_stored(self.store.as_ref(), &self.key, head.seq, &head.hash)
    }

    /// Builds a review bundle for an inclusive sequence range.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidRange`] when the range is empty, outside
    /// the chain, or larger than [`MAX_EXPORT_ENTRIES`].
    pub fn review_bundle(&self, range: AuditRange) -> Result<ReviewBundle, AuditError> {
        let head = self.snapshot_head()?;
        let exported_at = self.clock.now();
        if head.seq == 0 {
            return Ok(ReviewBundle {
                format_version: REVIEW_BUNDLE_VERSION,
                exported_at,
                entry_count: 0,
                first_seq: None,
                last_seq: None,
                anchor_hash: GENESIS_HASH.to_string(),
                final_hash: GENESIS_HASH.to_string(),
                key_fingerprint: self.key.fingerprint(),
                entries: Vec::new(),
            });
        }
        let to_seq = range.to_seq.unwrap_or(head.seq);
        if range.from_seq == 0 || range.from_seq > to_seq || to_seq > head.seq {
            return Err(AuditError::InvalidRange(format!(
                "range {}..={to_seq} is outside 1..={}",
                range.from_seq, head.seq
            )));
        }
        if to_seq - range.from_seq >= MAX_EXPORT_ENTRIES {
            return Err(AuditError::InvalidRange(format!(
                "range exceeds {MAX_EXPORT_ENTRIES} entries"
            )));
        }
        let mut entries = Vec::new();
        let mut next = range.from_seq;
        while next <= to_seq {
            let page = self.store.read_range(next, Some(to_seq), PAGE_SIZE)?;
            let Some(last) = page.last() else {
                break;
            };
            next = last.seq.saturating_add(1);
            entries.extend(page);
        }
        let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
            return Err(AuditError::InvalidRange("range contains no entries".to_string()));
        };
        Ok(ReviewBundle {
            format_version: REVIEW_BUNDLE_VERSION,
            exported_at,
            entry_count: u64::try_from(entries.len()).unwrap_or(u64::MAX),
            first_seq: Some(first.seq),
            last_seq: Some(last.seq),
            anchor_hash: first.prev_hash.clone(),
            final_hash: last.hash.clone(),
            key_fingerprint: self.key.fingerprint(),
            entries,
        })
    }

    /// Exports a range as canonical JSON bytes for external review.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the range is invalid or serialization fails.
    pub fn export_for_review(&self, range: AuditRange) -> Result<Vec<u8>, AuditError> {
        let bundle = self.review_bundle(range)?;
        canonical_json_bytes(&bundle).map_err(|err| AuditError::Hash(err.to_string()))
    }

    /// Returns every entry recorded for a turn, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Store`] when entries cannot be read.
    pub fn turn_trail(&self, turn_id: &TurnId) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.store.entries_for_turn(turn_id)?)
    }

    /// Returns aggregate statistics for the log.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Store`] when entries cannot be read.
    pub fn stats(&self) -> Result<AuditStats, AuditError> {
        let head = self.snapshot_head()?;
        let mut by_event_type: BTreeMap<String, u64> = BTreeMap::new();
        let mut entry_count = 0_u64;
        let mut next = 1;
        while next <= head.seq {
            let page = self.store.read_range(next, Some(head.seq), PAGE_SIZE)?;
            let Some(last) = page.last() else {
                break;
            };
            next = last.seq.saturating_add(1);
            for entry in &page {
                entry_count = entry_count.saturating_add(1);
                let counter = by_event_type.entry(entry.event_type.as_str().to_string()).or_default();
                *counter = counter.saturating_add(1);
            }
        }
        Ok(AuditStats {
            entry_count,
            head_seq: head.seq,
            head_hash: head.hash,
            by_event_type,
        })
    }

    /// Returns the public fingerprint of the chain key.
    #[must_use]
    pub fn key_fingerprint(&self) -> String {
        self.key.fingerprint()
    }

    /// Copies the current chain head.
    fn snapshot_head(&self) -> Result<ChainHead, AuditError> {
        Ok(self.head.lock().map_err(|_| AuditError::Poisoned)?.clone())
    }
}

// ============================================================================
// SECTION: Offline Verification
// ============================================================================

/// Verifies a store without a running writer, treating the stored tail as head.
///
/// Offline verification cannot detect removal of the newest entries; the
/// live [`AuditLog::verify_chain`] can, because it holds the writer head.
///
/// # Errors
///
/// Returns [`AuditError::Store`] when entries cannot be read.
pub fn verify_store(store: &dyn AuditStore, key: &AuditKey) -> Result<VerifyResult, AuditError> {
    match store.last_entry()? {
        None => Ok(VerifyResult::intact(0)),
        Some(tail) => verify_stored(store, key, tail.seq, &tail.hash),
    }
}

/// Walks `1..=head_seq` and checks every link, then the head itself.
fn verify_stored(
    store: &dyn AuditStore,
    key: &AuditKey,
    head_seq: u64,
    head_hash: &str,
) -> Result<VerifyResult, AuditError> {
    let mut verifier = ChainVerifier::new(key, 1, GENESIS_HASH.to_string());
    let mut next = 1;
    while next <= head_seq {
        let page = store.read_range(next, Some(head_seq), PAGE_SIZE)?;
        let Some(last) = page.last() else {
            break;
        };
        next = last.seq.saturating_add(1);
        for entry in &page {
            if let Some(broken) = verifier.check(entry) {
                return Ok(broken);
            }
        }
    }
    Ok(verifier.finish(head_seq, head_hash))
}

// ============================================================================
// SECTION: Bundle Verification
// ============================================================================

/// Verifies an exported bundle offline with the chain key.
///
/// Checks the key fingerprint, every link starting from the bundle anchor,
/// and that the declared counts and final hash match the entries.
#[must_use]
pub fn verify_bundle(bundle: &ReviewBundle, key: &AuditKey) -> VerifyResult {
    let fingerprint = key.fingerprint();
    if fingerprint != bundle.key_fingerprint {
        return VerifyResult::broken(
            0,
            bundle.first_seq.unwrap_or(0),
            ChainBreak::KeyMismatch,
            fingerprint,
            bundle.key_fingerprint.clone(),
        );
    }
    let declared = u64::try_from(bundle.entries.len()).unwrap_or(u64::MAX);
    if declared != bundle.entry_count {
        return VerifyResult::broken(
            0,
            bundle.first_seq.unwrap_or(0),
            ChainBreak::MetadataMismatch,
            bundle.entry_count.to_string(),
            declared.to_string(),
        );
    }
    let Some(first) = bundle.entries.first() else {
        return VerifyResult::intact(0);
    };
    if bundle.first_seq != Some(first.seq) {
        return VerifyResult::broken(
            0,
            first.seq,
            ChainBreak::MetadataMismatch,
            bundle.first_seq.map_or_else(String::new, |seq| seq.to_string()),
            first.seq.to_string(),
        );
    }
    let mut verifier = ChainVerifier::new(key, first.seq, bundle.anchor_hash.clone());
    for entry in &bundle.entries {
        if let Some(broken) = verifier.check(entry) {
            return broken;
        }
    }
    let last_seq = bundle.last_seq.unwrap_or(0);
    verifier.finish(last_seq, &bundle.final_hash)
}

// ============================================================================
// SECTION: Chain Verifier
// ============================================================================

/// Incremental link checker shared by live and bundle verification.
struct ChainVerifier<'a> {
    /// Chain key.
    key: &'a AuditKey,
    /// Sequence number the next entry must carry.
    expected_seq: u64,
    /// Hash the next entry must name as predecessor.
    expected_prev: String,
    /// Entries verified so far.
    checked: u64,
}

impl<'a> ChainVerifier<'a> {
    /// Creates a verifier anchored at `first_seq` and `anchor_hash`.
    const fn new(key: &'a AuditKey, first_seq: u64, anchor_hash: String) -> Self {
        Self {
            key,
            expected_seq: first_seq,
            expected_prev: anchor_hash,
            checked: 0,
        }
    }

    /// Checks one entry, returning the failure report on divergence.
    fn check(&mut self, entry: &AuditEntry) -> Option<VerifyResult> {
        if entry.seq != self.expected_seq {
            return Some(VerifyResult::broken(
                self.checked,
                self.expected_seq,
                ChainBreak::SequenceGap,
                self.expected_seq.to_string(),
                entry.seq.to_string(),
            ));
        }
        if !tags_match(&self.expected_prev, &entry.prev_hash) {
            return Some(VerifyResult::broken(
                self.checked,
                entry.seq,
                ChainBreak::PredecessorMismatch,
                self.expected_prev.clone(),
                entry.prev_hash.clone(),
            ));
        }
        let recomputed = match hmac_canonical_json(self.key.expose(), &entry.material()) {
            Ok(tag) => tag,
            Err(err) => {
                return Some(VerifyResult::broken(
                    self.checked,
                    entry.seq,
                    ChainBreak::Unreadable,
                    String::new(),
                    err.to_string(),
                ));
            }
        };
        if !tags_match(&recomputed, &entry.hash) {
            return Some(VerifyResult::broken(
                self.checked,
                entry.seq,
                ChainBreak::HashMismatch,
                recomputed,
                entry.hash.clone(),
            ));
        }
        self.checked = self.checked.saturating_add(1);
        self.expected_seq = entry.seq.saturating_add(1);
        self.expected_prev.clone_from(&entry.hash);
        None
    }

    /// Compares the verified tail with the expected head.
    fn finish(self, head_seq: u64, head_hash: &str) -> VerifyResult {
        let tail_seq = self.expected_seq.saturating_sub(1);
        if tail_seq != head_seq {
            return VerifyResult::broken(
                self.checked,
                tail_seq.saturating_add(1),
                ChainBreak::HeadMismatch,
                head_seq.to_string(),
                tail_seq.to_string(),
            );
        }
        if !tags_match(head_hash, &self.expected_prev) {
            return VerifyResult::broken(
                self.checked,
                head_seq,
                ChainBreak::HeadMismatch,
                head_hash.to_string(),
                self.expected_prev,
            );
        }
        VerifyResult::intact(self.checked)
    }
}
