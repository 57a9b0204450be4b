// crates/toolgate-core/tests/audit_chain.rs
// ============================================================================
// Module: Audit Chain Tests
// Description: Tests for HMAC chaining, verification, and review bundles.
// Purpose: Ensure edits, deletions, and truncation are all detected.
// ============================================================================

//! ## Overview
//! Writes a short chain into a store that tests can tamper with directly,
//! then checks that live, offline, and bundle verification report the first
//! divergence with the right kind and position.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use common::test_clock;
use common::test_key;
use common::turn;
use serde_json::json;
use toolgate_core::AuditActor;
use toolgate_core::AuditDraft;
use toolgate_core::AuditEntry;
use toolgate_core::AuditError;
use toolgate_core::AuditEventType;
use toolgate_core::AuditKey;
use toolgate_core::AuditLog;
use toolgate_core::AuditRange;
use toolgate_core::AuditStore;
use toolgate_core::ChainBreak;
use toolgate_core::GENESIS_HASH;
use toolgate_core::ManualClock;
use toolgate_core::ReviewBundle;
use toolgate_core::StoreError;
use toolgate_core::Timestamp;
use toolgate_core::TurnId;
use toolgate_core::verify_bundle;
use toolgate_core::verify_store;

// ============================================================================
// SECTION: Tamperable Store
// ============================================================================

/// Store whose entries can be rewritten behind the writer's back.
#[derive(Clone, Default)]
struct TamperableStore {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl TamperableStore {
    fn edit(&self, seq: u64, edit: impl FnOnce(&mut AuditEntry)) {
        let mut entries = self.entries.lock().unwrap();
        edit(entries.iter_mut().find(|entry| entry.seq == seq).unwrap());
    }

    fn remove(&self, seq: u64) {
        self.entries.lock().unwrap().retain(|entry| entry.seq != seq);
    }
}

impl AuditStore for TamperableStore {
    fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    fn read_range(
        &self,
        from_seq: u64,
        to_seq: Option<u64>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.seq >= from_seq && to_seq.is_none_or(|to| entry.seq <= to))
            .take(limit)
            .cloned()
            .collect())
    }

    fn last_entry(&self) -> Result<Option<AuditEntry>, StoreError> {
        Ok(self.entries.lock().unwrap().last().cloned())
    }

    fn entries_for_turn(&self, turn_id: &TurnId) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.turn_id.as_ref() == Some(turn_id))
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open(store: &TamperableStore, key: AuditKey, clock: &ManualClock) -> AuditLog {
    AuditLog::open(Arc::new(store.clone()), Arc::new(key), Arc::new(clock.clone())).unwrap()
}

/// Writes three entries: two in turn `t1`, one detached.
fn seeded() -> (TamperableStore, AuditLog, ManualClock) {
    let store = TamperableStore::default();
    let clock = test_clock();
    let log = open(&store, test_key(), &clock);
    let t1 = turn("t1");
    log.append(AuditDraft::for_turn(
        &t1,
        AuditEventType::AuthorityCheck,
        AuditActor::Authority,
        json!({ "tool": "search", "outcome": "ALLOW" }),
    ))
    .unwrap();
    clock.advance(Duration::from_millis(5));
    log.append(AuditDraft::for_turn(
        &t1,
        AuditEventType::ToolExecute,
        AuditActor::Executor,
        json!({ "tool": "search", "status": "succeeded" }),
    ))
    .unwrap();
    clock.advance(Duration::from_millis(5));
    log.append(AuditDraft::detached(
        AuditEventType::GrantChange,
        AuditActor::Operator,
        json!({ "action": "revoked", "grant_id": "grant-1" }),
    ))
    .unwrap();
    (store, log, clock)
}

// ============================================================================
// SECTION: Live Verification
// ============================================================================

#[test]
fn untouched_chain_verifies() {
    let (store, log, _clock) = seeded();

    let result = log.verify_chain().unwrap();

    assert!(result.valid, "{result:?}");
    assert_eq!(result.entries_checked, 3);
    let entries = store.read_range(1, None, 10).unwrap();
    assert_eq!(entries[0].prev_hash, GENESIS_HASH);
    assert_eq!(entries[1].prev_hash, entries[0].hash);
    assert_eq!(entries[2].prev_hash, entries[1].hash);
    assert!(entries[1].recorded_at > entries[0].recorded_at);
}

#[test]
fn edited_payload_is_a_hash_mismatch() {
    let (store, log, _clock) = seeded();
    store.edit(2, |entry| entry.payload["status"] = json!("failed"));

    let result = log.verify_chain().unwrap();

    assert!(!result.valid);
    assert_eq!(result.broken_at, Some(2));
    assert_eq!(result.reason, Some(ChainBreak::HashMismatch));
    assert_eq!(result.entries_checked, 1);
}

#[test]
fn edited_timestamp_is_a_hash_mismatch() {
    let (store, log, _clock) = seeded();
    store.edit(1, |entry| {
        entry.recorded_at = Timestamp::from_unix_millis(0);
    });

    let result = log.verify_chain().unwrap();

    assert_eq!(result.broken_at, Some(1));
    assert_eq!(result.reason, Some(ChainBreak::HashMismatch));
}

#[test]
fn rewritten_link_is_a_predecessor_mismatch() {
    let (store, log, _clock) = seeded();
    store.edit(3, |entry| entry.prev_hash = GENESIS_HASH.to_string());

    let result = log.verify_chain().unwrap();

    assert_eq!(result.broken_at, Some(3));
    assert_eq!(result.reason, Some(ChainBreak::PredecessorMismatch));
}

#[test]
fn deleted_middle_entry_is_a_sequence_gap() {
    let (store, log, _clock) = seeded();
    store.remove(2);

    let result = log.verify_chain().unwrap();

    assert_eq!(result.broken_at, Some(2));
    assert_eq!(result.reason, Some(ChainBreak::SequenceGap));
    assert_eq!(result.expected.as_deref(), Some("2"));
    assert_eq!(result.actual.as_deref(), Some("3"));
}

#[test]
fn truncated_tail_is_caught_by_the_writer_head() {
    let (store, log, _clock) = seeded();
    store.remove(3);

    let live = log.verify_chain().unwrap();
    let offline = verify_store(&store, &test_key()).unwrap();

    assert!(!live.valid);
    assert_eq!(live.broken_at, Some(3));
    assert_eq!(live.reason, Some(ChainBreak::HeadMismatch));
    assert!(offline.valid, "offline verification treats the stored tail as head");
    assert_eq!(offline.entries_checked, 2);
}

// ============================================================================
// SECTION: Reopening
// ============================================================================

#[test]
fn reopened_log_continues_the_chain() {
    let (store, log, clock) = seeded();
    let head = log.stats().unwrap().head_hash;
    drop(log);

    let reopened = open(&store, test_key(), &clock);
    let entry = reopened
        .append(AuditDraft::detached(
            AuditEventType::TurnLifecycle,
            AuditActor::System,
            json!({ "action": "restarted" }),
        ))
        .unwrap();

    assert_eq!(entry.seq, 4);
    assert_eq!(entry.prev_hash, head);
    assert!(reopened.verify_chain().unwrap().valid);
    assert!(verify_store(&store, &test_key()).unwrap().valid);
}

#[test]
fn reopening_with_a_different_key_is_refused() {
    let (store, _log, clock) = seeded();

    let result = AuditLog::open(
        Arc::new(store),
        Arc::new(AuditKey::new(vec![0x11; 32]).unwrap()),
        Arc::new(clock),
    );

    assert!(matches!(result, Err(AuditError::InvalidHead(_))));
}

#[test]
fn offline_verification_with_wrong_key_fails_on_first_entry() {
    let (store, _log, _clock) = seeded();

    let result = verify_store(&store, &AuditKey::new(vec![0x11; 32]).unwrap()).unwrap();

    assert_eq!(result.broken_at, Some(1));
    assert_eq!(result.reason, Some(ChainBreak::HashMismatch));
}

// ============================================================================
// SECTION: Review Bundles
// ============================================================================

#[test]
fn exported_bundle_verifies_offline() {
    let (_store, log, _clock) = seeded();

    let bytes = log.export_for_review(AuditRange::ALL).unwrap();
    let bundle: ReviewBundle = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(bundle.entry_count, 3);
    assert_eq!(bundle.first_seq, Some(1));
    assert_eq!(bundle.last_seq, Some(3));
    assert_eq!(bundle.anchor_hash, GENESIS_HASH);
    assert_eq!(bundle.key_fingerprint, test_key().fingerprint());
    assert!(verify_bundle(&bundle, &test_key()).valid);
}

#[test]
fn partial_bundle_is_anchored_at_its_predecessor() {
    let (store, log, _clock) = seeded();
    let first = store.read_range(1, Some(1), 1).unwrap().remove(0);

    let bundle = log.review_bundle(AuditRange::new(2, Some(3))).unwrap();

    assert_eq!(bundle.entry_count, 2);
    assert_eq!(bundle.anchor_hash, first.hash);
    let result = verify_bundle(&bundle, &test_key());
    assert!(result.valid, "{result:?}");
    assert_eq!(result.entries_checked, 2);
}

#[test]
fn tampered_bundle_entry_is_detected() {
    let (_store, log, _clock) = seeded();
    let mut bundle = log.review_bundle(AuditRange::ALL).unwrap();
    bundle.entries[0].payload["outcome"] = json!("DENY");

    let result = verify_bundle(&bundle, &test_key());

    assert_eq!(result.broken_at, Some(1));
    assert_eq!(result.reason, Some(ChainBreak::HashMismatch));
}

#[test]
fn dropped_bundle_entry_is_a_metadata_mismatch() {
    let (_store, log, _clock) = seeded();
    let mut bundle = log.review_bundle(AuditRange::ALL).unwrap();
    bundle.entries.pop();

    let result = verify_bundle(&bundle, &test_key());

    assert_eq!(result.reason, Some(ChainBreak::MetadataMismatch));
}

#[test]
fn bundle_checked_with_another_key_is_a_key_mismatch() {
    let (_store, log, _clock) = seeded();
    let bundle = log.review_bundle(AuditRange::ALL).unwrap();

    let result = verify_bundle(&bundle, &AuditKey::new(vec![0x22; 48]).unwrap());

    assert_eq!(result.reason, Some(ChainBreak::KeyMismatch));
}

#[test]
fn empty_log_exports_an_empty_bundle() {
    let store = TamperableStore::default();
    let log = open(&store, test_key(), &test_clock());

    let bundle = log.review_bundle(AuditRange::ALL).unwrap();

    assert_eq!(bundle.entry_count, 0);
    assert!(bundle.entries.is_empty());
    assert_eq!(bundle.final_hash, GENESIS_HASH);
    assert!(verify_bundle(&bundle, &test_key()).valid);
    assert!(log.verify_chain().unwrap().valid);
}

#[test]
fn out_of_bounds_ranges_are_rejected() {
    let (_store, log, _clock) = seeded();

    for range in [
        AuditRange::new(0, None),
        AuditRange::new(3, Some(2)),
        AuditRange::new(1, Some(4)),
        AuditRange::new(5, None),
    ] {
        let result = log.review_bundle(range);
        assert!(matches!(result, Err(AuditError::InvalidRange(_))), "{range:?}");
    }
}

// ============================================================================
// SECTION: Queries
// ============================================================================

#[test]
fn turn_trail_and_stats_reflect_the_chain() {
    let (_store, log, _clock) = seeded();

    let trail = log.turn_trail(&turn("t1")).unwrap();
    let stats = log.stats().unwrap();

    assert_eq!(trail.iter().map(|entry| entry.seq).collect::<Vec<_>>(), vec![1, 2]);
    assert!(log.turn_trail(&turn("t2")).unwrap().is_empty());
    assert_eq!(stats.entry_count, 3);
    assert_eq!(stats.head_seq, 3);
    assert_eq!(stats.by_event_type.get("AUTHORITY_CHECK"), Some(&1));
    assert_eq!(stats.by_event_type.get("GRANT_CHANGE"), Some(&1));
    assert_eq!(log.key_fingerprint(), test_key().fingerprint());
}
