// crates/toolgate-core/tests/authority.rs
// ============================================================================
// Module: Tool Authority Tests
// Description: Tests for grant selection, lifecycle, and decision recording.
// Purpose: Ensure deny-by-default and grant state changes take effect immediately.
// ============================================================================

//! ## Overview
//! Exercises the authority directly: default denial for reads, confirmation
//! routing for sensitive levels, blocked levels, revocation, expiry,
//! one-time consumption, and persistence of configured grant state.

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
use std::time::Duration;

use common::test_clock;
use common::test_key;
use common::turn;
use serde_json::json;
use toolgate_core::AuditEventType;
use toolgate_core::AuditLog;
use toolgate_core::AuditStore;
use toolgate_core::AuthorityError;
use toolgate_core::AuthorityOutcome;
use toolgate_core::AuthoritySettings;
use toolgate_core::Clock;
use toolgate_core::ConfirmationOutcome;
use toolgate_core::DecisionReason;
use toolgate_core::GrantId;
use toolgate_core::GrantRequest;
use toolgate_core::GrantScope;
use toolgate_core::GrantSource;
use toolgate_core::GrantStore;
use toolgate_core::InMemoryAuditStore;
use toolgate_core::InMemoryGrantStore;
use toolgate_core::ManualClock;
use toolgate_core::PermissionLevel;
use toolgate_core::ToolAuthority;
use toolgate_core::ToolName;
use toolgate_core::config_grant_id;
use toolgate_core::core::hashing::canonical_json_bytes;
use toolgate_core::core::hashing::sha256_hex;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

struct Fixture {
    clock: ManualClock,
    audit_store: InMemoryAuditStore,
    grant_store: InMemoryGrantStore,
    authority: ToolAuthority,
}

fn fixture(configured: &[GrantRequest]) -> Fixture {
    fixture_with_store(configured, InMemoryGrantStore::new())
}

fn fixture_with_store(configured: &[GrantRequest], grant_store: InMemoryGrantStore) -> Fixture {
    let clock = test_clock();
    let audit_store = InMemoryAuditStore::new();
    let audit = Arc::new(
        AuditLog::open(Arc::new(audit_store.clone()), Arc::new(test_key()), Arc::new(clock.clone()))
            .unwrap(),
    );
    let authority = ToolAuthority::new(
        AuthoritySettings::default(),
        configured,
        Arc::new(grant_store.clone()),
        audit,
        Arc::new(clock.clone()),
    )
    .unwrap();
    Fixture {
        clock,
        audit_store,
        grant_store,
        authority,
    }
}

fn tool(name: &str) -> ToolName {
    ToolName::new(name)
}

fn config(scope: GrantScope, level: PermissionLevel) -> GrantRequest {
    GrantRequest::new(scope, level, GrantSource::Config)
}

fn user(scope: GrantScope, level: PermissionLevel) -> GrantRequest {
    GrantRequest::new(scope, level, GrantSource::User)
}

// ============================================================================
// SECTION: Default Decisions
// ============================================================================

#[test]
fn read_without_grant_is_denied_not_confirmed() {
    let fx = fixture(&[]);

    let decision =
        fx.authority.check(&tool("lookup"), &json!({}), PermissionLevel::Read, &turn("t1")).unwrap();

    assert_eq!(decision.outcome, AuthorityOutcome::Deny);
    assert_eq!(decision.reason, Some(DecisionReason::NoGrant));
    assert!(decision.matched_grant.is_none());
}

#[test]
fn sensitive_levels_without_grant_require_confirmation() {
    let fx = fixture(&[]);

    for level in [PermissionLevel::Write, PermissionLevel::Execute, PermissionLevel::Network] {
        let decision = fx.authority.check(&tool("t"), &json!({}), level, &turn("t1")).unwrap();
        assert_eq!(decision.outcome, AuthorityOutcome::ConfirmRequired, "{level}");
    }
}

#[test]
fn admin_is_blocked_even_with_wildcard_admin_grant() {
    let fx = fixture(&[config(GrantScope::Any, PermissionLevel::Admin)]);

    let decision =
        fx.authority.check(&tool("root"), &json!({}), PermissionLevel::Admin, &turn("t1")).unwrap();

    assert_eq!(decision.outcome, AuthorityOutcome::Deny);
    assert_eq!(decision.reason, Some(DecisionReason::LevelBlocked));
}

#[test]
fn grant_at_other_level_reports_insufficient_level() {
    let fx = fixture(&[config(GrantScope::Tool(tool("files")), PermissionLevel::Read)]);

    let decision =
        fx.authority.check(&tool("files"), &json!({}), PermissionLevel::Write, &turn("t1")).unwrap();

    assert_eq!(decision.outcome, AuthorityOutcome::ConfirmRequired);
    assert_eq!(decision.reason, Some(DecisionReason::InsufficientLevel));
}

#[test]
fn every_check_is_audited_with_parameter_digest_only() {
    let fx = fixture(&[config(GrantScope::Level(PermissionLevel::Read), PermissionLevel::Read)]);
    let params = json!({ "secret": "hunter2" });

    fx.authority.check(&tool("lookup"), &params, PermissionLevel::Read, &turn("t1")).unwrap();

    let entries = fx.audit_store.read_range(1, None, 10).unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.event_type, AuditEventType::AuthorityCheck);
    assert_eq!(entry.payload["outcome"], json!("ALLOW"));
    let digest = sha256_hex(&canonical_json_bytes(&params).unwrap());
    assert_eq!(entry.payload["params_sha256"], json!(digest));
    assert!(!entry.payload.to_string().contains("hunter2"));
}

// ============================================================================
// SECTION: Grant Selection
// ============================================================================

#[test]
fn exact_tool_grant_wins_over_level_and_wildcard() {
    let fx = fixture(&[
        config(GrantScope::Any, PermissionLevel::Read),
        config(GrantScope::Level(PermissionLevel::Read), PermissionLevel::Read),
        config(GrantScope::Tool(tool("lookup")), PermissionLevel::Read),
    ]);

    let decision =
        fx.authority.check(&tool("lookup"), &json!({}), PermissionLevel::Read, &turn("t1")).unwrap();

    assert_eq!(
        decision.matched_grant,
        Some(config_grant_id(&GrantScope::Tool(tool("lookup")), PermissionLevel::Read))
    );
}

#[test]
fn session_grant_is_preferred_over_persistent_grant() {
    let fx = fixture(&[config(GrantScope::Tool(tool("lookup")), PermissionLevel::Read)]);
    let session = fx
        .authority
        .grant(
            GrantRequest::new(GrantScope::Any, PermissionLevel::Read, GrantSource::Session),
            Some(&turn("t1")),
        )
        .unwrap();

    let decision =
        fx.authority.check(&tool("lookup"), &json!({}), PermissionLevel::Read, &turn("t1")).unwrap();

    assert_eq!(decision.matched_grant, Some(session.id));
    assert!(fx.grant_store.load_grants().unwrap().iter().all(|g| g.source != GrantSource::Session));
}

#[test]
fn admin_grant_covers_lower_levels() {
    let mut settings = AuthoritySettings::default();
    settings.always_blocked.clear();
    let clock = test_clock();
    let audit = Arc::new(
        AuditLog::open(
            Arc::new(InMemoryAuditStore::new()),
            Arc::new(test_key()),
            Arc::new(clock.clone()),
        )
        .unwrap(),
    );
    let authority = ToolAuthority::new(
        settings,
        &[config(GrantScope::Tool(tool("ops")), PermissionLevel::Admin)],
        Arc::new(InMemoryGrantStore::new()),
        audit,
        Arc::new(clock),
    )
    .unwrap();

    let decision =
        authority.check(&tool("ops"), &json!({}), PermissionLevel::Execute, &turn("t1")).unwrap();

    assert!(decision.is_allowed());
}

// ============================================================================
// SECTION: Grant Lifecycle
// ============================================================================

#[test]
fn revocation_applies_to_the_next_check() {
    let fx = fixture(&[]);
    let granted =
        fx.authority.grant(user(GrantScope::Tool(tool("lookup")), PermissionLevel::Read), None).unwrap();
    assert!(
        fx.authority
            .check(&tool("lookup"), &json!({}), PermissionLevel::Read, &turn("t1"))
            .unwrap()
            .is_allowed()
    );

    fx.authority.revoke(&granted.id).unwrap();
    let decision =
        fx.authority.check(&tool("lookup"), &json!({}), PermissionLevel::Read, &turn("t1")).unwrap();

    assert_eq!(decision.outcome, AuthorityOutcome::Deny);
    assert_eq!(decision.reason, Some(DecisionReason::GrantRevoked));
    let stored = fx.grant_store.load_grants().unwrap();
    assert!(stored.iter().any(|grant| grant.id == granted.id && grant.revoked));
}

#[test]
fn revocation_of_confirmable_levels_denies_instead_of_confirming() {
    let fx = fixture(&[]);
    for (name, level) in [("save", PermissionLevel::Write), ("fetch", PermissionLevel::Network)] {
        let granted =
            fx.authority.grant(user(GrantScope::Tool(tool(name)), level), None).unwrap();
        fx.authority.revoke(&granted.id).unwrap();

        let decision = fx.authority.check(&tool(name), &json!({}), level, &turn("t1")).unwrap();

        assert_eq!(decision.outcome, AuthorityOutcome::Deny, "{name}");
        assert_eq!(decision.reason, Some(DecisionReason::GrantRevoked), "{name}");
    }
}

#[test]
fn expired_write_grant_is_denied_not_confirmed() {
    let fx = fixture(&[]);
    let expiry = fx.clock.now().saturating_add(Duration::from_secs(5));
    fx.authority
        .grant(user(GrantScope::Tool(tool("save")), PermissionLevel::Write).expiring_at(expiry), None)
        .unwrap();

    fx.clock.advance(Duration::from_secs(5));
    let decision =
        fx.authority.check(&tool("save"), &json!({}), PermissionLevel::Write, &turn("t1")).unwrap();

    assert_eq!(decision.outcome, AuthorityOutcome::Deny);
    assert_eq!(decision.reason, Some(DecisionReason::GrantExpired));
}

#[test]
fn revoking_unknown_grant_is_an_error() {
    let fx = fixture(&[]);

    let err = fx.authority.revoke(&GrantId::new("user:0-0")).unwrap_err();

    assert!(matches!(err, AuthorityError::UnknownGrant(_)));
}

#[test]
fn expired_grant_is_denied_with_expiry_reason() {
    let fx = fixture(&[]);
    let expiry = fx.clock.now().saturating_add(Duration::from_secs(60));
    fx.authority
        .grant(user(GrantScope::Tool(tool("lookup")), PermissionLevel::Read).expiring_at(expiry), None)
        .unwrap();

    fx.clock.advance(Duration::from_secs(60));
    let decision =
        fx.authority.check(&tool("lookup"), &json!({}), PermissionLevel::Read, &turn("t1")).unwrap();

    assert_eq!(decision.reason, Some(DecisionReason::GrantExpired));
    assert!(fx.authority.active_grants().unwrap().is_empty());
    assert_eq!(fx.authority.all_grants().unwrap().len(), 1);
}

#[test]
fn grant_with_past_expiry_is_rejected() {
    let fx = fixture(&[]);
    let past = fx.clock.now();

    let err = fx
        .authority
        .grant(user(GrantScope::Any, PermissionLevel::Read).expiring_at(past), None)
        .unwrap_err();

    assert!(matches!(err, AuthorityError::Invalid(_)));
}

#[test]
fn blocked_level_cannot_be_granted() {
    let fx = fixture(&[]);

    let err = fx.authority.grant(user(GrantScope::Any, PermissionLevel::Admin), None).unwrap_err();

    assert!(matches!(err, AuthorityError::Invalid(_)));
}

#[test]
fn one_time_grant_authorizes_exactly_once() {
    let fx = fixture(&[]);
    fx.authority
        .grant(user(GrantScope::Tool(tool("deploy")), PermissionLevel::Execute).single_use(), None)
        .unwrap();

    let first =
        fx.authority.check(&tool("deploy"), &json!({}), PermissionLevel::Execute, &turn("t1")).unwrap();
    let second =
        fx.authority.check(&tool("deploy"), &json!({}), PermissionLevel::Execute, &turn("t1")).unwrap();

    assert!(first.is_allowed());
    assert_eq!(first.reason, Some(DecisionReason::OneTimeConsumed));
    assert_eq!(second.outcome, AuthorityOutcome::Deny);
    assert_eq!(second.reason, Some(DecisionReason::GrantConsumed));
    let consumed: Vec<_> = fx
        .audit_store
        .read_range(1, None, 100)
        .unwrap()
        .into_iter()
        .filter(|entry| entry.payload["action"] == json!("consumed"))
        .collect();
    assert_eq!(consumed.len(), 1);
}

#[test]
fn reusable_grant_is_preferred_over_one_time_grant() {
    let fx = fixture(&[]);
    fx.authority
        .grant(user(GrantScope::Tool(tool("lookup")), PermissionLevel::Read).single_use(), None)
        .unwrap();
    let reusable =
        fx.authority.grant(user(GrantScope::Tool(tool("lookup")), PermissionLevel::Read), None).unwrap();

    let decision =
        fx.authority.check(&tool("lookup"), &json!({}), PermissionLevel::Read, &turn("t1")).unwrap();

    assert_eq!(decision.matched_grant, Some(reusable.id));
    assert!(fx.authority.active_grants().unwrap().iter().all(|grant| !grant.consumed));
}

#[test]
fn clearing_session_grants_keeps_persistent_grants() {
    let fx = fixture(&[config(GrantScope::Tool(tool("lookup")), PermissionLevel::Read)]);
    fx.authority
        .grant(GrantRequest::new(GrantScope::Any, PermissionLevel::Write, GrantSource::Session), None)
        .unwrap();

    let removed = fx.authority.clear_session_grants().unwrap();

    assert_eq!(removed, 1);
    let remaining = fx.authority.all_grants().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].source, GrantSource::Config);
}

#[test]
fn config_grants_cannot_be_issued_at_runtime() {
    let fx = fixture(&[]);

    let err =
        fx.authority.grant(config(GrantScope::Any, PermissionLevel::Read), None).unwrap_err();

    assert!(matches!(err, AuthorityError::Invalid(_)));
}

#[test]
fn configured_grants_must_be_config_sourced() {
    let clock = test_clock();
    let audit = Arc::new(
        AuditLog::open(
            Arc::new(InMemoryAuditStore::new()),
            Arc::new(test_key()),
            Arc::new(clock.clone()),
        )
        .unwrap(),
    );

    let result = ToolAuthority::new(
        AuthoritySettings::default(),
        &[user(GrantScope::Any, PermissionLevel::Read)],
        Arc::new(InMemoryGrantStore::new()),
        audit,
        Arc::new(clock),
    );

    assert!(matches!(result, Err(AuthorityError::Invalid(_))));
}

// ============================================================================
// SECTION: Persistence Across Restarts
// ============================================================================

#[test]
fn revoked_config_grant_stays_revoked_after_restart() {
    let configured = [config(GrantScope::Tool(tool("lookup")), PermissionLevel::Read)];
    let first = fixture(&configured);
    let id = config_grant_id(&GrantScope::Tool(tool("lookup")), PermissionLevel::Read);
    first.authority.revoke(&id).unwrap();

    let restarted = fixture_with_store(&configured, first.grant_store.clone());
    let decision = restarted
        .authority
        .check(&tool("lookup"), &json!({}), PermissionLevel::Read, &turn("t2"))
        .unwrap();

    assert_eq!(decision.reason, Some(DecisionReason::GrantRevoked));
}

#[test]
fn user_grants_survive_restart_and_session_grants_do_not() {
    let first = fixture(&[]);
    let persistent =
        first.authority.grant(user(GrantScope::Tool(tool("a")), PermissionLevel::Read), None).unwrap();
    first
        .authority
        .grant(
            GrantRequest::new(GrantScope::Tool(tool("b")), PermissionLevel::Read, GrantSource::Session),
            None,
        )
        .unwrap();

    let restarted = fixture_with_store(&[], first.grant_store.clone());
    let grants = restarted.authority.all_grants().unwrap();

    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].id, persistent.id);
}

// ============================================================================
// SECTION: Confirmation Resolution
// ============================================================================

#[test]
fn unapproved_confirmations_resolve_to_confirm_denied() {
    let fx = fixture(&[]);

    for (outcome, reason) in [
        (ConfirmationOutcome::Denied, DecisionReason::ConfirmationDenied),
        (ConfirmationOutcome::TimedOut, DecisionReason::ConfirmationTimedOut),
        (ConfirmationOutcome::Cancelled, DecisionReason::ConfirmationCancelled),
    ] {
        let decision = fx
            .authority
            .resolve_confirmation(&tool("w"), &json!({}), PermissionLevel::Write, &turn("t1"), &outcome)
            .unwrap();
        assert_eq!(decision.outcome, AuthorityOutcome::ConfirmDenied);
        assert_eq!(decision.reason, Some(reason));
    }
}
