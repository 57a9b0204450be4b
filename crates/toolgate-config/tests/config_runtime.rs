//! Runtime wiring tests for toolgate-config.
// crates/toolgate-config/tests/config_runtime.rs
// =============================================================================
// Module: Config Runtime Wiring Tests
// Description: Validate audit key sourcing, store opening, and sink wiring.
// Purpose: Ensure a loaded config produces working control-plane components.
// =============================================================================

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use toolgate_config::ConfigError;
use toolgate_config::StoreType;
use toolgate_config::TelemetrySinkType;
use toolgate_core::AuditActor;
use toolgate_core::AuditDraft;
use toolgate_core::AuditEventType;
use toolgate_core::AuditLog;
use toolgate_core::BreakerState;
use toolgate_core::ControlEvent;
use toolgate_core::ManualClock;
use toolgate_core::Timestamp;
use toolgate_core::ToolName;

mod common;

type TestResult = Result<(), String>;

const KEY: &str = "0123456789abcdef0123456789abcdef";

// ============================================================================
// SECTION: Audit Key
// ============================================================================

#[test]
fn audit_key_is_read_from_named_variable() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.audit.key_env = "ASSISTANT_AUDIT_KEY".to_string();

    let key = config
        .audit_key_with(|name| (name == "ASSISTANT_AUDIT_KEY").then(|| KEY.to_string()))
        .map_err(|err| err.to_string())?;

    if key.fingerprint().len() != 16 {
        return Err(format!("unexpected fingerprint {}", key.fingerprint()));
    }
    Ok(())
}

#[test]
fn missing_audit_key_fails_closed() -> TestResult {
    let config = common::minimal_config().map_err(|err| err.to_string())?;
    common::assert_invalid(config.audit_key_with(|_| None), "TOOLGATE_AUDIT_KEY is not set")
}

#[test]
fn short_audit_key_is_rejected() -> TestResult {
    let config = common::minimal_config().map_err(|err| err.to_string())?;
    common::assert_invalid(config.audit_key_with(|_| Some("short".to_string())), "at least 32")
}

// ============================================================================
// SECTION: Stores
// ============================================================================

#[test]
fn memory_stores_back_a_working_audit_log() -> TestResult {
    let config = common::minimal_config().map_err(|err| err.to_string())?;
    let stores = config.open_stores().map_err(|err| err.to_string())?;
    let key = config.audit_key_with(|_| Some(KEY.to_string())).map_err(|err| err.to_string())?;
    let clock = ManualClock::starting_at(Timestamp::from_unix_millis(1_700_000_000_000));

    let log = AuditLog::open(stores.audit, Arc::new(key), Arc::new(clock))
        .map_err(|err| err.to_string())?;
    log.append(AuditDraft::detached(
        AuditEventType::TurnLifecycle,
        AuditActor::System,
        serde_json::json!({ "action": "boot" }),
    ))
    .map_err(|err| err.to_string())?;

    let result = log.verify_chain().map_err(|err| err.to_string())?;
    if !result.valid || result.entries_checked != 1 {
        return Err("expected one verified entry".to_string());
    }
    Ok(())
}

#[test]
fn sqlite_store_is_opened_at_configured_path() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("state").join("toolgate.db");
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.store_type = StoreType::Sqlite;
    config.store.path = Some(path.clone());
    config.validate().map_err(|err| err.to_string())?;

    let stores = config.open_stores().map_err(|err| err.to_string())?;
    let grants = stores.grants.load_grants().map_err(|err| err.to_string())?;

    if !path.exists() || !grants.is_empty() {
        return Err("expected an empty database at the configured path".to_string());
    }
    Ok(())
}

#[test]
fn second_sqlite_writer_is_store_error() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.store_type = StoreType::Sqlite;
    config.store.path = Some(dir.path().join("toolgate.db"));

    let _live = config.open_stores().map_err(|err| err.to_string())?;
    match config.open_stores() {
        Err(ConfigError::Store(message)) if message.contains("locked") => Ok(()),
        Err(other) => Err(format!("expected lock error, got {other}")),
        Ok(_) => Err("two writers opened one database".to_string()),
    }
}

#[test]
fn unopenable_sqlite_store_is_store_error() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.store_type = StoreType::Sqlite;
    config.store.path = Some(dir.path().to_path_buf());

    match config.open_stores() {
        Err(ConfigError::Store(_)) => Ok(()),
        Err(other) => Err(format!("expected store error, got {other}")),
        Ok(_) => Err("a directory is not a database".to_string()),
    }
}

// ============================================================================
// SECTION: Telemetry
// ============================================================================

#[test]
fn file_sink_appends_json_lines() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("events.jsonl");
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.telemetry.sink = TelemetrySinkType::File;
    config.telemetry.path = Some(path.clone());
    config.validate().map_err(|err| err.to_string())?;

    let sink = config.event_sink().map_err(|err| err.to_string())?;
    sink.record(
        Timestamp::from_unix_millis(1_700_000_000_000),
        &ControlEvent::BreakerTransition {
            tool: ToolName::new("search"),
            from: BreakerState::Closed,
            to: BreakerState::Open,
            consecutive_failures: 5,
        },
    );
    drop(sink);

    let content = fs::read_to_string(&path).map_err(|err| err.to_string())?;
    let line = content.lines().next().ok_or("expected one event line")?;
    let value: serde_json::Value = serde_json::from_str(line).map_err(|err| err.to_string())?;
    if !line.contains("search") || !value.is_object() {
        return Err(format!("unexpected event line: {line}"));
    }
    Ok(())
}

#[test]
fn default_sink_is_noop() -> TestResult {
    let config = common::minimal_config().map_err(|err| err.to_string())?;
    let sink = config.event_sink().map_err(|err| err.to_string())?;
    sink.record(
        Timestamp::from_unix_millis(0),
        &ControlEvent::BreakerTransition {
            tool: ToolName::new("search"),
            from: BreakerState::Closed,
            to: BreakerState::Open,
            consecutive_failures: 5,
        },
    );
    Ok(())
}
