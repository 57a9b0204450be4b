// crates/toolgate-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Integration tests for the toolgate binary.
// Purpose: Ensure audit, grant, and config commands work end to end and fail closed.
// Dependencies: toolgate-cli binary, toolgate-core, toolgate-store-sqlite, rusqlite
// ============================================================================

//! ## Overview
//! Seeds a `SQLite` database through the library, then drives the `toolgate`
//! binary against it. Tampering is done through a raw connection.

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

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;
use std::sync::Arc;

use rusqlite::Connection;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use toolgate_core::AuditActor;
use toolgate_core::AuditDraft;
use toolgate_core::AuditEventType;
use toolgate_core::AuditKey;
use toolgate_core::AuditLog;
use toolgate_core::SystemClock;
use toolgate_core::TurnId;
use toolgate_store_sqlite::SqliteStore;
use toolgate_store_sqlite::SqliteStoreConfig;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const KEY: &str = "cli-test-key-0123456789abcdef0123";

fn toolgate_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_toolgate"))
}

/// Temp workspace holding a config file and a database path.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let workspace = Self {
            dir: TempDir::new().unwrap(),
        };
        let config = format!(
            r#"
[store]
type = "sqlite"
path = "{}"

[[grants]]
scope = "level:read"
level = "read"
"#,
            workspace.db_path().display()
        );
        fs::write(workspace.config_path(), config).unwrap();
        workspace
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("toolgate.toml")
    }

    fn db_path(&self) -> PathBuf {
        self.dir.path().join("toolgate.db")
    }

    fn seed(&self, count: u64) {
        let store = SqliteStore::open(&SqliteStoreConfig::at(self.db_path())).unwrap();
        let log = AuditLog::open(
            Arc::new(store.audit_store()),
            Arc::new(AuditKey::new(KEY.as_bytes().to_vec()).unwrap()),
            Arc::new(SystemClock),
        )
        .unwrap();
        let turn_id = TurnId::parse("turn-1").unwrap();
        for attempt in 0 .. count {
            log.append(AuditDraft::for_turn(
                &turn_id,
                AuditEventType::ToolExecute,
                AuditActor::Executor,
                json!({ "tool": "search", "attempt": attempt }),
            ))
            .unwrap();
        }
    }

    fn run(&self, args: &[&str]) -> Output {
        let config = self.config_path();
        let mut full: Vec<&str> = args.to_vec();
        full.push("--config");
        full.push(config.to_str().unwrap());
        Command::new(toolgate_bin())
            .args(&full)
            .env("TOOLGATE_AUDIT_KEY", KEY)
            .env_remove("TOOLGATE_CONFIG")
            .output()
            .expect("run toolgate")
    }
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!("stdout is not json ({err}): {}", String::from_utf8_lossy(&output.stdout))
    })
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn tamper(path: &Path, sql: &str) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch("DROP TRIGGER IF EXISTS audit_entries_no_update;").unwrap();
    conn.execute_batch(sql).unwrap();
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

#[test]
fn config_validate_accepts_valid_config() {
    let workspace = Workspace::new();

    let output = workspace.run(&["config", "validate"]);

    assert!(output.status.success(), "{}", stderr_text(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("config ok"));
}

#[test]
fn config_validate_rejects_invalid_config() {
    let workspace = Workspace::new();
    fs::write(workspace.config_path(), "[authority]\nconfirmable = [\"read\"]\n").unwrap();

    let output = workspace.run(&["config", "validate"]);

    assert!(!output.status.success());
    assert!(stderr_text(&output).contains("read level cannot require confirmation"));
}

#[test]
fn printed_example_config_validates() {
    let workspace = Workspace::new();
    let example = Command::new(toolgate_bin()).args(["config", "example"]).output().unwrap();
    assert!(example.status.success());
    fs::write(workspace.config_path(), &example.stdout).unwrap();

    let output = workspace.run(&["config", "validate"]);

    assert!(output.status.success(), "{}", stderr_text(&output));
}

// ============================================================================
// SECTION: Audit Commands
// ============================================================================

#[test]
fn audit_verify_reports_intact_chain() {
    let workspace = Workspace::new();
    workspace.seed(3);

    let output = workspace.run(&["audit", "verify"]);

    assert!(output.status.success(), "{}", stderr_text(&output));
    let result = stdout_json(&output);
    assert_eq!(result["valid"], json!(true));
    assert_eq!(result["entries_checked"], json!(3));
}

#[test]
fn audit_verify_fails_on_tampered_payload() {
    let workspace = Workspace::new();
    workspace.seed(3);
    tamper(
        &workspace.db_path(),
        "UPDATE audit_entries SET payload = CAST('{\"tool\":\"search\",\"attempt\":7}' AS BLOB) \
         WHERE seq = 2;",
    );

    let output = workspace.run(&["audit", "verify"]);

    assert!(!output.status.success());
    let result = stdout_json(&output);
    assert_eq!(result["valid"], json!(false));
    assert_eq!(result["broken_at"], json!(2));
}

#[test]
fn audit_commands_require_the_key() {
    let workspace = Workspace::new();
    workspace.seed(1);

    let output = Command::new(toolgate_bin())
        .args(["audit", "verify", "--config", workspace.config_path().to_str().unwrap()])
        .env_remove("TOOLGATE_AUDIT_KEY")
        .env_remove("TOOLGATE_CONFIG")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stderr_text(&output).contains("TOOLGATE_AUDIT_KEY is not set"));
}

#[test]
fn audit_commands_require_sqlite_store() {
    let workspace = Workspace::new();
    fs::write(workspace.config_path(), "").unwrap();

    let output = workspace.run(&["audit", "stats"]);

    assert!(!output.status.success());
    assert!(stderr_text(&output).contains("requires store.type"));
}

#[test]
fn exported_bundle_verifies_and_detects_edits() {
    let workspace = Workspace::new();
    workspace.seed(4);
    let bundle_path = workspace.dir.path().join("bundle.json");

    let export = workspace.run(&[
        "audit",
        "export",
        "--from",
        "2",
        "--to",
        "3",
        "--output",
        bundle_path.to_str().unwrap(),
    ]);
    assert!(export.status.success(), "{}", stderr_text(&export));

    let verify = workspace.run(&["audit", "verify-bundle", "--bundle", bundle_path.to_str().unwrap()]);
    assert!(verify.status.success(), "{}", stderr_text(&verify));
    assert_eq!(stdout_json(&verify)["entries_checked"], json!(2));

    let mut bundle: Value = serde_json::from_slice(&fs::read(&bundle_path).unwrap()).unwrap();
    bundle["entries"][1]["payload"]["attempt"] = json!(99);
    fs::write(&bundle_path, serde_json::to_vec(&bundle).unwrap()).unwrap();

    let tampered =
        workspace.run(&["audit", "verify-bundle", "--bundle", bundle_path.to_str().unwrap()]);
    assert!(!tampered.status.success());
    assert_eq!(stdout_json(&tampered)["valid"], json!(false));
}

#[test]
fn audit_trail_and_stats_read_the_store() {
    let workspace = Workspace::new();
    workspace.seed(3);

    let trail = workspace.run(&["audit", "trail", "--turn", "turn-1"]);
    let stats = workspace.run(&["audit", "stats"]);

    assert!(trail.status.success(), "{}", stderr_text(&trail));
    assert_eq!(stdout_json(&trail).as_array().map(Vec::len), Some(3));
    assert!(stats.status.success(), "{}", stderr_text(&stats));
    assert_eq!(stdout_json(&stats)["head_seq"], json!(3));
}

#[test]
fn audit_trail_rejects_invalid_turn_id() {
    let workspace = Workspace::new();

    let output = workspace.run(&["audit", "trail", "--turn", ""]);

    assert!(!output.status.success());
    assert!(stderr_text(&output).contains("invalid turn id"));
}

// ============================================================================
// SECTION: Grant Commands
// ============================================================================

#[test]
fn grants_add_list_and_revoke() {
    let workspace = Workspace::new();

    let added =
        workspace.run(&["grants", "add", "--scope", "write_file", "--level", "write", "--one-time"]);
    assert!(added.status.success(), "{}", stderr_text(&added));
    let grant = stdout_json(&added);
    let id = grant["id"].as_str().unwrap().to_string();
    assert_eq!(grant["source"], json!("user"));
    assert_eq!(grant["one_time"], json!(true));

    let listed = stdout_json(&workspace.run(&["grants", "list"]));
    let ids: Vec<&str> =
        listed.as_array().unwrap().iter().filter_map(|grant| grant["id"].as_str()).collect();
    assert!(ids.contains(&id.as_str()));
    assert!(ids.iter().any(|id| id.starts_with("config:")), "configured grant is listed");

    let revoked = workspace.run(&["grants", "revoke", "--id", &id]);
    assert!(revoked.status.success(), "{}", stderr_text(&revoked));
    assert_eq!(stdout_json(&revoked)["revoked"], json!(true));

    let active = stdout_json(&workspace.run(&["grants", "list"]));
    assert!(active.as_array().unwrap().iter().all(|grant| grant["id"] != json!(id)));
    let all = stdout_json(&workspace.run(&["grants", "list", "--all"]));
    assert!(all.as_array().unwrap().iter().any(|grant| grant["id"] == json!(id)
        && grant["revoked"] == json!(true)));

    let verify = workspace.run(&["audit", "verify"]);
    assert!(verify.status.success(), "grant changes keep the chain intact");
}

#[test]
fn grant_changes_are_refused_while_a_live_writer_holds_the_store() {
    let workspace = Workspace::new();
    workspace.seed(2);
    let added = workspace.run(&["grants", "add", "--scope", "deploy", "--level", "execute"]);
    let id = stdout_json(&added)["id"].as_str().unwrap().to_string();
    let live = SqliteStore::open(&SqliteStoreConfig::at(workspace.db_path())).unwrap();
    let live_log = AuditLog::open(
        Arc::new(live.audit_store()),
        Arc::new(AuditKey::new(KEY.as_bytes().to_vec()).unwrap()),
        Arc::new(SystemClock),
    )
    .unwrap();

    let revoke = workspace.run(&["grants", "revoke", "--id", &id]);
    let add = workspace.run(&["grants", "add", "--scope", "*", "--level", "read"]);
    let verify = workspace.run(&["audit", "verify"]);
    let listed = workspace.run(&["grants", "list"]);
    let appended = live_log.append(AuditDraft::detached(
        AuditEventType::TurnLifecycle,
        AuditActor::System,
        json!({ "action": "still_live" }),
    ));

    assert!(!revoke.status.success());
    assert!(stderr_text(&revoke).contains("refusing to modify"), "{}", stderr_text(&revoke));
    assert!(!add.status.success());
    assert!(verify.status.success(), "{}", stderr_text(&verify));
    assert!(listed.status.success(), "{}", stderr_text(&listed));
    assert!(appended.is_ok(), "live writer keeps appending");
    drop(live_log);
    drop(live);

    let revoked = workspace.run(&["grants", "revoke", "--id", &id]);
    assert!(revoked.status.success(), "{}", stderr_text(&revoked));
    let verify = workspace.run(&["audit", "verify"]);
    assert!(verify.status.success(), "{}", stderr_text(&verify));
}

#[test]
fn grants_add_rejects_blocked_level() {
    let workspace = Workspace::new();

    let output = workspace.run(&["grants", "add", "--scope", "*", "--level", "admin"]);

    assert!(!output.status.success());
    assert!(stderr_text(&output).contains("grant failed"));
}

#[test]
fn grants_revoke_unknown_id_fails() {
    let workspace = Workspace::new();

    let output = workspace.run(&["grants", "revoke", "--id", "user:missing"]);

    assert!(!output.status.success());
    assert!(stderr_text(&output).contains("unknown grant"));
}
