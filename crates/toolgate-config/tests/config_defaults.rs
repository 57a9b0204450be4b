//! Default and example config tests for toolgate-config.
// crates/toolgate-config/tests/config_defaults.rs
// =============================================================================
// Module: Config Default Tests
// Description: Validate defaults, the canonical example, and file loading.
// Purpose: Ensure an empty config maps to the documented control-plane behavior.
// =============================================================================

#![allow(
    clippy::use_debug,
    reason = "Test failure messages include debug renderings of config values."
)]

use std::fs;
use std::time::Duration;

use tempfile::TempDir;
use toolgate_config::ConfigError;
use toolgate_config::StoreType;
use toolgate_config::TelemetrySinkType;
use toolgate_config::ToolgateConfig;
use toolgate_config::config_toml_example;
use toolgate_core::ControlPlaneSettings;
use toolgate_core::DegradationStrategy;
use toolgate_core::ErrorCategory;
use toolgate_core::GrantScope;
use toolgate_core::GrantSource;
use toolgate_core::PermissionLevel;
use toolgate_core::ToolName;

mod common;

type TestResult = Result<(), String>;

#[test]
fn empty_config_maps_to_default_settings() -> TestResult {
    let config = common::minimal_config().map_err(|err| err.to_string())?;
    let settings = config.settings().map_err(|err| err.to_string())?;
    if settings != ControlPlaneSettings::default() {
        return Err(format!("unexpected settings: {settings:?}"));
    }
    if config.store.store_type != StoreType::Memory {
        return Err("default store should be memory".to_string());
    }
    if config.telemetry.sink != TelemetrySinkType::None {
        return Err("default sink should be none".to_string());
    }
    if config.audit.key_env != "TOOLGATE_AUDIT_KEY" {
        return Err(format!("unexpected key env {}", config.audit.key_env));
    }
    Ok(())
}

#[test]
fn canonical_example_validates() -> TestResult {
    let config =
        ToolgateConfig::from_toml(&config_toml_example()).map_err(|err| err.to_string())?;
    let settings = config.settings().map_err(|err| err.to_string())?;

    let search = settings.breaker.policy_for(&ToolName::new("web_search"));
    if search.failure_threshold.get() != 3 || search.recovery_timeout != Duration::from_secs(10) {
        return Err(format!("unexpected web_search policy: {search:?}"));
    }
    let other = settings.breaker.policy_for(&ToolName::new("read_file"));
    if other.failure_threshold.get() != 5 {
        return Err("tools without an override use the default".to_string());
    }
    let Some(entry) = settings.policy_overrides.first() else {
        return Err("expected one degradation override".to_string());
    };
    if entry.category != ErrorCategory::ExternalService
        || entry.level != PermissionLevel::Network
        || entry.strategy != DegradationStrategy::FailFast
    {
        return Err(format!("unexpected override: {entry:?}"));
    }
    if config.sqlite_config().is_none() {
        return Err("example selects the sqlite store".to_string());
    }
    Ok(())
}

#[test]
fn example_grants_become_config_requests() -> TestResult {
    let config =
        ToolgateConfig::from_toml(&config_toml_example()).map_err(|err| err.to_string())?;
    let requests = config.grant_requests().map_err(|err| err.to_string())?;

    if requests.len() != 2 {
        return Err(format!("expected 2 grants, got {}", requests.len()));
    }
    if requests.iter().any(|request| request.source != GrantSource::Config) {
        return Err("configured grants must be config-sourced".to_string());
    }
    if requests[0].scope != GrantScope::Level(PermissionLevel::Read) || requests[0].one_time {
        return Err(format!("unexpected first grant: {:?}", requests[0]));
    }
    if requests[1].scope != GrantScope::Tool(ToolName::new("calendar_create"))
        || requests[1].level != PermissionLevel::Write
        || !requests[1].one_time
    {
        return Err(format!("unexpected second grant: {:?}", requests[1]));
    }
    Ok(())
}

#[test]
fn load_reads_explicit_path() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("toolgate.toml");
    fs::write(&path, "[budget]\nmax_total_failures = 7\n").map_err(|err| err.to_string())?;

    let config = ToolgateConfig::load(Some(&path)).map_err(|err| err.to_string())?;

    if config.budget.max_total_failures != 7 || config.budget.max_consecutive_failures != 2 {
        return Err(format!("unexpected budget: {:?}", config.budget));
    }
    Ok(())
}

#[test]
fn load_missing_file_is_io_error() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    match ToolgateConfig::load(Some(&dir.path().join("absent.toml"))) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {other:?}")),
    }
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("toolgate.toml");
    let padding = format!("# {}\n", "x".repeat(1024 * 1024));
    fs::write(&path, padding).map_err(|err| err.to_string())?;
    common::assert_invalid(ToolgateConfig::load(Some(&path)), "size limit")
}

#[test]
fn load_rejects_non_utf8() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("toolgate.toml");
    fs::write(&path, [0xff_u8, 0xfe, 0x00]).map_err(|err| err.to_string())?;
    common::assert_invalid(ToolgateConfig::load(Some(&path)), "utf-8")
}

#[test]
fn malformed_toml_is_parse_error() -> TestResult {
    match ToolgateConfig::from_toml("[budget\n") {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {other:?}")),
    }
}

#[test]
fn unknown_strategy_is_parse_error() -> TestResult {
    let toml = r#"
[[degradation.overrides]]
category = "timeout"
level = "read"
strategy = "shrug"
"#;
    match ToolgateConfig::from_toml(toml) {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {other:?}")),
    }
}
