// crates/toolgate-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for Toolgate configuration. The output is deterministic
//! and is required to pass validation.

/// Returns a canonical example `toolgate.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[breaker]
failure_threshold = 5
recovery_timeout_ms = 30000

[[breaker.tools]]
tool = "web_search"
failure_threshold = 3
recovery_timeout_ms = 10000

[budget]
max_total_failures = 3
max_consecutive_failures = 2

[retry.tool_execution]
max_retries = 2
delay_ms = 1000

[retry.external_service]
max_retries = 3
delay_ms = 1000

[retry.timeout]
max_retries = 1
delay_ms = 2000

[authority]
always_blocked = ["admin"]
confirmable = ["write", "execute", "network"]
confirmation_timeout_ms = 60000

[[degradation.overrides]]
category = "external_service"
level = "network"
strategy = "fail_fast"

[tools]
default_timeout_ms = 30000

[[grants]]
scope = "level:read"
level = "read"

[[grants]]
scope = "calendar_create"
level = "write"
one_time = true

[audit]
key_env = "TOOLGATE_AUDIT_KEY"

[store]
type = "sqlite"
path = "toolgate.db"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000

[telemetry]
sink = "stderr"
"#,
    )
}
