// crates/toolgate-config/src/config.rs
// ============================================================================
// Module: Toolgate Configuration
// Description: Configuration loading and validation for Toolgate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: toolgate-core, toolgate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section is optional and defaults to the documented control-plane
//! behavior. Permission levels and error categories are spelled as strings
//! and parsed during validation, so a typo is a load-time error rather than a
//! silently ignored rule.
//!
//! Security posture: config inputs are untrusted. The audit HMAC key is never
//! read from the file; `audit.key_env` names the environment variable that
//! carries it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::num::NonZeroU32;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use toolgate_core::AuditKey;
use toolgate_core::AuditStore;
use toolgate_core::AuthoritySettings;
use toolgate_core::BreakerPolicy;
use toolgate_core::BreakerSettings;
use toolgate_core::BudgetSettings;
use toolgate_core::ControlEventSink;
use toolgate_core::ControlPlaneSettings;
use toolgate_core::DegradationStrategy;
use toolgate_core::ErrorCategory;
use toolgate_core::FileEventSink;
use toolgate_core::GrantRequest;
use toolgate_core::GrantScope;
use toolgate_core::GrantSource;
use toolgate_core::GrantStore;
use toolgate_core::InMemoryAuditStore;
use toolgate_core::InMemoryGrantStore;
use toolgate_core::NoopEventSink;
use toolgate_core::PermissionLevel;
use toolgate_core::PolicyOverride;
use toolgate_core::RetryPolicy;
use toolgate_core::RetryRule;
use toolgate_core::SettingsError;
use toolgate_core::StderrEventSink;
use toolgate_core::Timestamp;
use toolgate_core::ToolName;
use toolgate_core::config_grant_id;
use toolgate_core::core::settings::DEFAULT_CONFIRMATION_TIMEOUT;
use toolgate_core::core::settings::DEFAULT_FAILURE_THRESHOLD;
use toolgate_core::core::settings::DEFAULT_MAX_CONSECUTIVE_FAILURES;
use toolgate_core::core::settings::DEFAULT_MAX_TOTAL_FAILURES;
use toolgate_core::core::settings::DEFAULT_RECOVERY_TIMEOUT;
use toolgate_core::core::settings::DEFAULT_TOOL_TIMEOUT;
use toolgate_store_sqlite::SqliteStore;
use toolgate_store_sqlite::SqliteStoreConfig;
use toolgate_store_sqlite::SqliteStoreMode;
use toolgate_store_sqlite::SqliteSyncMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "toolgate.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "TOOLGATE_CONFIG";
/// Default environment variable carrying the audit HMAC key.
pub const DEFAULT_AUDIT_KEY_ENV: &str = "TOOLGATE_AUDIT_KEY";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of per-tool breaker overrides.
pub(crate) const MAX_BREAKER_OVERRIDES: usize = 1024;
/// Maximum number of degradation overrides.
pub(crate) const MAX_POLICY_OVERRIDES: usize = 256;
/// Maximum number of configured grants.
pub(crate) const MAX_CONFIGURED_GRANTS: usize = 1024;
/// Maximum retries a single rule may allow.
pub(crate) const MAX_RETRIES_PER_RULE: u32 = 10;
/// Maximum delay between retries in milliseconds.
pub(crate) const MAX_RETRY_DELAY_MS: u64 = 60_000;
/// Maximum length of the audit key environment variable name.
pub(crate) const MAX_KEY_ENV_LENGTH: usize = 128;
/// Default `SQLite` busy timeout in milliseconds.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error while reading config.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Validation error.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Configured store backend failed to open.
    #[error("config store error: {0}")]
    Store(String),
}

impl From<SettingsError> for ConfigError {
    fn from(error: SettingsError) -> Self {
        match error {
            SettingsError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Toolgate configuration loaded from `toolgate.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolgateConfig {
    /// Circuit breaker configuration.
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Per-turn failure budget configuration.
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Retry bounds per transient category.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Authority and confirmation configuration.
    #[serde(default)]
    pub authority: AuthorityConfig,
    /// Degradation policy overrides.
    #[serde(default)]
    pub degradation: DegradationConfig,
    /// Tool execution defaults.
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Grants installed at startup.
    #[serde(default)]
    pub grants: Vec<GrantConfig>,
    /// Audit log configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Audit and grant store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Control event sink.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ToolgateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit `path`, then `TOOLGATE_CONFIG`, then
    /// `toolgate.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings()?;
        self.grant_requests()?;
        self.audit.validate()?;
        self.store.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }

    /// Maps the configuration into validated control-plane settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is out of range, a level
    /// or category is unknown, or the resulting policies conflict.
    pub fn settings(&self) -> Result<ControlPlaneSettings, ConfigError> {
        let settings = ControlPlaneSettings {
            breaker: self.breaker.to_settings()?,
            budget: self.budget.to_settings()?,
            retry: self.retry.to_policy()?,
            policy_overrides: self.degradation.to_overrides()?,
            authority: self.authority.to_settings()?,
            confirmation_timeout: Duration::from_millis(self.authority.confirmation_timeout_ms),
            default_tool_timeout: Duration::from_millis(self.tools.default_timeout_ms),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Returns the configured grants as authority requests.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a grant is malformed, duplicated,
    /// or targets a level that is always blocked.
    pub fn grant_requests(&self) -> Result<Vec<GrantRequest>, ConfigError> {
        if self.grants.len() > MAX_CONFIGURED_GRANTS {
            return Err(ConfigError::Invalid(format!(
                "grants exceeds max entries ({MAX_CONFIGURED_GRANTS})"
            )));
        }
        let blocked = self.authority.to_settings()?.always_blocked;
        let mut seen = BTreeSet::new();
        let mut requests = Vec::with_capacity(self.grants.len());
        for (index, grant) in self.grants.iter().enumerate() {
            let request = grant.to_request(index)?;
            if blocked.contains(&request.level) {
                return Err(ConfigError::Invalid(format!(
                    "grants[{index}] targets always-blocked level {}",
                    request.level
                )));
            }
            if !seen.insert(config_grant_id(&request.scope, request.level)) {
                return Err(ConfigError::Invalid(format!(
                    "grants[{index}] duplicates an earlier grant for {} at {}",
                    request.scope.label(),
                    request.level
                )));
            }
            requests.push(request);
        }
        Ok(requests)
    }

    /// Reads the audit key from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the variable is unset or the key
    /// is shorter than the minimum length.
    pub fn audit_key(&self) -> Result<AuditKey, ConfigError> {
        self.audit_key_with(|name| env::var(name).ok())
    }

    /// Reads the audit key through a caller-supplied variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the lookup yields nothing or the
    /// key is shorter than the minimum length.
    pub fn audit_key_with(
        &self,
        lookup: impl FnOnce(&str) -> Option<String>,
    ) -> Result<AuditKey, ConfigError> {
        let name = self.audit.key_env.as_str();
        let value = lookup(name).ok_or_else(|| {
            ConfigError::Invalid(format!("audit key environment variable {name} is not set"))
        })?;
        AuditKey::new(value.into_bytes())
            .map_err(|err| ConfigError::Invalid(format!("{name}: {err}")))
    }

    /// Returns the `SQLite` store configuration when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        self.store.sqlite_config()
    }

    /// Opens the configured audit and grant stores.
    ///
    /// The `SQLite` backend is opened as the file's single writer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Store`] when the `SQLite` database cannot be
    /// opened or another process already writes to it.
    pub fn open_stores(&self) -> Result<StoreHandles, ConfigError> {
        match self.store.sqlite_config() {
            None => Ok(StoreHandles {
                audit: Arc::new(InMemoryAuditStore::new()),
                grants: Arc::new(InMemoryGrantStore::new()),
            }),
            Some(config) => {
                let store =
                    SqliteStore::open(&config).map_err(|err| ConfigError::Store(err.to_string()))?;
                Ok(StoreHandles {
                    audit: Arc::new(store.audit_store()),
                    grants: Arc::new(store.grant_store()),
                })
            }
        }
    }

    /// Builds the configured control event sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file sink cannot be opened.
    pub fn event_sink(&self) -> Result<Arc<dyn ControlEventSink>, ConfigError> {
        match (self.telemetry.sink, self.telemetry.path.as_deref()) {
            (TelemetrySinkType::File, Some(path)) => {
                let sink =
                    FileEventSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
            (TelemetrySinkType::File, None) => {
                Err(ConfigError::Invalid("file telemetry sink requires path".to_string()))
            }
            (TelemetrySinkType::Stderr, _) => Ok(Arc::new(StderrEventSink)),
            (TelemetrySinkType::None, _) => Ok(Arc::new(NoopEventSink)),
        }
    }
}

/// Audit and grant stores opened from configuration.
pub struct StoreHandles {
    /// Append-only audit entry store.
    pub audit: Arc<dyn AuditStore>,
    /// Persistent grant store.
    pub grants: Arc<dyn GrantStore>,
}

// ============================================================================
// SECTION: Breaker Config
// ============================================================================

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open a breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Recovery window in milliseconds.
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
    /// Per-tool overrides.
    #[serde(default)]
    pub tools: Vec<BreakerOverrideConfig>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            tools: Vec::new(),
        }
    }
}

impl BreakerConfig {
    /// Converts to core breaker settings.
    fn to_settings(&self) -> Result<BreakerSettings, ConfigError> {
        if self.tools.len() > MAX_BREAKER_OVERRIDES {
            return Err(ConfigError::Invalid(format!(
                "breaker.tools exceeds max entries ({MAX_BREAKER_OVERRIDES})"
            )));
        }
        let default = BreakerPolicy {
            failure_threshold: non_zero("breaker.failure_threshold", self.failure_threshold)?,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
        };
        let mut per_tool = BTreeMap::new();
        for entry in &self.tools {
            let name = entry.tool.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid("breaker.tools.tool must be non-empty".to_string()));
            }
            let policy = BreakerPolicy {
                failure_threshold: match entry.failure_threshold {
                    Some(value) => non_zero("breaker.tools.failure_threshold", value)?,
                    None => default.failure_threshold,
                },
                recovery_timeout: entry
                    .recovery_timeout_ms
                    .map_or(default.recovery_timeout, Duration::from_millis),
            };
            if per_tool.insert(ToolName::new(name), policy).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "breaker.tools has duplicate entry for {name}"
                )));
            }
        }
        Ok(BreakerSettings {
            default,
            per_tool,
        })
    }
}

/// Breaker override for one tool.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerOverrideConfig {
    /// Tool name.
    pub tool: String,
    /// Override threshold; inherits the default when absent.
    #[serde(default)]
    pub failure_threshold: Option<u32>,
    /// Override recovery window in milliseconds; inherits the default when absent.
    #[serde(default)]
    pub recovery_timeout_ms: Option<u64>,
}

// ============================================================================
// SECTION: Budget and Retry Config
// ============================================================================

/// Per-turn failure budget configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    /// Total failures after which a turn aborts.
    #[serde(default = "default_max_total_failures")]
    pub max_total_failures: u32,
    /// Consecutive failures after which a turn aborts.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_total_failures: default_max_total_failures(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl BudgetConfig {
    /// Converts to core budget settings.
    fn to_settings(&self) -> Result<BudgetSettings, ConfigError> {
        Ok(BudgetSettings {
            max_total_failures: non_zero("budget.max_total_failures", self.max_total_failures)?,
            max_consecutive_failures: non_zero(
                "budget.max_consecutive_failures",
                self.max_consecutive_failures,
            )?,
        })
    }
}

/// Retry configuration per transient error category.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Tool execution failures.
    #[serde(default = "default_tool_execution_retry")]
    pub tool_execution: RetryRuleConfig,
    /// External service failures.
    #[serde(default = "default_external_service_retry")]
    pub external_service: RetryRuleConfig,
    /// Timeouts.
    #[serde(default = "default_timeout_retry")]
    pub timeout: RetryRuleConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            tool_execution: default_tool_execution_retry(),
            external_service: default_external_service_retry(),
            timeout: default_timeout_retry(),
        }
    }
}

impl RetryConfig {
    /// Converts to the core retry policy.
    fn to_policy(&self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy {
            tool_execution: self.tool_execution.to_rule("retry.tool_execution")?,
            external_service: self.external_service.to_rule("retry.external_service")?,
            timeout: self.timeout.to_rule("retry.timeout")?,
        })
    }
}

/// Retry bound and delay for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryRuleConfig {
    /// Maximum re-attempts within one call.
    #[serde(default)]
    pub max_retries: u32,
    /// Delay before each re-attempt in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
}

impl RetryRuleConfig {
    /// Converts to a core retry rule after range checks.
    fn to_rule(self, field: &str) -> Result<RetryRule, ConfigError> {
        if self.max_retries > MAX_RETRIES_PER_RULE {
            return Err(ConfigError::Invalid(format!(
                "{field}.max_retries must be at most {MAX_RETRIES_PER_RULE}"
            )));
        }
        if self.delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::Invalid(format!(
                "{field}.delay_ms must be at most {MAX_RETRY_DELAY_MS}"
            )));
        }
        Ok(RetryRule {
            max_retries: self.max_retries,
            delay: Duration::from_millis(self.delay_ms),
        })
    }
}

impl From<RetryRule> for RetryRuleConfig {
    fn from(rule: RetryRule) -> Self {
        Self {
            max_retries: rule.max_retries,
            delay_ms: duration_ms(rule.delay),
        }
    }
}

// ============================================================================
// SECTION: Authority Config
// ============================================================================

/// Authority and confirmation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    /// Levels denied regardless of grants.
    #[serde(default = "default_always_blocked")]
    pub always_blocked: Vec<String>,
    /// Levels routed to confirmation when no grant exists.
    #[serde(default = "default_confirmable")]
    pub confirmable: Vec<String>,
    /// Confirmation window in milliseconds.
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            always_blocked: default_always_blocked(),
            confirmable: default_confirmable(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
        }
    }
}

impl AuthorityConfig {
    /// Converts to core authority settings.
    fn to_settings(&self) -> Result<AuthoritySettings, ConfigError> {
        Ok(AuthoritySettings {
            always_blocked: parse_levels("authority.always_blocked", &self.always_blocked)?,
            confirmable: parse_levels("authority.confirmable", &self.confirmable)?,
        })
    }
}

/// Degradation policy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DegradationConfig {
    /// Replacements for cells of the default policy table.
    #[serde(default)]
    pub overrides: Vec<PolicyOverrideConfig>,
}

impl DegradationConfig {
    /// Converts to core policy overrides.
    fn to_overrides(&self) -> Result<Vec<PolicyOverride>, ConfigError> {
        if self.overrides.len() > MAX_POLICY_OVERRIDES {
            return Err(ConfigError::Invalid(format!(
                "degradation.overrides exceeds max entries ({MAX_POLICY_OVERRIDES})"
            )));
        }
        let mut seen = BTreeSet::new();
        let mut overrides = Vec::with_capacity(self.overrides.len());
        for entry in &self.overrides {
            let category: ErrorCategory = entry.category.parse().map_err(|err: String| {
                ConfigError::Invalid(format!("degradation.overrides.category: {err}"))
            })?;
            let level = parse_level("degradation.overrides.level", &entry.level)?;
            if !seen.insert((category, level)) {
                return Err(ConfigError::Invalid(format!(
                    "degradation.overrides has duplicate entry for {category}/{level}"
                )));
            }
            overrides.push(PolicyOverride {
                category,
                level,
                strategy: entry.strategy,
            });
        }
        Ok(overrides)
    }
}

/// One degradation policy override.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyOverrideConfig {
    /// Error category label.
    pub category: String,
    /// Permission level label.
    pub level: String,
    /// Replacement strategy.
    pub strategy: DegradationStrategy,
}

/// Tool execution defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    /// Timeout for tools that do not declare one, in milliseconds.
    #[serde(default = "default_tool_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_tool_timeout_ms(),
        }
    }
}

// ============================================================================
// SECTION: Grant Config
// ============================================================================

/// Grant installed at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantConfig {
    /// Scope: `*`, `level:<name>`, or a tool name.
    pub scope: String,
    /// Granted level.
    pub level: String,
    /// Whether the grant is consumed by its first use.
    #[serde(default)]
    pub one_time: bool,
    /// Expiry as unix milliseconds.
    #[serde(default)]
    pub expires_at_ms: Option<i64>,
}

impl GrantConfig {
    /// Converts to a config-sourced grant request.
    fn to_request(&self, index: usize) -> Result<GrantRequest, ConfigError> {
        let scope = GrantScope::parse(&self.scope)
            .map_err(|err| ConfigError::Invalid(format!("grants[{index}].scope: {err}")))?;
        let level = parse_level(&format!("grants[{index}].level"), &self.level)?;
        let mut request = GrantRequest::new(scope, level, GrantSource::Config);
        if let Some(expires_at_ms) = self.expires_at_ms {
            if expires_at_ms <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "grants[{index}].expires_at_ms must be greater than zero"
                )));
            }
            request = request.expiring_at(Timestamp::from_unix_millis(expires_at_ms));
        }
        if self.one_time {
            request = request.single_use();
        }
        Ok(request)
    }
}

// ============================================================================
// SECTION: Audit Config
// ============================================================================

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Environment variable carrying the HMAC key.
    #[serde(default = "default_audit_key_env")]
    pub key_env: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            key_env: default_audit_key_env(),
        }
    }
}

impl AuditConfig {
    /// Validates the key variable name.
    fn validate(&self) -> Result<(), ConfigError> {
        let name = self.key_env.as_str();
        if name.is_empty() || name.len() > MAX_KEY_ENV_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "audit.key_env must be 1..={MAX_KEY_ENV_LENGTH} characters"
            )));
        }
        if !name.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'_') {
            return Err(ConfigError::Invalid(
                "audit.key_env must contain only ASCII letters, digits, and underscores"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store Config
// ============================================================================

/// Audit and grant store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
                validate_field_path("store.path", path)
            }
        }
    }

    /// Returns the `SQLite` config when selected.
    fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }
}

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory stores; nothing survives a restart.
    #[default]
    Memory,
    /// `SQLite`-backed durable stores.
    Sqlite,
}

// ============================================================================
// SECTION: Telemetry Config
// ============================================================================

/// Control event sink configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    /// Sink type.
    #[serde(default)]
    pub sink: TelemetrySinkType,
    /// Output path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl TelemetryConfig {
    /// Validates sink configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, self.path.as_ref()) {
            (TelemetrySinkType::File, Some(path)) => validate_field_path("telemetry.path", path),
            (TelemetrySinkType::File, None) => {
                Err(ConfigError::Invalid("file telemetry sink requires path".to_string()))
            }
            (TelemetrySinkType::None | TelemetrySinkType::Stderr, Some(_)) => Err(
                ConfigError::Invalid("telemetry.path is only valid for the file sink".to_string()),
            ),
            (TelemetrySinkType::None | TelemetrySinkType::Stderr, None) => Ok(()),
        }
    }
}

/// Control event sink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TelemetrySinkType {
    /// Discard events.
    #[default]
    None,
    /// JSON lines on stderr.
    Stderr,
    /// JSON lines appended to a file.
    File,
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default breaker threshold.
const fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD.get()
}

/// Default breaker recovery window in milliseconds.
fn default_recovery_timeout_ms() -> u64 {
    duration_ms(DEFAULT_RECOVERY_TIMEOUT)
}

/// Default total failure cap.
const fn default_max_total_failures() -> u32 {
    DEFAULT_MAX_TOTAL_FAILURES.get()
}

/// Default consecutive failure cap.
const fn default_max_consecutive_failures() -> u32 {
    DEFAULT_MAX_CONSECUTIVE_FAILURES.get()
}

/// Default tool execution retry rule.
fn default_tool_execution_retry() -> RetryRuleConfig {
    RetryPolicy::default().tool_execution.into()
}

/// Default external service retry rule.
fn default_external_service_retry() -> RetryRuleConfig {
    RetryPolicy::default().external_service.into()
}

/// Default timeout retry rule.
fn default_timeout_retry() -> RetryRuleConfig {
    RetryPolicy::default().timeout.into()
}

/// Default always-blocked levels.
fn default_always_blocked() -> Vec<String> {
    AuthoritySettings::default().always_blocked.iter().map(ToString::to_string).collect()
}

/// Default confirmable levels.
fn default_confirmable() -> Vec<String> {
    AuthoritySettings::default().confirmable.iter().map(ToString::to_string).collect()
}

/// Default confirmation window in milliseconds.
fn default_confirmation_timeout_ms() -> u64 {
    duration_ms(DEFAULT_CONFIRMATION_TIMEOUT)
}

/// Default tool timeout in milliseconds.
fn default_tool_timeout_ms() -> u64 {
    duration_ms(DEFAULT_TOOL_TIMEOUT)
}

/// Default audit key variable.
fn default_audit_key_env() -> String {
    DEFAULT_AUDIT_KEY_ENV.to_string()
}

/// Default `SQLite` busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts a duration to whole milliseconds, saturating.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Rejects zero thresholds.
fn non_zero(field: &str, value: u32) -> Result<NonZeroU32, ConfigError> {
    NonZeroU32::new(value)
        .ok_or_else(|| ConfigError::Invalid(format!("{field} must be greater than zero")))
}

/// Parses one permission level label.
fn parse_level(field: &str, value: &str) -> Result<PermissionLevel, ConfigError> {
    value.trim().parse().map_err(|err: String| ConfigError::Invalid(format!("{field}: {err}")))
}

/// Parses a list of permission level labels into a set.
fn parse_levels(field: &str, values: &[String]) -> Result<BTreeSet<PermissionLevel>, ConfigError> {
    values.iter().map(|value| parse_level(field, value)).collect()
}

/// Resolves the config path from CLI or environment.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured file path against length constraints.
fn validate_field_path(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
