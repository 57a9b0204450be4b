// crates/toolgate-cli/src/main.rs
// ============================================================================
// Module: Toolgate CLI Entry Point
// Description: Operator commands for audit review, grants, and config.
// Purpose: Provide offline chain verification and grant administration.
// Dependencies: clap, serde_json, thiserror, toolgate-config, toolgate-core,
// toolgate-store-sqlite.
// ============================================================================

//! ## Overview
//! The `toolgate` binary works against the durable `SQLite` stores named by
//! `toolgate.toml`. It verifies the audit chain offline, exports review
//! bundles, verifies bundles handed back by reviewers, prints turn trails and
//! statistics, and lists, issues, or revokes grants. The audit key is read from
//! the environment variable named by `audit.key_env` and never printed.
//!
//! Machine-readable output is canonical JSON, one document per invocation.
//! Verification commands exit non-zero when the chain is broken.
//!
//! Read commands open the database as a reader and work next to a running
//! control plane. `grants add` and `grants revoke` must become the store's
//! single writer, so they are refused while another process holds it; the
//! live process owns its audit chain and in-memory grant table.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use thiserror::Error;
use toolgate_config::ToolgateConfig;
use toolgate_config::config_toml_example;
use toolgate_core::AuditKey;
use toolgate_core::AuditLog;
use toolgate_core::AuditRange;
use toolgate_core::GrantId;
use toolgate_core::GrantRequest;
use toolgate_core::GrantScope;
use toolgate_core::GrantSource;
use toolgate_core::GrantStore;
use toolgate_core::InMemoryGrantStore;
use toolgate_core::PermissionLevel;
use toolgate_core::ReviewBundle;
use toolgate_core::SystemClock;
use toolgate_core::Timestamp;
use toolgate_core::ToolAuthority;
use toolgate_core::TurnId;
use toolgate_core::VerifyResult;
use toolgate_core::core::hashing::canonical_json_bytes;
use toolgate_core::verify_bundle;
use toolgate_core::verify_store;
use toolgate_store_sqlite::SqliteStore;
use toolgate_store_sqlite::SqliteStoreError;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a review bundle accepted for verification.
const MAX_BUNDLE_BYTES: usize = 256 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "toolgate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = clap::ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Audit chain verification and review utilities.
    Audit {
        /// Selected audit subcommand.
        #[command(subcommand)]
        command: AuditCommand,
    },
    /// Grant administration.
    Grants {
        /// Selected grants subcommand.
        #[command(subcommand)]
        command: GrantsCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Config file selection shared by every command.
#[derive(Args, Debug)]
struct ConfigArg {
    /// Optional config file path (defaults to toolgate.toml or `TOOLGATE_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Audit subcommands.
#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Verify the stored chain offline; exits non-zero when broken.
    Verify(ConfigArg),
    /// Export a chain segment as a review bundle.
    Export(AuditExportCommand),
    /// Verify a review bundle produced by `audit export`.
    VerifyBundle(AuditVerifyBundleCommand),
    /// Print every entry recorded for one turn.
    Trail(AuditTrailCommand),
    /// Print aggregate statistics.
    Stats(ConfigArg),
}

/// Arguments for `audit export`.
#[derive(Args, Debug)]
struct AuditExportCommand {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArg,
    /// First sequence number, inclusive.
    #[arg(long, value_name = "SEQ", default_value_t = 1)]
    from: u64,
    /// Last sequence number, inclusive (defaults to the chain head).
    #[arg(long, value_name = "SEQ")]
    to: Option<u64>,
    /// Write the bundle to a file instead of stdout.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

/// Arguments for `audit verify-bundle`.
#[derive(Args, Debug)]
struct AuditVerifyBundleCommand {
    /// Config selection (for the audit key variable).
    #[command(flatten)]
    config: ConfigArg,
    /// Bundle JSON path.
    #[arg(long, value_name = "PATH")]
    bundle: PathBuf,
}

/// Arguments for `audit trail`.
#[derive(Args, Debug)]
struct AuditTrailCommand {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArg,
    /// Turn identifier.
    #[arg(long, value_name = "TURN_ID")]
    turn: String,
}

/// Grants subcommands.
#[derive(Subcommand, Debug)]
enum GrantsCommand {
    /// List grants.
    List(GrantsListCommand),
    /// Issue a persistent user grant.
    Add(GrantsAddCommand),
    /// Revoke a grant by identifier.
    Revoke(GrantsRevokeCommand),
}

/// Arguments for `grants list`.
#[derive(Args, Debug)]
struct GrantsListCommand {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArg,
    /// Include revoked, consumed, and expired grants.
    #[arg(long)]
    all: bool,
}

/// Arguments for `grants add`.
#[derive(Args, Debug)]
struct GrantsAddCommand {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArg,
    /// Scope: `*`, `level:<name>`, or a tool name.
    #[arg(long, value_name = "SCOPE")]
    scope: String,
    /// Granted permission level.
    #[arg(long, value_name = "LEVEL")]
    level: String,
    /// Expiry as unix milliseconds.
    #[arg(long, value_name = "MILLIS")]
    expires_at_ms: Option<i64>,
    /// Consume the grant on first use.
    #[arg(long)]
    one_time: bool,
}

/// Arguments for `grants revoke`.
#[derive(Args, Debug)]
struct GrantsRevokeCommand {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArg,
    /// Grant identifier.
    #[arg(long, value_name = "GRANT_ID")]
    id: String,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a config file.
    Validate(ConfigArg),
    /// Print the canonical example config.
    Example,
}

/// CLI error wrapper for operator-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("toolgate {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };
    match command {
        Commands::Audit {
            command,
        } => command_audit(command),
        Commands::Grants {
            command,
        } => command_grants(command),
        Commands::Config {
            command,
        } => command_config(command),
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Audit Commands
// ============================================================================

/// Dispatches audit subcommands.
fn command_audit(command: AuditCommand) -> CliResult<ExitCode> {
    match command {
        AuditCommand::Verify(command) => command_audit_verify(&command),
        AuditCommand::Export(command) => command_audit_export(&command),
        AuditCommand::VerifyBundle(command) => command_audit_verify_bundle(&command),
        AuditCommand::Trail(command) => command_audit_trail(&command),
        AuditCommand::Stats(command) => command_audit_stats(&command),
    }
}

/// Verifies the stored chain without trusting any in-memory head.
fn command_audit_verify(command: &ConfigArg) -> CliResult<ExitCode> {
    let context = StoreContext::reader(command)?;
    let result = verify_store(&context.store.audit_store(), &context.key)
        .map_err(|err| CliError::new(format!("audit verification failed: {err}")))?;
    write_canonical_json(&result)?;
    Ok(verification_exit_code(&result))
}

/// Exports a review bundle.
fn command_audit_export(command: &AuditExportCommand) -> CliResult<ExitCode> {
    let context = StoreContext::reader(&command.config)?;
    let log = context.audit_log()?;
    let range = AuditRange {
        from_seq: command.from,
        to_seq: command.to,
    };
    let mut bytes = log
        .export_for_review(range)
        .map_err(|err| CliError::new(format!("audit export failed: {err}")))?;
    bytes.push(b'\n');
    match &command.output {
        Some(path) => {
            fs::write(path, &bytes).map_err(|err| {
                CliError::new(format!("failed to write {}: {err}", path.display()))
            })?;
            write_stdout_line(&format!("wrote review bundle to {}", path.display()))
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
        None => {
            write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Verifies a review bundle against the configured key.
fn command_audit_verify_bundle(command: &AuditVerifyBundleCommand) -> CliResult<ExitCode> {
    let config = load_config(&command.config)?;
    let key = load_key(&config)?;
    let bytes = read_bytes_with_limit(&command.bundle, MAX_BUNDLE_BYTES)?;
    let bundle: ReviewBundle = serde_json::from_slice(&bytes).map_err(|err| {
        CliError::new(format!("invalid review bundle {}: {err}", command.bundle.display()))
    })?;
    let result = verify_bundle(&bundle, &key);
    write_canonical_json(&result)?;
    Ok(verification_exit_code(&result))
}

/// Prints the audit trail of one turn.
fn command_audit_trail(command: &AuditTrailCommand) -> CliResult<ExitCode> {
    let turn_id = TurnId::parse(command.turn.as_str())
        .map_err(|err| CliError::new(format!("invalid turn id: {err}")))?;
    let context = StoreContext::reader(&command.config)?;
    let log = context.audit_log()?;
    let entries = log
        .turn_trail(&turn_id)
        .map_err(|err| CliError::new(format!("audit trail failed: {err}")))?;
    write_canonical_json(&entries)?;
    Ok(ExitCode::SUCCESS)
}

/// Prints audit statistics.
fn command_audit_stats(command: &ConfigArg) -> CliResult<ExitCode> {
    let context = StoreContext::reader(command)?;
    let log = context.audit_log()?;
    let stats = log.stats().map_err(|err| CliError::new(format!("audit stats failed: {err}")))?;
    write_canonical_json(&stats)?;
    Ok(ExitCode::SUCCESS)
}

/// Maps a verification result to a process exit code.
fn verification_exit_code(result: &VerifyResult) -> ExitCode {
    if result.valid { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

// ============================================================================
// SECTION: Grant Commands
// ============================================================================

/// Dispatches grants subcommands.
fn command_grants(command: GrantsCommand) -> CliResult<ExitCode> {
    match command {
        GrantsCommand::List(command) => command_grants_list(&command),
        GrantsCommand::Add(command) => command_grants_add(&command),
        GrantsCommand::Revoke(command) => command_grants_revoke(&command),
    }
}

/// Lists grants.
fn command_grants_list(command: &GrantsListCommand) -> CliResult<ExitCode> {
    let context = StoreContext::reader(&command.config)?;
    let authority = context.authority()?;
    let grants = if command.all { authority.all_grants() } else { authority.active_grants() };
    let grants = grants.map_err(|err| CliError::new(format!("grant listing failed: {err}")))?;
    write_canonical_json(&grants)?;
    Ok(ExitCode::SUCCESS)
}

/// Issues a persistent user grant.
fn command_grants_add(command: &GrantsAddCommand) -> CliResult<ExitCode> {
    let scope = GrantScope::parse(&command.scope).map_err(CliError::new)?;
    let level: PermissionLevel = command.level.trim().parse().map_err(CliError::new)?;
    let mut request = GrantRequest::new(scope, level, GrantSource::User);
    if let Some(expires_at_ms) = command.expires_at_ms {
        request = request.expiring_at(Timestamp::from_unix_millis(expires_at_ms));
    }
    if command.one_time {
        request = request.single_use();
    }
    let context = StoreContext::writer(&command.config)?;
    let authority = context.authority()?;
    let grant = authority
        .grant(request, None)
        .map_err(|err| CliError::new(format!("grant failed: {err}")))?;
    write_canonical_json(&grant)?;
    Ok(ExitCode::SUCCESS)
}

/// Revokes a grant.
fn command_grants_revoke(command: &GrantsRevokeCommand) -> CliResult<ExitCode> {
    let context = StoreContext::writer(&command.config)?;
    let authority = context.authority()?;
    let grant = authority
        .revoke(&GrantId::new(command.id.as_str()))
        .map_err(|err| CliError::new(format!("revoke failed: {err}")))?;
    write_canonical_json(&grant)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(&command),
        ConfigCommand::Example => {
            write_stdout_bytes(config_toml_example().as_bytes())
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Executes the config validation command.
fn command_config_validate(command: &ConfigArg) -> CliResult<ExitCode> {
    let _config = load_config(command)?;
    write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Store Context
// ============================================================================

/// Config, durable store, and audit key for one invocation.
struct StoreContext {
    /// Loaded configuration.
    config: ToolgateConfig,
    /// Opened `SQLite` store.
    store: SqliteStore,
    /// Audit HMAC key.
    key: Arc<AuditKey>,
}

impl StoreContext {
    /// Opens the store for reading; safe next to a running control plane.
    fn reader(arg: &ConfigArg) -> CliResult<Self> {
        Self::open(arg, false)
    }

    /// Opens the store as its single writer.
    fn writer(arg: &ConfigArg) -> CliResult<Self> {
        Self::open(arg, true)
    }

    /// Loads config, opens the `SQLite` store, and reads the audit key.
    fn open(arg: &ConfigArg, write: bool) -> CliResult<Self> {
        let config = load_config(arg)?;
        let sqlite = config.sqlite_config().ok_or_else(|| {
            CliError::new(
                "this command requires store.type = \"sqlite\"; the memory store does not outlive \
                 the process"
                    .to_string(),
            )
        })?;
        let opened =
            if write { SqliteStore::open(&sqlite) } else { SqliteStore::open_reader(&sqlite) };
        let store = opened.map_err(|err| match err {
            SqliteStoreError::Locked(_) => CliError::new(format!(
                "refusing to modify {}: another control plane process holds the store; change \
                 grants through that process or stop it first",
                sqlite.path.display()
            )),
            other => {
                CliError::new(format!("failed to open store {}: {other}", sqlite.path.display()))
            }
        })?;
        let key = Arc::new(load_key(&config)?);
        Ok(Self {
            config,
            store,
            key,
        })
    }

    /// Opens the audit log, checking the stored head against the key.
    fn audit_log(&self) -> CliResult<Arc<AuditLog>> {
        AuditLog::open(
            Arc::new(self.store.audit_store()),
            Arc::clone(&self.key),
            Arc::new(SystemClock),
        )
        .map(Arc::new)
        .map_err(|err| CliError::new(format!("failed to open audit log: {err}")))
    }

    /// Builds the grant authority over the durable stores.
    ///
    /// A reader works on a private copy of the stored grants so configured
    /// grants can be merged without writing to the database.
    fn authority(&self) -> CliResult<ToolAuthority> {
        let settings = self.config.settings().map_err(|err| CliError::new(err.to_string()))?;
        let configured = self.config.grant_requests().map_err(|err| CliError::new(err.to_string()))?;
        let grants: Arc<dyn GrantStore> = if self.store.is_writer() {
            Arc::new(self.store.grant_store())
        } else {
            let snapshot = InMemoryGrantStore::new();
            let stored = self
                .store
                .grant_store()
                .load_grants()
                .map_err(|err| CliError::new(format!("failed to load grants: {err}")))?;
            for grant in &stored {
                snapshot
                    .put_grant(grant)
                    .map_err(|err| CliError::new(format!("failed to load grants: {err}")))?;
            }
            Arc::new(snapshot)
        };
        ToolAuthority::new(
            settings.authority,
            &configured,
            grants,
            self.audit_log()?,
            Arc::new(SystemClock),
        )
        .map_err(|err| CliError::new(format!("failed to load grants: {err}")))
    }
}

/// Loads and validates the config file.
fn load_config(arg: &ConfigArg) -> CliResult<ToolgateConfig> {
    ToolgateConfig::load(arg.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Reads the audit key named by the config.
fn load_key(config: &ToolgateConfig) -> CliResult<AuditKey> {
    config.audit_key().map_err(|err| CliError::new(err.to_string()))
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> CliResult<Vec<u8>> {
    let read_error =
        |err: std::io::Error| CliError::new(format!("failed to read {}: {err}", path.display()));
    let file = File::open(path).map_err(read_error)?;
    let size = file.metadata().map_err(read_error)?.len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(CliError::new(format!(
            "{} exceeds size limit ({size} > {max_bytes} bytes)",
            path.display()
        )));
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(read_error)?;
    if bytes.len() > max_bytes {
        return Err(CliError::new(format!("{} exceeds size limit", path.display())));
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Writes canonical JSON to stdout followed by a newline.
fn write_canonical_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = canonical_json_bytes(value)
        .map_err(|err| CliError::new(format!("failed to render output: {err}")))?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
