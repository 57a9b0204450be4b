// crates/toolgate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Toolgate Stores
// Description: Append-only audit rows and hashed grant snapshots on SQLite.
// Purpose: Persist control plane state with fail-closed decoding.
// Dependencies: toolgate-core, rusqlite, fs2, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteStore`] owns one connection to the database file and hands out an
//! [`SqliteAuditStore`] and a [`SqliteGrantStore`] that share it. Audit rows
//! are inserted in strict sequence order and protected by triggers that
//! reject updates and deletes. Grants are stored as canonical JSON with a
//! SHA-256 digest that is checked on every load.
//!
//! The HMAC chain, not this module, is what makes audit tampering evident:
//! anyone with file access can drop the triggers.
//!
//! Only one writer may hold a database file. [`SqliteStore::open`] takes an
//! exclusive advisory lock on a `.lock` file next to the database and keeps
//! it until the last handle drops; a second writer fails with
//! [`SqliteStoreError::Locked`]. [`SqliteStore::open_reader`] takes no lock,
//! and every append or grant write through a reader handle is refused with
//! [`SqliteStoreError::ReadOnly`]. This keeps an offline tool from forking
//! the audit chain under a running control plane.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use fs2::FileExt;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use toolgate_core::AuditActor;
use toolgate_core::AuditEntry;
use toolgate_core::AuditEventType;
use toolgate_core::AuditStore;
use toolgate_core::GrantStore;
use toolgate_core::PermissionGrant;
use toolgate_core::StoreError;
use toolgate_core::Timestamp;
use toolgate_core::TurnId;
use toolgate_core::core::hashing::canonical_json_bytes;
use toolgate_core::core::hashing::sha256_hex;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum serialized audit payload or grant snapshot accepted by the store.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;
/// Suffix appended to the database path to name the writer lock file.
const WRITER_LOCK_SUFFIX: &str = ".lock";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` stores.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or digest mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Append does not continue the stored sequence.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Another writer holds the database.
    #[error("sqlite store locked: {0}")]
    Locked(String),
    /// Write attempted through a reader handle.
    #[error("sqlite store is open read-only")]
    ReadOnly,
    /// Payload exceeded the size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => {
                Self::Corrupt(format!("schema version mismatch: {message}"))
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::Locked(message) => {
                Self::Conflict(format!("store locked by another writer: {message}"))
            }
            SqliteStoreError::ReadOnly => Self::Conflict("store is open read-only".to_string()),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "payload exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

/// Maps an engine error.
fn db_err(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Database Handle
// ============================================================================

/// Exclusive advisory lock held by the single writer of a database file.
struct WriterLease {
    /// Locked lock file; the lock is released when it closes.
    file: File,
}

impl WriterLease {
    /// Takes the writer lock for `db_path` without blocking.
    fn acquire(db_path: &Path) -> Result<Self, SqliteStoreError> {
        let mut name = OsString::from(db_path.as_os_str());
        name.push(WRITER_LOCK_SUFFIX);
        let lock_path = PathBuf::from(name);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|err| SqliteStoreError::Io(format!("{}: {err}", lock_path.display())))?;
        FileExt::try_lock_exclusive(&file).map_err(|err| {
            SqliteStoreError::Locked(format!(
                "{} is held by another writer ({err})",
                db_path.display()
            ))
        })?;
        Ok(Self {
            file,
        })
    }
}

impl Drop for WriterLease {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Shared `SQLite` database for the audit and grant stores.
#[derive(Clone)]
pub struct SqliteStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
    /// Writer lock; absent for reader handles.
    lease: Option<Arc<WriterLease>>,
}

impl SqliteStore {
    /// Opens (or creates) the database as its single writer.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Locked`] when another handle already
    /// writes to the file, and [`SqliteStoreError`] when the database cannot
    /// be opened, initialized, or carries an unsupported schema version.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let lease = WriterLease::acquire(&config.path)?;
        let connection = Self::connect(config)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            lease: Some(Arc::new(lease)),
        })
    }

    /// Opens the database for reading alongside a live writer.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened,
    /// initialized, or carries an unsupported schema version.
    pub fn open_reader(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let connection = Self::connect(config)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            lease: None,
        })
    }

    /// Returns true when this handle holds the writer lock.
    #[must_use]
    pub const fn is_writer(&self) -> bool {
        self.lease.is_some()
    }

    /// Opens a connection and prepares the schema.
    fn connect(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(connection)
    }

    /// Refuses writes through reader handles.
    fn ensure_writer(&self) -> Result<(), SqliteStoreError> {
        if self.is_writer() { Ok(()) } else { Err(SqliteStoreError::ReadOnly) }
    }

    /// Returns the audit store view of this database.
    #[must_use]
    pub fn audit_store(&self) -> SqliteAuditStore {
        SqliteAuditStore {
            db: self.clone(),
        }
    }

    /// Returns the grant store view of this database.
    #[must_use]
    pub fn grant_store(&self) -> SqliteGrantStore {
        SqliteGrantStore {
            db: self.clone(),
        }
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Append-only audit store on `SQLite`.
#[derive(Clone)]
pub struct SqliteAuditStore {
    /// Shared database.
    db: SqliteStore,
}

impl SqliteAuditStore {
    /// Opens a database as its writer and returns its audit store view.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        Ok(SqliteStore::open(config)?.audit_store())
    }

    /// Inserts one entry after checking it continues the stored sequence.
    fn append_entry(&self, entry: &AuditEntry) -> Result<(), SqliteStoreError> {
        let payload = serde_json::to_vec(&entry.payload)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_PAYLOAD_BYTES,
                actual_bytes: payload.len(),
            });
        }
        let seq = to_sql_seq(entry.seq)?;
        self.db.ensure_writer()?;
        let mut guard = self.db.lock()?;
        let tx = guard.transaction().map_err(|err| db_err(&err))?;
        let tail: Option<i64> = tx
            .query_row("SELECT MAX(seq) FROM audit_entries", params![], |row| row.get(0))
            .map_err(|err| db_err(&err))?;
        let expected = tail.unwrap_or(0).checked_add(1).ok_or_else(|| {
            SqliteStoreError::Corrupt("audit sequence overflow".to_string())
        })?;
        if seq != expected {
            return Err(SqliteStoreError::Conflict(format!(
                "audit append out of order: expected seq {expected}, got {seq}"
            )));
        }
        tx.execute(
            "INSERT INTO audit_entries (seq, turn_id, event_type, actor, recorded_at, payload, \
             prev_hash, hash) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                seq,
                entry.turn_id.as_ref().map(TurnId::as_str),
                entry.event_type.as_str(),
                entry.actor.as_str(),
                entry.recorded_at.as_unix_millis(),
                payload,
                entry.prev_hash,
                entry.hash
            ],
        )
        .map_err(|err| db_err(&err))?;
        tx.commit().map_err(|err| db_err(&err))?;
        drop(guard);
        Ok(())
    }

    /// Runs an entry query and decodes every row.
    fn query_entries(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<AuditEntry>, SqliteStoreError> {
        let guard = self.db.lock()?;
        let mut stmt = guard.prepare(sql).map_err(|err| db_err(&err))?;
        let rows = stmt.query_map(params, RawEntry::from_row).map_err(|err| db_err(&err))?;
        let mut raw = Vec::new();
        for row in rows {
            raw.push(row.map_err(|err| db_err(&err))?);
        }
        drop(stmt);
        drop(guard);
        raw.into_iter().map(RawEntry::decode).collect()
    }
}

impl AuditStore for SqliteAuditStore {
    fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.append_entry(entry).map_err(StoreError::from)
    }

    fn read_range(
        &self,
        from_seq: u64,
        to_seq: Option<u64>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let from = i64::try_from(from_seq).unwrap_or(i64::MAX);
        let to = to_seq.map_or(i64::MAX, |to| i64::try_from(to).unwrap_or(i64::MAX));
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_entries(
            &format!("{SELECT_ENTRY} WHERE seq >= ?1 AND seq <= ?2 ORDER BY seq ASC LIMIT ?3"),
            params![from, to, limit],
        )
        .map_err(StoreError::from)
    }

    fn last_entry(&self) -> Result<Option<AuditEntry>, StoreError> {
        let mut entries = self
            .query_entries(&format!("{SELECT_ENTRY} ORDER BY seq DESC LIMIT 1"), params![])
            .map_err(StoreError::from)?;
        Ok(entries.pop())
    }

    fn entries_for_turn(&self, turn_id: &TurnId) -> Result<Vec<AuditEntry>, StoreError> {
        self.query_entries(
            &format!("{SELECT_ENTRY} WHERE turn_id = ?1 ORDER BY seq ASC"),
            params![turn_id.as_str()],
        )
        .map_err(StoreError::from)
    }
}

/// Column list shared by every entry query.
const SELECT_ENTRY: &str = "SELECT seq, turn_id, event_type, actor, recorded_at, \
                            length(payload), payload, prev_hash, hash FROM audit_entries";

/// Undecoded audit row.
struct RawEntry {
    /// Sequence number column.
    seq: i64,
    /// Turn identifier column.
    turn_id: Option<String>,
    /// Event type label column.
    event_type: String,
    /// Actor label column.
    actor: String,
    /// Recorded-at column.
    recorded_at: i64,
    /// Stored payload length.
    payload_len: i64,
    /// Payload bytes, absent when oversized.
    payload: Option<Vec<u8>>,
    /// Predecessor hash column.
    prev_hash: String,
    /// Entry hash column.
    hash: String,
}

impl RawEntry {
    /// Reads one row; oversized payloads are left unread.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let payload_len: i64 = row.get(5)?;
        let within_limit = usize::try_from(payload_len).is_ok_and(|len| len <= MAX_PAYLOAD_BYTES);
        Ok(Self {
            seq: row.get(0)?,
            turn_id: row.get(1)?,
            event_type: row.get(2)?,
            actor: row.get(3)?,
            recorded_at: row.get(4)?,
            payload_len,
            payload: if within_limit { Some(row.get(6)?) } else { None },
            prev_hash: row.get(7)?,
            hash: row.get(8)?,
        })
    }

    /// Decodes the row into an entry, failing closed on any malformed column.
    fn decode(self) -> Result<AuditEntry, SqliteStoreError> {
        let seq = u64::try_from(self.seq)
            .map_err(|_| SqliteStoreError::Corrupt(format!("negative audit seq {}", self.seq)))?;
        let Some(payload) = self.payload else {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_PAYLOAD_BYTES,
                actual_bytes: usize::try_from(self.payload_len).unwrap_or(usize::MAX),
            });
        };
        let turn_id = self
            .turn_id
            .map(TurnId::parse)
            .transpose()
            .map_err(|err| SqliteStoreError::Corrupt(format!("audit seq {seq}: {err}")))?;
        let event_type = AuditEventType::from_label(&self.event_type).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!(
                "audit seq {seq}: unknown event type {}",
                self.event_type
            ))
        })?;
        let actor = AuditActor::from_label(&self.actor).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("audit seq {seq}: unknown actor {}", self.actor))
        })?;
        let payload = serde_json::from_slice(&payload)
            .map_err(|err| SqliteStoreError::Corrupt(format!("audit seq {seq}: {err}")))?;
        Ok(AuditEntry {
            seq,
            turn_id,
            event_type,
            actor,
            recorded_at: Timestamp::from_unix_millis(self.recorded_at),
            payload,
            prev_hash: self.prev_hash,
            hash: self.hash,
        })
    }
}

/// Converts a sequence number to its column type.
fn to_sql_seq(seq: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(seq).map_err(|_| SqliteStoreError::Invalid(format!("audit seq {seq} too large")))
}

// ============================================================================
// SECTION: Grant Store
// ============================================================================

/// Grant store on `SQLite`; one row per grant identifier.
#[derive(Clone)]
pub struct SqliteGrantStore {
    /// Shared database.
    db: SqliteStore,
}

impl SqliteGrantStore {
    /// Opens a database as its writer and returns its grant store view.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        Ok(SqliteStore::open(config)?.grant_store())
    }

    /// Loads and verifies every grant row.
    fn load_all(&self) -> Result<Vec<PermissionGrant>, SqliteStoreError> {
        let rows = {
            let guard = self.db.lock()?;
            let mut stmt = guard
                .prepare(
                    "SELECT grant_id, grant_json, grant_hash FROM grants ORDER BY grant_id ASC",
                )
                .map_err(|err| db_err(&err))?;
            let mapped = stmt
                .query_map(params![], |row| {
                    let id: String = row.get(0)?;
                    let bytes: Vec<u8> = row.get(1)?;
                    let hash: String = row.get(2)?;
                    Ok((id, bytes, hash))
                })
                .map_err(|err| db_err(&err))?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row.map_err(|err| db_err(&err))?);
            }
            rows
        };
        let mut grants = Vec::with_capacity(rows.len());
        for (id, bytes, hash) in rows {
            if bytes.len() > MAX_PAYLOAD_BYTES {
                return Err(SqliteStoreError::TooLarge {
                    max_bytes: MAX_PAYLOAD_BYTES,
                    actual_bytes: bytes.len(),
                });
            }
            if sha256_hex(&bytes) != hash {
                return Err(SqliteStoreError::Corrupt(format!("hash mismatch for grant {id}")));
            }
            let grant: PermissionGrant = serde_json::from_slice(&bytes)
                .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            if grant.id.as_str() != id {
                return Err(SqliteStoreError::Invalid(
                    "grant_id mismatch between key and payload".to_string(),
                ));
            }
            grants.push(grant);
        }
        Ok(grants)
    }

    /// Upserts one grant snapshot.
    fn save(&self, grant: &PermissionGrant) -> Result<(), SqliteStoreError> {
        let bytes = canonical_json_bytes(grant)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let digest = sha256_hex(&bytes);
        self.db.ensure_writer()?;
        let guard = self.db.lock()?;
        guard
            .execute(
                "INSERT INTO grants (grant_id, grant_json, grant_hash, updated_at) VALUES (?1, \
                 ?2, ?3, ?4) ON CONFLICT(grant_id) DO UPDATE SET grant_json = \
                 excluded.grant_json, grant_hash = excluded.grant_hash, updated_at = \
                 excluded.updated_at",
                params![grant.id.as_str(), bytes, digest, unix_millis()],
            )
            .map_err(|err| db_err(&err))?;
        drop(guard);
        Ok(())
    }
}

impl GrantStore for SqliteGrantStore {
    fn load_grants(&self) -> Result<Vec<PermissionGrant>, StoreError> {
        self.load_all().map_err(StoreError::from)
    }

    fn put_grant(&self, grant: &PermissionGrant) -> Result<(), StoreError> {
        self.save(grant).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(|err| db_err(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_err(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_err(&err))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_err(&err))?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_err(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_err(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_err(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_err(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS audit_entries (
                    seq INTEGER PRIMARY KEY,
                    turn_id TEXT,
                    event_type TEXT NOT NULL,
                    actor TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL,
                    payload BLOB NOT NULL,
                    prev_hash TEXT NOT NULL,
                    hash TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_entries_turn_id
                    ON audit_entries (turn_id);
                CREATE TRIGGER IF NOT EXISTS audit_entries_no_update
                    BEFORE UPDATE ON audit_entries
                    BEGIN SELECT RAISE(ABORT, 'audit entries are append-only'); END;
                CREATE TRIGGER IF NOT EXISTS audit_entries_no_delete
                    BEFORE DELETE ON audit_entries
                    BEGIN SELECT RAISE(ABORT, 'audit entries are append-only'); END;
                CREATE TABLE IF NOT EXISTS grants (
                    grant_id TEXT PRIMARY KEY,
                    grant_json BLOB NOT NULL,
                    grant_hash TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );",
            )
            .map_err(|err| db_err(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_err(&err))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
