// crates/toolgate-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Toolgate Stores
// Description: Durable audit and grant stores using SQLite WAL.
// Purpose: Persist the audit chain and grant table across restarts.
// Dependencies: toolgate-core, rusqlite, fs2
// ============================================================================

//! ## Overview
//! This crate provides SQLite-backed [`toolgate_core::AuditStore`] and
//! [`toolgate_core::GrantStore`] implementations sharing one database file.
//! Audit rows are append-only: the schema installs triggers that abort any
//! update or delete. Stored rows are untrusted on read and fail closed when
//! they cannot be decoded. A file has at most one writer at a time; readers
//! may open it alongside that writer.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_PAYLOAD_BYTES;
pub use store::SqliteAuditStore;
pub use store::SqliteGrantStore;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
