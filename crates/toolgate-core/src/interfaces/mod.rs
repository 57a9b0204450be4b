// crates/toolgate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Toolgate Interfaces
// Description: Backend-agnostic interfaces for storage, tools, approvers, and time.
// Purpose: Define the contract surfaces the Toolgate runtime depends on.
// Dependencies: crate::core, async-trait
// ============================================================================

//! ## Overview
//! Interfaces define how Toolgate integrates with external collaborators
//! without embedding backend details. Every collaborator is injected into
//! the runtime; there is no process-wide state. Implementations must fail
//! closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::ApprovalDecision;
use crate::core::AuditEntry;
use crate::core::PendingConfirmation;
use crate::core::PermissionGrant;
use crate::core::Timestamp;
use crate::core::ToolDescriptor;
use crate::core::ToolFault;
use crate::core::ToolName;
use crate::core::TurnId;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

// ============================================================================
// SECTION: Stores
// ============================================================================

/// Persistence errors raised by stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store backend error.
    #[error("store error: {0}")]
    Store(String),
    /// Stored data failed integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Rejected input.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Write conflicts with existing data.
    #[error("store conflict: {0}")]
    Conflict(String),
}

/// Append-only audit entry store.
///
/// # Invariants
/// - Entries are only ever appended; no update or delete path exists.
/// - `append` rejects a sequence number that is not exactly one past the tail.
pub trait AuditStore: Send + Sync {
    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the entry cannot be persisted.
    fn append(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Reads entries with `from_seq <= seq <= to_seq`, ascending, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when entries cannot be read.
    fn read_range(
        &self,
        from_seq: u64,
        to_seq: Option<u64>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, StoreError>;

    /// Returns the newest entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the tail cannot be read.
    fn last_entry(&self) -> Result<Option<AuditEntry>, StoreError>;

    /// Returns every entry recorded for a turn, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when entries cannot be read.
    fn entries_for_turn(&self, turn_id: &TurnId) -> Result<Vec<AuditEntry>, StoreError>;
}

/// Durable key-value store for non-session grants.
pub trait GrantStore: Send + Sync {
    /// Loads every stored grant, including revoked and consumed ones.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when grants cannot be read.
    fn load_grants(&self) -> Result<Vec<PermissionGrant>, StoreError>;

    /// Inserts or replaces a grant by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the grant cannot be persisted.
    fn put_grant(&self, grant: &PermissionGrant) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Tools
// ============================================================================

/// Executable body of a tool.
#[async_trait]
pub trait ToolBody: Send + Sync {
    /// Performs the tool's side effect.
    ///
    /// # Errors
    ///
    /// Returns [`ToolFault`] when the tool fails.
    async fn invoke(&self, params: Value) -> Result<Value, ToolFault>;

    /// Returns a lower-fidelity substitute result, when the tool has one.
    fn degraded(&self, _params: &Value) -> Option<Value> {
        None
    }
}

/// Catalog lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// No tool is registered under the name.
    #[error("unknown tool: {0}")]
    UnknownTool(ToolName),
    /// Parameters do not satisfy the tool's schema.
    #[error("invalid parameters for {tool}: {reason}")]
    InvalidParams {
        /// Tool name.
        tool: ToolName,
        /// First schema violation.
        reason: String,
    },
    /// Registration was rejected.
    #[error("invalid tool registration: {0}")]
    Registration(String),
}

/// Tool resolved from the catalog.
#[derive(Clone)]
pub struct ResolvedTool {
    /// Declared metadata.
    pub descriptor: ToolDescriptor,
    /// Executable body.
    pub body: Arc<dyn ToolBody>,
}

/// Registry of callable tools.
pub trait ToolCatalog: Send + Sync {
    /// Resolves a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownTool`] when no tool is registered.
    fn resolve(&self, tool: &ToolName) -> Result<ResolvedTool, CatalogError>;

    /// Validates call parameters against the tool's schema.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the tool is unknown or parameters are invalid.
    fn validate_params(&self, tool: &ToolName, params: &Value) -> Result<(), CatalogError>;
}

// ============================================================================
// SECTION: Approvers
// ============================================================================

/// External party that approves or refuses confirmation requests.
#[async_trait]
pub trait ConfirmationApprover: Send + Sync {
    /// Returns a decision for the request. May wait indefinitely; the gate
    /// bounds the wait with its own timeout.
    async fn decide(&self, request: &PendingConfirmation) -> ApprovalDecision;
}
