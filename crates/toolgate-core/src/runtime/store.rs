// crates/toolgate-core/src/runtime/store.rs
// ============================================================================
// Module: Toolgate In-Memory Stores
// Description: In-memory audit and grant stores for tests and embedding.
// Purpose: Provide deterministic store implementations without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides in-memory implementations of [`AuditStore`] and
//! [`GrantStore`]. Contents are lost at process exit; use the `SQLite`
//! backends for durable state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::AuditEntry;
use crate::core::GrantId;
use crate::core::PermissionGrant;
use crate::core::TurnId;
use crate::interfaces::AuditStore;
use crate::interfaces::GrantStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// In-memory append-only audit store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditStore {
    /// Entries in sequence order.
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the entry list.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<AuditEntry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Store("audit store mutex poisoned".to_string()))
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let expected = guard.last().map_or(1, |last| last.seq.saturating_add(1));
        if entry.seq != expected {
            return Err(StoreError::Conflict(format!(
                "audit append out of order: expected seq {expected}, got {}",
                entry.seq
            )));
        }
        guard.push(entry.clone());
        drop(guard);
        Ok(())
    }

    fn read_range(
        &self,
        from_seq: u64,
        to_seq: Option<u64>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .iter()
            .filter(|entry| entry.seq >= from_seq && to_seq.is_none_or(|to| entry.seq <= to))
            .take(limit)
            .cloned()
            .collect())
    }

    fn last_entry(&self) -> Result<Option<AuditEntry>, StoreError> {
        Ok(self.lock()?.last().cloned())
    }

    fn entries_for_turn(&self, turn_id: &TurnId) -> Result<Vec<AuditEntry>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.iter().filter(|entry| entry.turn_id.as_ref() == Some(turn_id)).cloned().collect())
    }
}

// ============================================================================
// SECTION: Grant Store
// ============================================================================

/// In-memory grant store keyed by grant identifier.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGrantStore {
    /// Grants by identifier.
    grants: Arc<Mutex<BTreeMap<GrantId, PermissionGrant>>>,
}

impl InMemoryGrantStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GrantStore for InMemoryGrantStore {
    fn load_grants(&self) -> Result<Vec<PermissionGrant>, StoreError> {
        let guard = self
            .grants
            .lock()
            .map_err(|_| StoreError::Store("grant store mutex poisoned".to_string()))?;
        Ok(guard.values().cloned().collect())
    }

    fn put_grant(&self, grant: &PermissionGrant) -> Result<(), StoreError> {
        self.grants
            .lock()
            .map_err(|_| StoreError::Store("grant store mutex poisoned".to_string()))?
            .insert(grant.id.clone(), grant.clone());
        Ok(())
    }
}
