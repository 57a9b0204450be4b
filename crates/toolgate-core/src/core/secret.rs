// crates/toolgate-core/src/core/secret.rs
// ============================================================================
// Module: Toolgate Audit Key
// Description: Secret HMAC key type for the audit hash chain.
// Purpose: Keep the chain key out of persisted state and diagnostic output.
// Dependencies: zeroize
// ============================================================================

//! ## Overview
//! [`AuditKey`] holds the HMAC key used to link audit entries. It implements
//! neither `Serialize` nor `Display`, renders as `AuditKey(<redacted>)` under
//! `Debug`, and zeroizes its bytes on drop. The raw bytes are reachable only
//! from inside this crate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;
use zeroize::Zeroizing;

use crate::core::hashing::sha256_hex;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum audit key length in bytes.
pub const MIN_AUDIT_KEY_BYTES: usize = 32;
/// Number of hex characters published as the key fingerprint.
const FINGERPRINT_HEX_CHARS: usize = 16;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when constructing an [`AuditKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditKeyError {
    /// Key material is shorter than [`MIN_AUDIT_KEY_BYTES`].
    #[error("audit key must be at least {MIN_AUDIT_KEY_BYTES} bytes (got {0})")]
    TooShort(usize),
}

// ============================================================================
// SECTION: Audit Key
// ============================================================================

/// HMAC key for the audit chain, held only in process memory.
pub struct AuditKey {
    /// Key bytes, zeroized on drop.
    bytes: Zeroizing<Vec<u8>>,
}

impl AuditKey {
    /// Wraps raw key material.
    ///
    /// # Errors
    ///
    /// Returns [`AuditKeyError::TooShort`] when the key is under the minimum length.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, AuditKeyError> {
        let bytes = Zeroizing::new(bytes.into());
        if bytes.len() < MIN_AUDIT_KEY_BYTES {
            return Err(AuditKeyError::TooShort(bytes.len()));
        }
        Ok(Self {
            bytes,
        })
    }

    /// Returns a short public fingerprint identifying this key in exports.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut digest = sha256_hex(&self.bytes);
        digest.truncate(FINGERPRINT_HEX_CHARS);
        digest
    }

    /// Returns the raw key bytes.
    pub(crate) fn expose(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for AuditKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuditKey(<redacted>)")
    }
}
