// crates/toolgate-core/src/core/hashing.rs
// ============================================================================
// Module: Toolgate Canonical Hashing
// Description: RFC 8785 JSON canonicalization, SHA-256, and HMAC-SHA256 helpers.
// Purpose: Provide deterministic digests and keyed chain hashes for the audit log.
// Dependencies: hmac, serde, serde_jcs, sha2, subtle
// ============================================================================

//! ## Overview
//! Toolgate canonicalizes every hashed JSON value with RFC 8785 (JCS): keys
//! are sorted, numbers normalized, and text is UTF-8. Audit chain links are
//! HMAC-SHA256 tags over those canonical bytes, rendered as lowercase hex.
//! Tag comparison is constant-time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use hmac::Hmac;
use hmac::Mac;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// HMAC instance used for audit chain tags.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
    /// The MAC key was rejected.
    #[error("invalid mac key: {0}")]
    InvalidKey(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Returns the lowercase hex SHA-256 digest of raw bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Returns the lowercase hex HMAC-SHA256 tag of the canonical form of `value`.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails or the key is rejected.
pub fn hmac_canonical_json<T: Serialize + ?Sized>(
    key: &[u8],
    value: &T,
) -> Result<String, HashError> {
    let bytes = canonical_json_bytes(value)?;
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|err| HashError::InvalidKey(err.to_string()))?;
    mac.update(&bytes);
    Ok(hex_encode(&mac.finalize().into_bytes()))
}

/// Compares two hex tags in constant time.
#[must_use]
pub fn tags_match(expected: &str, actual: &str) -> bool {
    if expected.len() != actual.len() {
        return false;
    }
    expected.as_bytes().ct_eq(actual.as_bytes()).into()
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
