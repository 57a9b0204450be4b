// crates/toolgate-core/src/core/identifiers.rs
// ============================================================================
// Module: Toolgate Identifiers
// Description: Canonical opaque identifiers for turns, tools, grants, and confirmations.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the string-based identifiers used throughout Toolgate.
//! Identifiers are opaque and serialize as strings. [`TurnId`] is the one
//! identifier validated at construction: every audit entry and budget is keyed
//! by it, so an empty turn id is rejected before it can reach the pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted length of a turn identifier.
pub const MAX_TURN_ID_LENGTH: usize = 256;

// ============================================================================
// SECTION: Turn Identifier
// ============================================================================

/// Errors raised when constructing a [`TurnId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnIdError {
    /// The turn identifier was absent, empty, or whitespace only.
    #[error("turn_id is required")]
    Missing,
    /// The turn identifier exceeded [`MAX_TURN_ID_LENGTH`].
    #[error("turn_id exceeds {MAX_TURN_ID_LENGTH} bytes")]
    TooLong,
}

/// Turn identifier correlating every action taken for one user request.
///
/// # Invariants
/// - Never empty and never whitespace only.
/// - At most [`MAX_TURN_ID_LENGTH`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TurnId(String);

impl TurnId {
    /// Parses a turn identifier, rejecting empty or oversized values.
    ///
    /// # Errors
    ///
    /// Returns [`TurnIdError`] when the value is empty or too long.
    pub fn parse(id: impl Into<String>) -> Result<Self, TurnIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(TurnIdError::Missing);
        }
        if id.len() > MAX_TURN_ID_LENGTH {
            return Err(TurnIdError::TooLong);
        }
        Ok(Self(id))
    }

    /// Parses an optional turn identifier supplied by an untrusted caller.
    ///
    /// # Errors
    ///
    /// Returns [`TurnIdError::Missing`] when the value is `None`.
    pub fn from_optional(id: Option<&str>) -> Result<Self, TurnIdError> {
        id.map_or(Err(TurnIdError::Missing), Self::parse)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for TurnId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<&str> for TurnId {
    type Error = TurnIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

// ============================================================================
// SECTION: Opaque Identifiers
// ============================================================================

/// Tool identifier as registered in the tool catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolName(String);

impl ToolName {
    /// Creates a new tool name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ToolName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ToolName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Permission grant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(String);

impl GrantId {
    /// Creates a new grant identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for GrantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for GrantId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Pending confirmation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationId(String);

impl ConfirmationId {
    /// Creates a new confirmation identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfirmationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ConfirmationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
