// crates/toolgate-core/src/core/permission.rs
// ============================================================================
// Module: Toolgate Permissions
// Description: Permission levels, grant scopes, and permission grants.
// Purpose: Model capability tokens evaluated by the tool authority.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`PermissionGrant`] authorizes calls to a tool, to every tool at a
//! permission level, or to any tool, at a given [`PermissionLevel`]. Grants
//! may expire, may be single-use, and may be revoked. A grant is active only
//! while it is unexpired, unrevoked, and unconsumed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::GrantId;
use crate::core::identifiers::ToolName;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Permission Levels
// ============================================================================

/// Permission level declared by a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Reads local state without side effects.
    Read,
    /// Mutates local state.
    Write,
    /// Runs programs or scripts.
    Execute,
    /// Reaches external services.
    Network,
    /// Administrative operations.
    Admin,
}

impl PermissionLevel {
    /// All permission levels in declaration order.
    pub const ALL: [Self; 5] = [Self::Read, Self::Write, Self::Execute, Self::Network, Self::Admin];

    /// Returns the canonical label for the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
            Self::Network => "network",
            Self::Admin => "admin",
        }
    }

    /// Returns true when a failure at this level must never be skipped or degraded.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::Write | Self::Execute | Self::Admin)
    }

    /// Returns true when a grant at this level authorizes a call requiring `required`.
    #[must_use]
    pub fn covers(self, required: Self) -> bool {
        self == required || self == Self::Admin
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == value)
            .ok_or_else(|| format!("unknown permission level: {value}"))
    }
}

// ============================================================================
// SECTION: Grant Scope
// ============================================================================

/// Target a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GrantScope {
    /// A single tool by exact name.
    Tool(ToolName),
    /// Every tool declared at the given level.
    Level(PermissionLevel),
    /// Wildcard scope covering every tool.
    Any,
}

impl GrantScope {
    /// Returns the match rank for a call, or `None` when the scope does not apply.
    ///
    /// Lower ranks are more specific: exact tool, then level, then wildcard.
    #[must_use]
    pub fn match_rank(&self, tool: &ToolName, level: PermissionLevel) -> Option<u8> {
        match self {
            Self::Tool(name) if name == tool => Some(0),
            Self::Level(scope_level) if *scope_level == level => Some(1),
            Self::Any => Some(2),
            Self::Tool(_) | Self::Level(_) => None,
        }
    }

    /// Parses a scope from its configuration form: `*`, `level:<name>`, or a tool name.
    ///
    /// # Errors
    ///
    /// Returns a message when the scope is empty or names an unknown level.
    pub fn parse(value: &str) -> Result<Self, String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("grant scope must be non-empty".to_string());
        }
        if trimmed == "*" {
            return Ok(Self::Any);
        }
        if let Some(level) = trimmed.strip_prefix("level:") {
            return level.parse().map(Self::Level);
        }
        Ok(Self::Tool(ToolName::new(trimmed)))
    }

    /// Returns the configuration form of the scope.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Tool(name) => name.as_str().to_string(),
            Self::Level(level) => format!("level:{level}"),
            Self::Any => "*".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Permission Grants
// ============================================================================

/// Origin of a permission grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    /// Loaded from configuration at startup.
    Config,
    /// Issued at runtime by an operator and persisted.
    User,
    /// Issued by an approved confirmation; lives for the session only.
    Session,
}

impl GrantSource {
    /// Returns the canonical label for the source.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::User => "user",
            Self::Session => "session",
        }
    }
}

/// Capability token authorizing tool calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Grant identifier.
    pub id: GrantId,
    /// Target of the grant.
    pub scope: GrantScope,
    /// Level authorized by the grant.
    pub level: PermissionLevel,
    /// Issue time.
    pub granted_at: Timestamp,
    /// Optional expiry; the grant is inactive at or after this time.
    pub expires_at: Option<Timestamp>,
    /// Single-use flag; the grant is consumed by its first authorizing check.
    pub one_time: bool,
    /// Grant origin.
    pub source: GrantSource,
    /// Explicit revocation flag.
    pub revoked: bool,
    /// Set when a one-time grant has been used.
    pub consumed: bool,
}

/// Lifecycle state of a grant at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    /// Usable for authorization.
    Active,
    /// Past its expiry.
    Expired,
    /// Explicitly revoked.
    Revoked,
    /// One-time grant already used.
    Consumed,
}

impl PermissionGrant {
    /// Returns the lifecycle state of the grant at `now`.
    #[must_use]
    pub fn state_at(&self, now: Timestamp) -> GrantState {
        if self.revoked {
            GrantState::Revoked
        } else if self.consumed {
            GrantState::Consumed
        } else if self.expires_at.is_some_and(|expiry| now >= expiry) {
            GrantState::Expired
        } else {
            GrantState::Active
        }
    }

    /// Returns true when the grant is active at `now`.
    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.state_at(now) == GrantState::Active
    }
}
