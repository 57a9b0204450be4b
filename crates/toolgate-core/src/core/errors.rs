// crates/toolgate-core/src/core/errors.rs
// ============================================================================
// Module: Toolgate Error Taxonomy
// Description: Closed error categories, classified control errors, and tool faults.
// Purpose: Give every fault crossing the executor boundary exactly one category.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Tool bodies report failures as [`ToolFault`] values (or arbitrary errors
//! boxed inside one). The classifier turns each fault into a [`ControlError`]
//! carrying one [`ErrorCategory`]. Only [`ControlError`] values reach the
//! planner.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ToolName;

// ============================================================================
// SECTION: Error Categories
// ============================================================================

/// Closed taxonomy of classified failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Authorization refused the call.
    PermissionDenied,
    /// Unknown tool or invalid parameters.
    Validation,
    /// The tool body reported a failure.
    ToolExecution,
    /// The tool exceeded its execution timeout.
    Timeout,
    /// The tool's circuit breaker rejected the call.
    CircuitOpen,
    /// A dependency outside the process failed.
    ExternalService,
    /// The turn's failure budget is exhausted.
    BudgetExceeded,
    /// Fault that matched no known shape.
    Internal,
}

impl ErrorCategory {
    /// All categories in declaration order.
    pub const ALL: [Self; 8] = [
        Self::PermissionDenied,
        Self::Validation,
        Self::ToolExecution,
        Self::Timeout,
        Self::CircuitOpen,
        Self::ExternalService,
        Self::BudgetExceeded,
        Self::Internal,
    ];

    /// Returns the canonical label for the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::Validation => "validation",
            Self::ToolExecution => "tool_execution",
            Self::Timeout => "timeout",
            Self::CircuitOpen => "circuit_open",
            Self::ExternalService => "external_service",
            Self::BudgetExceeded => "budget_exceeded",
            Self::Internal => "internal",
        }
    }

    /// Returns true when a retry could plausibly succeed.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::ToolExecution | Self::Timeout | Self::ExternalService)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| format!("unknown error category: {value}"))
    }
}

// ============================================================================
// SECTION: Control Error
// ============================================================================

/// Classified error returned by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{category}: {message}")]
pub struct ControlError {
    /// Error category.
    pub category: ErrorCategory,
    /// Human-readable detail. Never contains tool parameters.
    pub message: String,
    /// Tool the error relates to.
    pub tool: Option<ToolName>,
    /// Milliseconds until the call may succeed, for circuit-open errors.
    pub retry_after_ms: Option<u64>,
}

impl ControlError {
    /// Creates a classified error.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            tool: None,
            retry_after_ms: None,
        }
    }

    /// Attaches the related tool.
    #[must_use]
    pub fn with_tool(mut self, tool: &ToolName) -> Self {
        self.tool = Some(tool.clone());
        self
    }

    /// Creates a permission-denied error.
    #[must_use]
    pub fn permission_denied(tool: &ToolName, reason: impl Into<String>) -> Self {
        Self::new(ErrorCategory::PermissionDenied, reason).with_tool(tool)
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(tool: &ToolName, reason: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, reason).with_tool(tool)
    }

    /// Creates a circuit-open error.
    #[must_use]
    pub fn circuit_open(tool: &ToolName, retry_after_ms: u64) -> Self {
        let mut error = Self::new(
            ErrorCategory::CircuitOpen,
            format!("circuit open for {tool}; retry after {retry_after_ms} ms"),
        )
        .with_tool(tool);
        error.retry_after_ms = Some(retry_after_ms);
        error
    }

    /// Creates a budget-exceeded error.
    #[must_use]
    pub fn budget_exceeded(tool: &ToolName, reason: impl Into<String>) -> Self {
        Self::new(ErrorCategory::BudgetExceeded, reason).with_tool(tool)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, reason)
    }
}

// ============================================================================
// SECTION: Tool Faults
// ============================================================================

/// Raw failure reported by a tool body.
#[derive(Debug, Error)]
pub enum ToolFault {
    /// The tool observed its own deadline expire.
    #[error("tool timed out: {0}")]
    Timeout(String),
    /// The underlying system refused access.
    #[error("access denied: {0}")]
    PermissionDenied(String),
    /// The tool rejected its input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Network transport failure.
    #[error("network failure: {0}")]
    Network(String),
    /// An external service returned an error.
    #[error("external service {service} failed: {message}")]
    ExternalService {
        /// Service name.
        service: String,
        /// Failure detail.
        message: String,
    },
    /// Generic tool failure.
    #[error("tool failed: {0}")]
    Failed(String),
    /// Operating system I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Any other error raised by the tool.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}
