// crates/toolgate-core/src/core/tool.rs
// ============================================================================
// Module: Toolgate Tool Model
// Description: Tool descriptors and planner-issued tool calls.
// Purpose: Describe what the catalog declares and what the planner requests.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`ToolDescriptor`] is what the catalog knows about a tool: its declared
//! permission level, parameter schema, and optional timeout. A [`ToolCall`] is
//! one untrusted request from the planner, with its declared dependencies.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ToolName;
use crate::core::permission::PermissionLevel;

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Catalog metadata for a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool identifier.
    pub name: ToolName,
    /// Declared permission level.
    pub level: PermissionLevel,
    /// Short description for approvers and operators.
    pub description: String,
    /// JSON Schema for call parameters.
    pub parameters: Value,
    /// Execution timeout; the control plane default applies when absent.
    pub timeout: Option<Duration>,
}

impl ToolDescriptor {
    /// Creates a descriptor accepting any object parameters.
    #[must_use]
    pub fn new(name: impl Into<ToolName>, level: PermissionLevel) -> Self {
        Self {
            name: name.into(),
            level,
            description: String::new(),
            parameters: serde_json::json!({ "type": "object" }),
            timeout: None,
        }
    }

    /// Sets the parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }

    /// Sets the execution timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ============================================================================
// SECTION: Tool Calls
// ============================================================================

/// Tool invocation requested by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Requested tool.
    pub tool: ToolName,
    /// Call parameters.
    pub params: Value,
    /// Earlier tools in the plan whose results this call consumes.
    #[serde(default)]
    pub depends_on: Vec<ToolName>,
    /// True when later plan steps consume this call's result.
    #[serde(default)]
    pub is_dependency: bool,
}

impl ToolCall {
    /// Creates a call with no declared dependencies.
    #[must_use]
    pub fn new(tool: impl Into<ToolName>, params: Value) -> Self {
        Self {
            tool: tool.into(),
            params,
            depends_on: Vec::new(),
            is_dependency: false,
        }
    }

    /// Declares tools whose results this call consumes.
    #[must_use]
    pub fn depends_on(mut self, tools: impl IntoIterator<Item = ToolName>) -> Self {
        self.depends_on.extend(tools);
        self
    }

    /// Marks this call as a hard dependency for later steps.
    #[must_use]
    pub const fn as_dependency(mut self) -> Self {
        self.is_dependency = true;
        self
    }
}
