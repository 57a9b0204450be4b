// crates/toolgate-core/src/runtime/catalog.rs
// ============================================================================
// Module: Toolgate Tool Catalog
// Description: In-memory tool registry with compiled parameter schemas.
// Purpose: Resolve tools and validate call parameters before any pipeline stage.
// Dependencies: crate::core, crate::interfaces, jsonschema
// ============================================================================

//! ## Overview
//! Tools are registered once with a descriptor and a body. The descriptor's
//! parameter schema is compiled at registration (JSON Schema 2020-12), so
//! invalid schemas are rejected up front and validation never recompiles.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use jsonschema::Draft;
use jsonschema::Validator;
use serde_json::Value;

use crate::core::ToolDescriptor;
use crate::core::ToolName;
use crate::core::settings::validate_tool_timeout;
use crate::interfaces::CatalogError;
use crate::interfaces::ResolvedTool;
use crate::interfaces::ToolBody;
use crate::interfaces::ToolCatalog;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Registered tool with its compiled schema.
struct CatalogEntry {
    /// Descriptor and body.
    tool: ResolvedTool,
    /// Compiled parameter validator.
    validator: Arc<Validator>,
}

/// In-memory tool catalog.
#[derive(Default)]
pub struct InMemoryToolCatalog {
    /// Entries keyed by tool name.
    entries: RwLock<BTreeMap<ToolName, CatalogEntry>>,
}

impl InMemoryToolCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any previous registration under its name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Registration`] when the schema does not compile
    /// or the declared timeout is out of range.
    pub fn register(
        &self,
        descriptor: ToolDescriptor,
        body: Arc<dyn ToolBody>,
    ) -> Result<(), CatalogError> {
        if descriptor.name.as_str().trim().is_empty() {
            return Err(CatalogError::Registration("tool name must be non-empty".to_string()));
        }
        if let Some(timeout) = descriptor.timeout {
            validate_tool_timeout(timeout)
                .map_err(|err| CatalogError::Registration(format!("{}: {err}", descriptor.name)))?;
        }
        let validator = compile_schema(&descriptor.parameters).map_err(|err| {
            CatalogError::Registration(format!("{}: schema does not compile: {err}", descriptor.name))
        })?;
        let name = descriptor.name.clone();
        let entry = CatalogEntry {
            tool: ResolvedTool {
                descriptor,
                body,
            },
            validator: Arc::new(validator),
        };
        self.entries
            .write()
            .map_err(|_| CatalogError::Registration("catalog lock poisoned".to_string()))?
            .insert(name, entry);
        Ok(())
    }

    /// Returns every registered descriptor in name order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Registration`] when the catalog lock is poisoned.
    pub fn descriptors(&self) -> Result<Vec<ToolDescriptor>, CatalogError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CatalogError::Registration("catalog lock poisoned".to_string()))?;
        Ok(entries.values().map(|entry| entry.tool.descriptor.clone()).collect())
    }

    /// Looks up the compiled validator for a tool.
    fn validator(&self, tool: &ToolName) -> Result<Arc<Validator>, CatalogError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CatalogError::Registration("catalog lock poisoned".to_string()))?;
        entries
            .get(tool)
            .map(|entry| Arc::clone(&entry.validator))
            .ok_or_else(|| CatalogError::UnknownTool(tool.clone()))
    }
}

impl ToolCatalog for InMemoryToolCatalog {
    fn resolve(&self, tool: &ToolName) -> Result<ResolvedTool, CatalogError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CatalogError::Registration("catalog lock poisoned".to_string()))?;
        entries
            .get(tool)
            .map(|entry| entry.tool.clone())
            .ok_or_else(|| CatalogError::UnknownTool(tool.clone()))
    }

    fn validate_params(&self, tool: &ToolName, params: &Value) -> Result<(), CatalogError> {
        let validator = self.validator(tool)?;
        if validator.is_valid(params) {
            return Ok(());
        }
        let reason = validator
            .iter_errors(params)
            .next()
            .map_or_else(|| "schema validation failed".to_string(), |err| err.to_string());
        Err(CatalogError::InvalidParams {
            tool: tool.clone(),
            reason,
        })
    }
}

/// Compiles a parameter schema.
fn compile_schema(schema: &Value) -> Result<Validator, String> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| err.to_string())
}
