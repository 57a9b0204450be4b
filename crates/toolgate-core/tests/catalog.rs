// crates/toolgate-core/tests/catalog.rs
// ============================================================================
// Module: Tool Catalog Tests
// Description: Tests for tool registration and parameter validation.
// Purpose: Ensure schemas compile at registration and calls are checked against them.
// ============================================================================

//! ## Overview
//! Registration rejects bad schemas, names, and timeouts; resolution and
//! parameter validation use the compiled schema.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::time::Duration;

use serde_json::json;
use toolgate_core::CatalogError;
use toolgate_core::InMemoryToolCatalog;
use toolgate_core::PermissionLevel;
use toolgate_core::ToolCatalog;
use toolgate_core::ToolDescriptor;
use toolgate_core::ToolName;

use common::EchoTool;

fn search_descriptor() -> ToolDescriptor {
    ToolDescriptor::new("web_search", PermissionLevel::Network).with_parameters(json!({
        "type": "object",
        "properties": { "query": { "type": "string", "minLength": 1 } },
        "required": ["query"],
        "additionalProperties": false
    }))
}

#[test]
fn registered_tool_resolves_and_validates() {
    let catalog = InMemoryToolCatalog::new();
    catalog.register(search_descriptor(), EchoTool::new(json!([]))).unwrap();
    let tool = ToolName::new("web_search");

    let resolved = catalog.resolve(&tool).unwrap();

    assert_eq!(resolved.descriptor.level, PermissionLevel::Network);
    assert!(catalog.validate_params(&tool, &json!({ "query": "rust" })).is_ok());
}

#[test]
fn invalid_params_name_the_tool() {
    let catalog = InMemoryToolCatalog::new();
    catalog.register(search_descriptor(), EchoTool::new(json!([]))).unwrap();
    let tool = ToolName::new("web_search");

    let missing = catalog.validate_params(&tool, &json!({}));
    let extra = catalog.validate_params(&tool, &json!({ "query": "x", "page": 2 }));

    assert!(matches!(missing, Err(CatalogError::InvalidParams { tool: ref name, .. }) if *name == tool));
    assert!(matches!(extra, Err(CatalogError::InvalidParams { .. })));
}

#[test]
fn unknown_tool_is_reported() {
    let catalog = InMemoryToolCatalog::new();
    let tool = ToolName::new("ghost");

    assert!(matches!(catalog.resolve(&tool), Err(CatalogError::UnknownTool(_))));
    assert!(matches!(catalog.validate_params(&tool, &json!({})), Err(CatalogError::UnknownTool(_))));
}

#[test]
fn registration_rejects_uncompilable_schema() {
    let catalog = InMemoryToolCatalog::new();
    let descriptor = ToolDescriptor::new("broken", PermissionLevel::Read)
        .with_parameters(json!({ "type": "not-a-type" }));

    let result = catalog.register(descriptor, EchoTool::new(json!(null)));

    assert!(matches!(result, Err(CatalogError::Registration(message)) if message.contains("broken")));
}

#[test]
fn registration_rejects_out_of_range_timeout_and_blank_name() {
    let catalog = InMemoryToolCatalog::new();
    let slow = ToolDescriptor::new("slow", PermissionLevel::Read)
        .with_timeout(Duration::from_secs(3_600));
    let zero = ToolDescriptor::new("instant", PermissionLevel::Read).with_timeout(Duration::ZERO);
    let blank = ToolDescriptor::new("  ", PermissionLevel::Read);

    assert!(catalog.register(slow, EchoTool::new(json!(null))).is_err());
    assert!(catalog.register(zero, EchoTool::new(json!(null))).is_err());
    assert!(catalog.register(blank, EchoTool::new(json!(null))).is_err());
    assert!(catalog.descriptors().unwrap().is_empty());
}

#[test]
fn re_registration_replaces_the_descriptor() {
    let catalog = InMemoryToolCatalog::new();
    catalog.register(search_descriptor(), EchoTool::new(json!([]))).unwrap();
    catalog
        .register(
            ToolDescriptor::new("web_search", PermissionLevel::Network)
                .with_description("search v2"),
            EchoTool::new(json!([])),
        )
        .unwrap();
    catalog
        .register(ToolDescriptor::new("calendar_read", PermissionLevel::Read), EchoTool::new(json!({})))
        .unwrap();

    let descriptors = catalog.descriptors().unwrap();

    let names: Vec<&str> = descriptors.iter().map(|descriptor| descriptor.name.as_str()).collect();
    assert_eq!(names, ["calendar_read", "web_search"]);
    assert_eq!(descriptors[1].description, "search v2");
    assert!(catalog.validate_params(&ToolName::new("web_search"), &json!({ "page": 1 })).is_ok());
}
