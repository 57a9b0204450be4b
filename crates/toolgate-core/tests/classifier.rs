// crates/toolgate-core/tests/classifier.rs
// ============================================================================
// Module: Fault Classifier Tests
// Description: Tests for the total fault-to-category mapping.
// Purpose: Ensure every raw fault lands in exactly one category.
// ============================================================================

//! ## Overview
//! Covers each tool fault variant, I/O error kinds, boxed foreign errors, and
//! errors raised outside tool bodies.

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

use std::io;
use std::time::Duration;

use toolgate_core::ControlError;
use toolgate_core::ErrorCategory;
use toolgate_core::ToolFault;
use toolgate_core::ToolName;
use toolgate_core::classify;
use toolgate_core::classify_error;

// ============================================================================
// SECTION: Tool Faults
// ============================================================================

#[test]
fn tool_fault_variants_map_to_categories() {
    let tool = ToolName::new("fetch");
    let cases = [
        (ToolFault::Timeout("deadline".into()), ErrorCategory::Timeout),
        (ToolFault::PermissionDenied("ro".into()), ErrorCategory::PermissionDenied),
        (ToolFault::InvalidInput("bad url".into()), ErrorCategory::Validation),
        (ToolFault::Network("reset".into()), ErrorCategory::ExternalService),
        (
            ToolFault::ExternalService {
                service: "search-api".into(),
                message: "503".into(),
            },
            ErrorCategory::ExternalService,
        ),
        (ToolFault::Failed("crashed".into()), ErrorCategory::ToolExecution),
    ];

    for (fault, expected) in cases {
        let error = classify(&fault, &tool);
        assert_eq!(error.category, expected, "{fault}");
        assert_eq!(error.tool.as_ref(), Some(&tool));
        assert_eq!(error.message, fault.to_string());
    }
}

#[test]
fn io_error_kinds_are_distinguished() {
    let tool = ToolName::new("read_file");
    let cases = [
        (io::ErrorKind::TimedOut, ErrorCategory::Timeout),
        (io::ErrorKind::PermissionDenied, ErrorCategory::PermissionDenied),
        (io::ErrorKind::ConnectionRefused, ErrorCategory::ExternalService),
        (io::ErrorKind::InvalidData, ErrorCategory::Validation),
        (io::ErrorKind::NotFound, ErrorCategory::ToolExecution),
    ];

    for (kind, expected) in cases {
        let fault = ToolFault::Io(io::Error::new(kind, "io"));
        assert_eq!(classify(&fault, &tool).category, expected, "{kind:?}");
    }
}

#[test]
fn boxed_foreign_errors_are_downcast() {
    let tool = ToolName::new("parse");
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let nested = ToolFault::Other(Box::new(ToolFault::Network("down".into())));

    assert_eq!(
        classify(&ToolFault::Other(Box::new(json_error)), &tool).category,
        ErrorCategory::Validation
    );
    assert_eq!(classify(&nested, &tool).category, ErrorCategory::ExternalService);
}

#[test]
fn unrecognized_error_is_internal() {
    let fault = ToolFault::Other("something odd".into());

    assert_eq!(classify(&fault, &ToolName::new("x")).category, ErrorCategory::Internal);
}

// ============================================================================
// SECTION: Errors Outside Tool Bodies
// ============================================================================

#[test]
fn classified_errors_pass_through_unchanged() {
    let original = ControlError::circuit_open(&ToolName::new("search"), 1_500);

    let reclassified = classify_error(&original);

    assert_eq!(reclassified, original);
}

#[test]
fn io_error_outside_tool_is_classified_by_kind() {
    let error = io::Error::new(io::ErrorKind::ConnectionReset, "peer reset");

    let classified = classify_error(&error);

    assert_eq!(classified.category, ErrorCategory::ExternalService);
    assert!(classified.tool.is_none());
}

#[tokio::test]
async fn elapsed_deadline_is_a_timeout() {
    let elapsed =
        tokio::time::timeout(Duration::ZERO, std::future::pending::<()>()).await.unwrap_err();

    assert_eq!(classify_error(&elapsed).category, ErrorCategory::Timeout);
}
