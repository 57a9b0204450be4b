// crates/toolgate-core/src/runtime/classifier.rs
// ============================================================================
// Module: Toolgate Fault Classifier
// Description: Total mapping from raw tool faults to the closed error taxonomy.
// Purpose: Ensure no unclassified fault crosses the executor boundary.
// Dependencies: crate::core, serde_json, tokio
// ============================================================================

//! ## Overview
//! [`classify`] and [`classify_error`] are total and deterministic: every
//! input maps to exactly one [`ErrorCategory`]. Anything unrecognized maps
//! to [`ErrorCategory::Internal`]. The message carries the fault's display
//! text, which tool bodies must keep free of parameters and secrets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;
use std::io;

use crate::core::ControlError;
use crate::core::ErrorCategory;
use crate::core::ToolFault;
use crate::core::ToolName;

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Classifies a tool fault for `tool`.
#[must_use]
pub fn classify(fault: &ToolFault, tool: &ToolName) -> ControlError {
    ControlError::new(fault_category(fault), fault.to_string()).with_tool(tool)
}

/// Classifies an arbitrary error raised outside a tool body.
#[must_use]
pub fn classify_error(error: &(dyn Error + 'static)) -> ControlError {
    if let Some(classified) = error.downcast_ref::<ControlError>() {
        return classified.clone();
    }
    ControlError::new(dyn_category(error), error.to_string())
}

/// Classifies a tool body that panicked or was cancelled by the runtime.
#[must_use]
pub fn classify_join_failure(error: &tokio::task::JoinError, tool: &ToolName) -> ControlError {
    let message = if error.is_panic() {
        format!("{tool} panicked during execution")
    } else {
        format!("{tool} was cancelled before completing")
    };
    ControlError::new(ErrorCategory::ToolExecution, message).with_tool(tool)
}

/// Classifies a tool that exceeded its execution timeout.
#[must_use]
pub fn classify_timeout(tool: &ToolName, timeout_ms: u64) -> ControlError {
    ControlError::new(ErrorCategory::Timeout, format!("{tool} exceeded its {timeout_ms} ms timeout"))
        .with_tool(tool)
}

/// Maps a tool fault variant.
fn fault_category(fault: &ToolFault) -> ErrorCategory {
    match fault {
        ToolFault::Timeout(_) => ErrorCategory::Timeout,
        ToolFault::PermissionDenied(_) => ErrorCategory::PermissionDenied,
        ToolFault::InvalidInput(_) => ErrorCategory::Validation,
        ToolFault::Network(_)
        | ToolFault::ExternalService {
            ..
        } => ErrorCategory::ExternalService,
        ToolFault::Failed(_) => ErrorCategory::ToolExecution,
        ToolFault::Io(err) => io_category(err.kind()),
        ToolFault::Other(inner) => dyn_category(inner.as_ref()),
    }
}

/// Maps a type-erased error by downcasting to known fault types.
fn dyn_category(error: &(dyn Error + 'static)) -> ErrorCategory {
    if let Some(fault) = error.downcast_ref::<ToolFault>() {
        return fault_category(fault);
    }
    if let Some(err) = error.downcast_ref::<io::Error>() {
        return io_category(err.kind());
    }
    if error.is::<tokio::time::error::Elapsed>() {
        return ErrorCategory::Timeout;
    }
    if error.is::<serde_json::Error>() {
        return ErrorCategory::Validation;
    }
    if let Some(classified) = error.downcast_ref::<ControlError>() {
        return classified.category;
    }
    ErrorCategory::Internal
}

/// Maps an I/O error kind.
fn io_category(kind: io::ErrorKind) -> ErrorCategory {
    match kind {
        io::ErrorKind::TimedOut => ErrorCategory::Timeout,
        io::ErrorKind::PermissionDenied => ErrorCategory::PermissionDenied,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::NetworkDown => ErrorCategory::ExternalService,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorCategory::Validation,
        _ => ErrorCategory::ToolExecution,
    }
}
