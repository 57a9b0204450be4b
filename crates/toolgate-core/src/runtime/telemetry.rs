// crates/toolgate-core/src/runtime/telemetry.rs
// ============================================================================
// Module: Toolgate Telemetry
// Description: Structured control-plane events, sinks, and health readouts.
// Purpose: Emit JSON-lines operational events without a logging framework.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Control events describe what the control plane decided, never what a tool
//! was asked to do: events carry tool names, turn ids, categories, outcomes,
//! and durations, but no call parameters and no key material. Sinks write one
//! JSON object per line so deployments can route them to any log pipeline.
//!
//! Telemetry is separate from the audit log. Sink failures are ignored; the
//! audit log is the record of authority.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::core::AuditStats;
use crate::core::AuthorityOutcome;
use crate::core::DecisionReason;
use crate::core::ErrorCategory;
use crate::core::PermissionLevel;
use crate::core::Timestamp;
use crate::core::ToolName;
use crate::core::TurnId;
use crate::runtime::breaker::BreakerSnapshot;
use crate::runtime::breaker::BreakerState;
use crate::runtime::degradation::BudgetSnapshot;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Terminal status of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Tool returned a result.
    Succeeded,
    /// Tool failed and a fallback result was substituted.
    Degraded,
    /// Tool failed or was rejected; the turn continues.
    Failed,
    /// The turn was aborted.
    Aborted,
}

/// Control-plane event emitted to telemetry sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    /// A breaker changed state.
    BreakerTransition {
        /// Tool whose breaker moved.
        tool: ToolName,
        /// Previous state.
        from: BreakerState,
        /// New state.
        to: BreakerState,
        /// Consecutive failures at the transition.
        consecutive_failures: u32,
    },
    /// The authority decided a check.
    AuthorityDecision {
        /// Turn identifier.
        turn_id: TurnId,
        /// Tool checked.
        tool: ToolName,
        /// Level required.
        level: PermissionLevel,
        /// Outcome.
        outcome: AuthorityOutcome,
        /// Reason, when one applies.
        reason: Option<DecisionReason>,
    },
    /// A confirmation request resolved.
    ConfirmationResolved {
        /// Turn identifier.
        turn_id: TurnId,
        /// Tool awaiting approval.
        tool: ToolName,
        /// Resolution reason.
        reason: DecisionReason,
        /// Time spent waiting.
        waited_ms: u64,
    },
    /// An `execute` call finished.
    ToolCompleted {
        /// Turn identifier.
        turn_id: TurnId,
        /// Tool executed.
        tool: ToolName,
        /// Terminal status.
        status: ToolStatus,
        /// Error category for non-success outcomes.
        category: Option<ErrorCategory>,
        /// Invocation attempts made.
        attempts: u32,
        /// Wall time of the call.
        elapsed_ms: u64,
    },
    /// A turn was aborted.
    TurnAborted {
        /// Turn identifier.
        turn_id: TurnId,
        /// Abort explanation.
        reason: String,
    },
    /// A turn was closed.
    TurnClosed {
        /// Turn identifier.
        turn_id: TurnId,
        /// Tools that completed.
        succeeded: usize,
        /// Failures recorded.
        failed: usize,
        /// True when the turn had been aborted.
        aborted: bool,
    },
}

/// Line written by the JSON sinks.
#[derive(Serialize)]
struct EventLine<'a> {
    /// Event time in unix milliseconds.
    at: Timestamp,
    /// Event body.
    #[serde(flatten)]
    event: &'a ControlEvent,
}

/// Serializes one event line.
fn render(at: Timestamp, event: &ControlEvent) -> Option<String> {
    serde_json::to_string(&EventLine {
        at,
        event,
    })
    .ok()
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for control-plane events.
pub trait ControlEventSink: Send + Sync {
    /// Records an event.
    fn record(&self, at: Timestamp, event: &ControlEvent);
}

/// Sink that logs JSON lines to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrEventSink;

impl ControlEventSink for StderrEventSink {
    fn record(&self, at: Timestamp, event: &ControlEvent) {
        if let Some(line) = render(at, event) {
            let _ = writeln!(std::io::stderr(), "{line}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the event log in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl ControlEventSink for FileEventSink {
    fn record(&self, at: Timestamp, event: &ControlEvent) {
        if let Some(line) = render(at, event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{line}");
            let _ = file.flush();
        }
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl ControlEventSink for NoopEventSink {
    fn record(&self, _at: Timestamp, _event: &ControlEvent) {}
}

// ============================================================================
// SECTION: Health
// ============================================================================

/// Passive health readout of the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    /// Snapshot time.
    pub at: Timestamp,
    /// Every known breaker.
    pub breakers: Vec<BreakerSnapshot>,
    /// Tools whose breakers are open.
    pub open_circuits: Vec<ToolName>,
    /// Budget state of active turns.
    pub turns: Vec<BudgetSnapshot>,
    /// Audit log statistics.
    pub audit: AuditStats,
}
