// crates/toolgate-core/src/runtime/mod.rs
// ============================================================================
// Module: Toolgate Runtime
// Description: Breakers, authority, confirmation, degradation, audit, executor.
// Purpose: Mediate tool invocations requested by an untrusted planner.
// Dependencies: crate::{core, interfaces}, tokio, tokio-util, jsonschema
// ============================================================================

//! ## Overview
//! Runtime modules implement the control plane around tool execution. Every
//! component is constructed explicitly and shared through `Arc`; the
//! [`ToolExecutor`] composes them into the per-call pipeline.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod approvers;
pub mod audit_log;
pub mod authority;
pub mod breaker;
pub mod catalog;
pub mod classifier;
pub mod clock;
pub mod confirmation;
pub mod degradation;
pub mod executor;
pub mod store;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use approvers::CallbackApprover;
pub use approvers::ChannelApprover;
pub use approvers::ConfirmationPrompt;
pub use audit_log::AuditError;
pub use audit_log::AuditLog;
pub use audit_log::MAX_EXPORT_ENTRIES;
pub use audit_log::verify_bundle;
pub use audit_log::verify_store;
pub use authority::AuthorityError;
pub use authority::GrantRequest;
pub use authority::ToolAuthority;
pub use authority::config_grant_id;
pub use breaker::Admission;
pub use breaker::AttemptOutcome;
pub use breaker::BreakerError;
pub use breaker::BreakerSnapshot;
pub use breaker::BreakerState;
pub use breaker::BreakerTransition;
pub use breaker::CircuitBreakerRegistry;
pub use catalog::InMemoryToolCatalog;
pub use classifier::classify;
pub use classifier::classify_error;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use confirmation::ConfirmationError;
pub use confirmation::ConfirmationGate;
pub use confirmation::ConfirmationRequest;
pub use degradation::AbortReason;
pub use degradation::BudgetSnapshot;
pub use degradation::DegradationError;
pub use degradation::DegradationManager;
pub use degradation::DispatchGate;
pub use degradation::FailedStep;
pub use degradation::FailureContext;
pub use degradation::FailureDisposition;
pub use degradation::Remediation;
pub use degradation::TurnSummary;
pub use executor::AbortSignal;
pub use executor::ExecutionResult;
pub use executor::ExecutorComponents;
pub use executor::ToolExecutor;
pub use store::InMemoryAuditStore;
pub use store::InMemoryGrantStore;
pub use telemetry::ControlEvent;
pub use telemetry::ControlEventSink;
pub use telemetry::FileEventSink;
pub use telemetry::HealthSnapshot;
pub use telemetry::NoopEventSink;
pub use telemetry::StderrEventSink;
pub use telemetry::ToolStatus;
