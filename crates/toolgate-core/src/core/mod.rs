// crates/toolgate-core/src/core/mod.rs
// ============================================================================
// Module: Toolgate Core Types
// Description: Canonical identifiers, permissions, errors, and audit records.
// Purpose: Provide stable, serializable types shared by every Toolgate surface.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Core types define grants, authority decisions, the error taxonomy, audit
//! entries, and runtime settings. They carry no behavior beyond validation
//! and are the source of truth for the persisted and exported formats.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod decision;
pub mod errors;
pub mod hashing;
pub mod identifiers;
pub mod permission;
pub mod secret;
pub mod settings;
pub mod time;
pub mod tool;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditActor;
pub use audit::AuditDraft;
pub use audit::AuditEntry;
pub use audit::AuditEventType;
pub use audit::AuditRange;
pub use audit::AuditStats;
pub use audit::ChainBreak;
pub use audit::ChainMaterial;
pub use audit::GENESIS_HASH;
pub use audit::REVIEW_BUNDLE_VERSION;
pub use audit::ReviewBundle;
pub use audit::VerifyResult;
pub use decision::ApprovalDecision;
pub use decision::AuthorityDecision;
pub use decision::AuthorityOutcome;
pub use decision::ConfirmationOutcome;
pub use decision::DecisionReason;
pub use decision::PendingConfirmation;
pub use errors::ControlError;
pub use errors::ErrorCategory;
pub use errors::ToolFault;
pub use identifiers::ConfirmationId;
pub use identifiers::GrantId;
pub use identifiers::ToolName;
pub use identifiers::TurnId;
pub use identifiers::TurnIdError;
pub use permission::GrantScope;
pub use permission::GrantSource;
pub use permission::GrantState;
pub use permission::PermissionGrant;
pub use permission::PermissionLevel;
pub use secret::AuditKey;
pub use secret::AuditKeyError;
pub use settings::AuthoritySettings;
pub use settings::BreakerPolicy;
pub use settings::BreakerSettings;
pub use settings::BudgetSettings;
pub use settings::ControlPlaneSettings;
pub use settings::DegradationStrategy;
pub use settings::PolicyOverride;
pub use settings::RetryPolicy;
pub use settings::RetryRule;
pub use settings::SettingsError;
pub use time::Timestamp;
pub use tool::ToolCall;
pub use tool::ToolDescriptor;
