// crates/toolgate-core/src/lib.rs
// ============================================================================
// Module: Toolgate Core Library
// Description: Public API surface for the Toolgate control plane.
// Purpose: Expose core types, interfaces, and runtime components.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Toolgate sits between a planner that proposes tool calls and the tools
//! that carry them out. It decides whether each call is permitted, records a
//! tamper-evident account of what happened, and contains failures so one
//! misbehaving tool cannot take down the session. Storage, tools, approvers,
//! and time are supplied through the traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AuditStore;
pub use interfaces::CatalogError;
pub use interfaces::Clock;
pub use interfaces::ConfirmationApprover;
pub use interfaces::GrantStore;
pub use interfaces::ResolvedTool;
pub use interfaces::StoreError;
pub use interfaces::ToolBody;
pub use interfaces::ToolCatalog;
pub use runtime::*;
