// crates/toolgate-config/src/lib.rs
// ============================================================================
// Module: Toolgate Config Library
// Description: Canonical config model, validation, and settings mapping.
// Purpose: Single source of truth for toolgate.toml semantics.
// Dependencies: toolgate-core, toolgate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `toolgate-config` defines the configuration model for a Toolgate control
//! plane. Validation is strict and fail-closed: a file that loads maps
//! cleanly into [`toolgate_core::ControlPlaneSettings`], configured grants,
//! a store backend, and a telemetry sink.
//!
//! Security posture: config inputs are untrusted. The audit key never lives
//! in the file; only the name of the environment variable holding it does.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
