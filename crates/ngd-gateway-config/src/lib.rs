// crates/ngd-gateway-config/src/lib.rs
// ============================================================================
// Module: NGD Gateway Config Library
// Description: Canonical config model, environment overrides, and validation.
// Purpose: Single source of truth for ngd-gateway.toml semantics.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! `ngd-gateway-config` defines the configuration model for the NGD gateway.
//! Configuration is read once at startup, merged with environment overrides
//! (upstream credential, bearer tokens), and validated against hard bounds.
//! Nothing in the gateway reloads configuration at runtime.
//!
//! Security posture: config inputs are untrusted and the upstream credential
//! is wrapped in [`SecretString`] so it never reaches `Debug` output.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
