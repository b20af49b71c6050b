// crates/ngd-gateway-mcp/src/config.rs
// ============================================================================
// Module: Gateway Configuration (Re-export)
// Description: Re-export canonical NGD gateway config types.
// Purpose: Give gateway modules one config path while centralizing config logic.
// Dependencies: ngd-gateway-config
// ============================================================================

//! ## Overview
//! Re-exports the configuration model from `ngd-gateway-config` so the server,
//! upstream client, and limiter share a single source of truth.

/// Re-export canonical config types and helpers.
pub use ngd_gateway_config::*;
