// crates/ngd-gateway-mcp/src/lib.rs
// ============================================================================
// Module: NGD Gateway MCP
// Description: Tool gateway in front of the OS NGD Features and Links APIs.
// Purpose: Enforce the query-planning workflow and protect the upstream API.
// Dependencies: ngd-gateway-config, axum, reqwest, tokio
// ============================================================================

//! ## Overview
//! The gateway exposes the Ordnance Survey NGD OGC API Features service and
//! its Linked Identifiers service as JSON-RPC tools. Calls pass per-client
//! admission control and a per-session workflow gate before they reach a
//! retrying upstream client; collection metadata is served from a TTL cache
//! with in-flight coalescing. Every failure becomes an [`ErrorEnvelope`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod envelope;
pub mod guardrails;
pub mod identity;
pub mod params;
pub mod rate_limit;
pub mod sanitize;
pub mod server;
pub mod telemetry;
pub mod tools;
pub mod upstream;
pub mod workflow;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use auth::DefaultToolAuthz;
pub use auth::RequestContext;
pub use auth::ToolAuthz;
pub use catalog::CatalogCache;
pub use config::GatewayConfig;
pub use envelope::ErrorCode;
pub use envelope::ErrorEnvelope;
pub use identity::ClientId;
pub use identity::SessionId;
pub use params::EndpointKind;
pub use params::UpstreamParams;
pub use rate_limit::RateLimiter;
pub use server::GatewayServer;
pub use server::ServerError;
pub use telemetry::GatewayMetrics;
pub use telemetry::NoopMetrics;
pub use tools::ToolName;
pub use tools::ToolOutcome;
pub use tools::ToolRouter;
pub use tools::ToolRouterConfig;
pub use upstream::HttpUpstreamClient;
pub use upstream::UpstreamApi;
pub use upstream::UpstreamError;
pub use workflow::SessionState;
pub use workflow::WorkflowGate;
