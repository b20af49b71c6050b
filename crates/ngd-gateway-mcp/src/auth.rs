// crates/ngd-gateway-mcp/src/auth.rs
// ============================================================================
// Module: Gateway Authn
// Description: Caller authentication for tool calls and tool listing.
// Purpose: Provide strict, fail-closed auth policies and caller identities.
// Dependencies: ngd-gateway-config, sha2, serde
// ============================================================================

//! ## Overview
//! This module defines the authentication interface for inbound requests and
//! the default policies: `local_only` (stdio and loopback HTTP) and
//! `bearer_token`. Every decision is fail-closed and yields the caller's
//! [`ClientId`], which keys rate limiting and default workflow sessions.
//!
//! ## Invariants
//! - Raw bearer tokens are never stored, logged, or used as keys; only their
//!   sha256 fingerprints are.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::net::IpAddr;

use ngd_gateway_config::ServerAuthConfig;
use ngd_gateway_config::ServerAuthMode;
use ngd_gateway_config::ServerTransport;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::audit::now_ms;
use crate::identity::ClientId;
use crate::tools::ToolName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted authorization header size.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request context used for auth decisions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Transport used by the caller.
    pub transport: ServerTransport,
    /// Peer IP address when available.
    pub peer_ip: Option<IpAddr>,
    /// Authorization header value (HTTP).
    pub auth_header: Option<String>,
    /// Raw session header value (HTTP), unsanitized.
    pub session_header: Option<String>,
    /// Optional request identifier for auditing.
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Builds a stdio request context.
    #[must_use]
    pub const fn stdio() -> Self {
        Self {
            transport: ServerTransport::Stdio,
            peer_ip: None,
            auth_header: None,
            session_header: None,
            request_id: None,
        }
    }

    /// Builds an HTTP request context.
    #[must_use]
    pub const fn http(
        peer_ip: Option<IpAddr>,
        auth_header: Option<String>,
        session_header: Option<String>,
    ) -> Self {
        Self {
            transport: ServerTransport::Http,
            peer_ip,
            auth_header,
            session_header,
            request_id: None,
        }
    }

    /// Returns a copy with the request identifier set.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns true when the peer IP is loopback.
    #[must_use]
    pub fn peer_is_loopback(&self) -> bool {
        self.peer_ip.is_some_and(|ip| ip.is_loopback())
    }
}

// ============================================================================
// SECTION: Auth Context
// ============================================================================

/// Authentication method used for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Local-only loopback or stdio access.
    Local,
    /// Bearer token authentication.
    BearerToken,
}

/// Authenticated caller context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Authentication method.
    pub method: AuthMethod,
    /// Caller identity derived from the method.
    pub client: ClientId,
    /// Token fingerprint for bearer auth (sha256, hex).
    pub token_fingerprint: Option<String>,
}

/// Action being authorized.
#[derive(Debug, Clone, Copy)]
pub enum AuthAction {
    /// List tools action.
    ListTools,
    /// Tool call action.
    CallTool(ToolName),
    /// Explicit end of a workflow session.
    EndSession,
}

impl AuthAction {
    /// Returns a stable action label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ListTools => "tools/list",
            Self::CallTool(tool) => tool.as_str(),
            Self::EndSession => "session/end",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing or invalid authentication.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Authentication interface for inbound requests.
pub trait ToolAuthz: Send + Sync {
    /// Authenticates a request. Returns the caller context on success.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the request fails the configured policy.
    fn authorize(&self, ctx: &RequestContext, action: AuthAction) -> Result<AuthContext, AuthError>;
}

// ============================================================================
// SECTION: Default Policy
// ============================================================================

/// Default policy derived from server auth configuration.
pub struct DefaultToolAuthz {
    /// Configured auth mode.
    mode: ServerAuthMode,
    /// Fingerprints of accepted bearer tokens.
    token_fingerprints: BTreeSet<String>,
}

impl DefaultToolAuthz {
    /// Builds a policy from server auth configuration.
    #[must_use]
    pub fn from_config(config: &ServerAuthConfig) -> Self {
        Self {
            mode: config.mode,
            token_fingerprints: config.bearer_tokens.iter().map(|token| fingerprint(token)).collect(),
        }
    }

    /// Builds a local-only policy.
    #[must_use]
    pub const fn local_only() -> Self {
        Self {
            mode: ServerAuthMode::LocalOnly,
            token_fingerprints: BTreeSet::new(),
        }
    }

    /// Returns the configured auth mode.
    #[must_use]
    pub const fn mode(&self) -> ServerAuthMode {
        self.mode
    }
}

impl ToolAuthz for DefaultToolAuthz {
    fn authorize(&self, ctx: &RequestContext, _action: AuthAction) -> Result<AuthContext, AuthError> {
        match self.mode {
            ServerAuthMode::LocalOnly => authorize_local_only(ctx),
            ServerAuthMode::BearerToken => authorize_bearer(ctx, &self.token_fingerprints),
        }
    }
}

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Auth audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct AuthAuditEvent {
    /// Event identifier.
    event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    timestamp_ms: u128,
    /// Decision outcome.
    decision: &'static str,
    /// Action label.
    action: &'static str,
    /// Transport label.
    transport: &'static str,
    /// Caller IP address (if available).
    peer_ip: Option<String>,
    /// Auth method.
    auth_method: Option<AuthMethod>,
    /// Caller identity label.
    client: Option<String>,
    /// Failure reason (for deny events).
    reason: Option<String>,
    /// Request identifier (if provided).
    request_id: Option<String>,
}

impl AuthAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub fn allowed(ctx: &RequestContext, action: AuthAction, auth: &AuthContext) -> Self {
        Self {
            event: "auth_decision",
            timestamp_ms: now_ms(),
            decision: "allow",
            action: action.label(),
            transport: ctx.transport.as_str(),
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            auth_method: Some(auth.method),
            client: Some(auth.client.to_string()),
            reason: None,
            request_id: ctx.request_id.clone(),
        }
    }

    /// Builds a deny event.
    #[must_use]
    pub fn denied(ctx: &RequestContext, action: AuthAction, error: &AuthError) -> Self {
        Self {
            event: "auth_decision",
            timestamp_ms: now_ms(),
            decision: "deny",
            action: action.label(),
            transport: ctx.transport.as_str(),
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            auth_method: None,
            client: None,
            reason: Some(error.to_string()),
            request_id: ctx.request_id.clone(),
        }
    }

    /// Returns the decision label.
    #[must_use]
    pub const fn decision(&self) -> &'static str {
        self.decision
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the lowercase hex sha256 fingerprint of a token.
#[must_use]
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Applies the local-only policy.
fn authorize_local_only(ctx: &RequestContext) -> Result<AuthContext, AuthError> {
    match ctx.transport {
        ServerTransport::Stdio => Ok(AuthContext {
            method: AuthMethod::Local,
            client: ClientId::stdio(),
            token_fingerprint: None,
        }),
        ServerTransport::Http => {
            if ctx.peer_is_loopback() {
                Ok(AuthContext {
                    method: AuthMethod::Local,
                    client: ClientId::loopback(),
                    token_fingerprint: None,
                })
            } else {
                Err(AuthError::Unauthenticated(
                    "local-only mode requires loopback access".to_string(),
                ))
            }
        }
    }
}

/// Applies the bearer token policy.
fn authorize_bearer(
    ctx: &RequestContext,
    fingerprints: &BTreeSet<String>,
) -> Result<AuthContext, AuthError> {
    let token = parse_bearer_token(ctx.auth_header.as_deref())?;
    let digest = fingerprint(token);
    if !fingerprints.contains(&digest) {
        return Err(AuthError::Unauthenticated("invalid bearer token".to_string()));
    }
    Ok(AuthContext {
        method: AuthMethod::BearerToken,
        client: ClientId::bearer(&digest),
        token_fingerprint: Some(digest),
    })
}

/// Extracts the token from a `Bearer` authorization header.
fn parse_bearer_token(auth_header: Option<&str>) -> Result<&str, AuthError> {
    let header = auth_header
        .ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    Ok(token)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
