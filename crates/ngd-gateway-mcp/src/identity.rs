// crates/ngd-gateway-mcp/src/identity.rs
// ============================================================================
// Module: Caller Identity
// Description: Client and session identifiers used as isolation keys.
// Purpose: Key the rate limiter by caller and the workflow gate by session.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`ClientId`] identifies the caller for admission control and auditing.
//! Values are derived by the auth layer: `stdio`, `loopback`, or
//! `bearer:<fingerprint-prefix>`. Raw bearer tokens are never used as keys.
//!
//! [`SessionId`] keys workflow state. HTTP callers may supply the
//! `Mcp-Session-Id` header; the value is untrusted and sanitized here. Without
//! a header the session falls back to the client identity, and stdio callers
//! share the single `stdio` session.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the transport session identifier.
pub const SESSION_HEADER: &str = "mcp-session-id";
/// Maximum accepted session identifier length.
pub const MAX_SESSION_ID_LENGTH: usize = 128;
/// Hex characters of the token fingerprint kept in bearer client ids.
const BEARER_FINGERPRINT_PREFIX: usize = 16;

// ============================================================================
// SECTION: Client Identity
// ============================================================================

/// Opaque caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Wraps an identity label.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Identity shared by stdio callers.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new("stdio")
    }

    /// Identity shared by local HTTP callers.
    #[must_use]
    pub fn loopback() -> Self {
        Self::new("loopback")
    }

    /// Identity for a bearer caller, derived from the token's sha256 fingerprint.
    #[must_use]
    pub fn bearer(fingerprint: &str) -> Self {
        let prefix: String = fingerprint.chars().take(BEARER_FINGERPRINT_PREFIX).collect();
        Self(format!("bearer:{prefix}"))
    }

    /// Returns the identity label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Session Identity
// ============================================================================

/// Workflow session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a trusted session label.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Session used when the transport carries no session header.
    #[must_use]
    pub fn for_client(client: &ClientId) -> Self {
        Self(client.as_str().to_string())
    }

    /// Returns the session label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reason a caller-supplied session identifier was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionIdRejection {
    /// Empty after trimming.
    Empty,
    /// Longer than [`MAX_SESSION_ID_LENGTH`].
    TooLong,
    /// Contains a character outside `[A-Za-z0-9._:-]`.
    DisallowedChar,
}

impl SessionIdRejection {
    /// Returns a stable label for the rejection.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooLong => "too_long",
            Self::DisallowedChar => "disallowed_char",
        }
    }
}

/// Validates a caller-supplied session header value.
///
/// Accepted values are namespaced with `session:` so they cannot collide with
/// client-derived fallback sessions.
///
/// # Errors
///
/// Returns [`SessionIdRejection`] when the value is empty, too long, or
/// contains characters outside the allowed set.
pub fn sanitize_session_id(raw: &str) -> Result<SessionId, SessionIdRejection> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SessionIdRejection::Empty);
    }
    if trimmed.len() > MAX_SESSION_ID_LENGTH {
        return Err(SessionIdRejection::TooLong);
    }
    if !trimmed.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | ':' | '-'))
    {
        return Err(SessionIdRejection::DisallowedChar);
    }
    Ok(SessionId(format!("session:{trimmed}")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
