// crates/ngd-gateway-mcp/src/envelope.rs
// ============================================================================
// Module: Error Envelope
// Description: Closed error taxonomy and the structured failure payload.
// Purpose: Give every failing tool call one predictable, machine-readable shape.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every failure produced by the gateway, whatever layer raised it, is
//! converted into an [`ErrorEnvelope`] before it leaves the tool router. The
//! [`ErrorCode`] set is closed; each code carries a default retry hint and a
//! suggested next tool so callers always know which always-available
//! operation to try next.
//!
//! ## Invariants
//! - `status` is always `"error"`.
//! - `error_code` is one of the [`ErrorCode`] variants.
//! - Messages and details are sanitized by the caller before construction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Envelope schema version emitted with every error.
pub const ENVELOPE_VERSION: &str = "1.0";

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Closed error taxonomy shared by every gateway layer.
///
/// # Invariants
/// - Wire names are stable; they form part of the public tool contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed parameters, caught before any upstream call.
    InvalidInput,
    /// Unknown collection identifier.
    InvalidCollection,
    /// Workflow context has not been established for the session.
    WorkflowContextRequired,
    /// Queryables have not been fetched for the session.
    QueryablesRequired,
    /// Local admission control rejected the call.
    RateLimit,
    /// Missing or invalid credential (local or upstream).
    AuthError,
    /// Valid credential without the required entitlement.
    Forbidden,
    /// Upstream failure, malformed response, or exhausted retries.
    UpstreamError,
    /// Uncategorized failure.
    GeneralError,
}

impl ErrorCode {
    /// All error codes in declaration order.
    pub const ALL: [Self; 9] = [
        Self::InvalidInput,
        Self::InvalidCollection,
        Self::WorkflowContextRequired,
        Self::QueryablesRequired,
        Self::RateLimit,
        Self::AuthError,
        Self::Forbidden,
        Self::UpstreamError,
        Self::GeneralError,
    ];

    /// Returns the stable wire name for the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidCollection => "INVALID_COLLECTION",
            Self::WorkflowContextRequired => "WORKFLOW_CONTEXT_REQUIRED",
            Self::QueryablesRequired => "QUERYABLES_REQUIRED",
            Self::RateLimit => "RATE_LIMIT",
            Self::AuthError => "AUTH_ERROR",
            Self::Forbidden => "FORBIDDEN",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::GeneralError => "GENERAL_ERROR",
        }
    }

    /// Returns the default retry hint for the code.
    #[must_use]
    pub const fn default_hint(self) -> &'static str {
        match self {
            Self::InvalidInput => {
                "Validate and correct your parameters (check enum values & syntax) then retry"
            }
            Self::InvalidCollection => {
                "Call get_workflow_context() to inspect valid collections and retry"
            }
            Self::WorkflowContextRequired => {
                "Call get_workflow_context() then follow planning steps"
            }
            Self::QueryablesRequired => {
                "Call fetch_detailed_collections() for the target collections then retry"
            }
            Self::RateLimit => "Wait for the rate limit window to reset then retry",
            Self::AuthError => "Check the upstream API key with check_api_key() then retry",
            Self::Forbidden => "The credential lacks access to this resource; check its API plan",
            Self::UpstreamError => "Temporary upstream failure; retry with backoff",
            Self::GeneralError => {
                "Review error, adjust inputs (ensure workflow context if required), then retry"
            }
        }
    }

    /// Returns the always-available tool a caller should try next, when the
    /// code points somewhere other than the failing tool.
    #[must_use]
    pub const fn next_tool(self) -> Option<&'static str> {
        match self {
            Self::InvalidCollection | Self::WorkflowContextRequired => {
                Some("get_workflow_context")
            }
            Self::QueryablesRequired => Some("fetch_detailed_collections"),
            Self::AuthError | Self::Forbidden => Some("check_api_key"),
            Self::InvalidInput | Self::RateLimit | Self::UpstreamError | Self::GeneralError => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Envelope status marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    /// Failed call.
    Error,
}

/// Retry guidance attached to every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryGuidance {
    /// Tool the caller should invoke next.
    pub tool: String,
    /// Human-readable next step.
    pub hint: String,
}

/// Structured failure returned for any failing tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always [`EnvelopeStatus::Error`].
    pub status: EnvelopeStatus,
    /// Envelope schema version.
    pub version: String,
    /// Tool that failed.
    pub tool: String,
    /// Closed error code.
    pub error_code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional machine-readable details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Suggested next step.
    pub retry_guidance: RetryGuidance,
}

impl ErrorEnvelope {
    /// Builds an envelope with the default guidance for `code`.
    #[must_use]
    pub fn new(tool: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        let tool = tool.into();
        let next = code.next_tool().map_or_else(|| tool.clone(), str::to_string);
        Self {
            status: EnvelopeStatus::Error,
            version: ENVELOPE_VERSION.to_string(),
            tool,
            error_code: code,
            message: message.into(),
            details: None,
            retry_guidance: RetryGuidance {
                tool: next,
                hint: code.default_hint().to_string(),
            },
        }
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Overrides the default retry hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.retry_guidance.hint = hint.into();
        self
    }

    /// Builds a `RATE_LIMIT` envelope carrying `retry_after_ms`.
    #[must_use]
    pub fn rate_limited(tool: impl Into<String>, retry_after: Duration) -> Self {
        let retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX).max(1);
        Self::new(
            tool,
            ErrorCode::RateLimit,
            format!("rate limit exceeded; retry after {retry_after_ms} ms"),
        )
        .with_details(json!({ "retry_after_ms": retry_after_ms }))
    }

    /// Builds an `INVALID_COLLECTION` envelope listing the valid identifiers.
    #[must_use]
    pub fn invalid_collection(
        tool: impl Into<String>,
        unknown: &[String],
        valid_collections: &[String],
    ) -> Self {
        Self::new(
            tool,
            ErrorCode::InvalidCollection,
            format!("unknown collection id(s): {}", unknown.join(", ")),
        )
        .with_details(json!({
            "invalid_collections": unknown,
            "valid_collections": valid_collections,
        }))
    }

    /// Serializes the envelope into a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            json!({
                "status": "error",
                "version": ENVELOPE_VERSION,
                "tool": self.tool,
                "error_code": ErrorCode::GeneralError,
                "message": "error envelope serialization failed",
            })
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
