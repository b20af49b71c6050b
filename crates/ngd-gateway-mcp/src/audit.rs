// crates/ngd-gateway-mcp/src/audit.rs
// ============================================================================
// Module: Gateway Audit Logging
// Description: Structured audit events for tool calls and upstream traffic.
// Purpose: Emit redacted JSON-lines audit logs without a logging framework.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit event payloads and sinks. Events serialize to one JSON object per
//! line so deployments can route them to their preferred pipeline.
//!
//! ## Invariants
//! - Events never carry argument values, credentials, or upstream URLs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use ngd_gateway_config::ServerTransport;
use serde::Serialize;

use crate::auth::AuthAuditEvent;
use crate::envelope::ErrorCode;
use crate::params::EndpointKind;
use crate::telemetry::CallOutcome;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Tool call audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Transport used for the request.
    pub transport: ServerTransport,
    /// Caller identity label.
    pub client: String,
    /// Workflow session label.
    pub session: String,
    /// Tool name as requested.
    pub tool: String,
    /// Call outcome.
    pub outcome: CallOutcome,
    /// Envelope error code on failure.
    pub error_code: Option<ErrorCode>,
    /// Call latency in milliseconds.
    pub latency_ms: u64,
}

/// Inputs required to construct a tool call audit event.
pub struct ToolCallAuditParams {
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Transport used for the request.
    pub transport: ServerTransport,
    /// Caller identity label.
    pub client: String,
    /// Workflow session label.
    pub session: String,
    /// Tool name as requested.
    pub tool: String,
    /// Call outcome.
    pub outcome: CallOutcome,
    /// Envelope error code on failure.
    pub error_code: Option<ErrorCode>,
    /// Call latency in milliseconds.
    pub latency_ms: u64,
}

/// Upstream request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Endpoint kind label.
    pub endpoint: &'static str,
    /// HTTP status when a response was received.
    pub status: Option<u16>,
    /// One-based attempt number.
    pub attempt: u32,
    /// Attempt outcome label.
    pub outcome: &'static str,
    /// Attempt latency in milliseconds.
    pub latency_ms: u64,
}

impl ToolCallAuditEvent {
    /// Creates a new tool call audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: ToolCallAuditParams) -> Self {
        Self {
            event: "tool_call",
            timestamp_ms: now_ms(),
            request_id: params.request_id,
            transport: params.transport,
            client: params.client,
            session: params.session,
            tool: params.tool,
            outcome: params.outcome,
            error_code: params.error_code,
            latency_ms: params.latency_ms,
        }
    }
}

impl UpstreamAuditEvent {
    /// Creates a new upstream audit event with a consistent timestamp.
    #[must_use]
    pub fn new(
        endpoint: EndpointKind,
        status: Option<u16>,
        attempt: u32,
        outcome: &'static str,
        latency_ms: u64,
    ) -> Self {
        Self {
            event: "upstream_request",
            timestamp_ms: now_ms(),
            endpoint: endpoint.as_str(),
            status,
            attempt,
            outcome,
            latency_ms,
        }
    }
}

/// Returns the current time in milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for gateway events.
pub trait AuditSink: Send + Sync {
    /// Record a tool call audit event.
    fn record_tool_call(&self, event: &ToolCallAuditEvent);

    /// Record an authentication decision.
    fn record_auth(&self, _event: &AuthAuditEvent) {}

    /// Record an upstream request attempt.
    fn record_upstream(&self, _event: &UpstreamAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one serialized event to stderr.
    fn emit(event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record_tool_call(&self, event: &ToolCallAuditEvent) {
        Self::emit(event);
    }

    fn record_auth(&self, event: &AuthAuditEvent) {
        Self::emit(event);
    }

    fn record_upstream(&self, event: &UpstreamAuditEvent) {
        Self::emit(event);
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event.
    fn emit(&self, event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_tool_call(&self, event: &ToolCallAuditEvent) {
        self.emit(event);
    }

    fn record_auth(&self, event: &AuthAuditEvent) {
        self.emit(event);
    }

    fn record_upstream(&self, event: &UpstreamAuditEvent) {
        self.emit(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_tool_call(&self, _event: &ToolCallAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
