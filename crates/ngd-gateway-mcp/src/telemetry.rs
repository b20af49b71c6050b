// crates/ngd-gateway-mcp/src/telemetry.rs
// ============================================================================
// Module: Gateway Telemetry
// Description: Metric hooks for JSON-RPC requests and tool calls.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A thin metrics interface for request counters and latency histograms.
//! Deployments plug in their own exporter by implementing [`GatewayMetrics`].
//! Labels never carry argument values, credentials, or upstream URLs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use ngd_gateway_config::ServerTransport;
use serde::Serialize;

use crate::envelope::ErrorCode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for request histograms.
pub const GATEWAY_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000, 120_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// JSON-RPC method classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RpcMethod {
    /// JSON-RPC initialize.
    Initialize,
    /// JSON-RPC tools/list.
    ToolsList,
    /// JSON-RPC tools/call.
    ToolsCall,
    /// Invalid or malformed JSON-RPC request.
    Invalid,
    /// Unsupported JSON-RPC method.
    Other,
}

impl RpcMethod {
    /// Returns a stable label for the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::Invalid => "invalid",
            Self::Other => "other",
        }
    }

    /// Classifies a JSON-RPC method name.
    #[must_use]
    pub fn classify(method: &str) -> Self {
        match method {
            "initialize" => Self::Initialize,
            "tools/list" => Self::ToolsList,
            "tools/call" => Self::ToolsCall,
            _ => Self::Other,
        }
    }
}

/// Request outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// Successful request.
    Ok,
    /// Failed request.
    Error,
}

impl CallOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Metric event for one JSON-RPC request.
#[derive(Debug, Clone)]
pub struct RequestMetricEvent {
    /// Transport used for the request.
    pub transport: ServerTransport,
    /// JSON-RPC method classification.
    pub method: RpcMethod,
    /// Request outcome.
    pub outcome: CallOutcome,
    /// JSON-RPC error code when present.
    pub rpc_error_code: Option<i64>,
    /// Request body size in bytes.
    pub request_bytes: usize,
}

/// Metric event for one tool call.
#[derive(Debug, Clone)]
pub struct ToolMetricEvent {
    /// Tool name label.
    pub tool: String,
    /// Call outcome.
    pub outcome: CallOutcome,
    /// Envelope error code on failure.
    pub error_code: Option<ErrorCode>,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for requests, tool calls, and latencies.
pub trait GatewayMetrics: Send + Sync {
    /// Records a JSON-RPC request counter event.
    fn record_request(&self, event: RequestMetricEvent);
    /// Records a tool call with its latency.
    fn record_tool_call(&self, event: ToolMetricEvent, latency: Duration);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl GatewayMetrics for NoopMetrics {
    fn record_request(&self, _event: RequestMetricEvent) {}

    fn record_tool_call(&self, _event: ToolMetricEvent, _latency: Duration) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the upper bound of the histogram bucket a latency falls into.
///
/// Latencies beyond the last bucket report `None`.
#[must_use]
pub fn latency_bucket(latency: Duration) -> Option<u64> {
    let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
    GATEWAY_LATENCY_BUCKETS_MS.iter().copied().find(|bound| millis <= *bound)
}

/// Converts a duration to whole milliseconds, saturating.
#[must_use]
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
