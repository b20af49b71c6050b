// crates/ngd-gateway-mcp/src/server/tests.rs
// ============================================================================
// Module: Gateway Server Unit Tests
// Description: Tests for stdio framing and JSON-RPC dispatch.
// Purpose: Validate protocol faults, notifications, and tool error results.
// Dependencies: ngd-gateway-mcp, tokio
// ============================================================================

//! ## Overview
//! Exercises the framing helpers directly and runs a full stdio session over
//! an in-memory duplex stream.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only framing assertions."
)]

use std::io::Cursor;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;

use super::Frame;
use super::parse_and_handle;
use super::read_framed;
use super::serve_stdio;
use crate::audit::NoopAuditSink;
use crate::auth::DefaultToolAuthz;
use crate::auth::RequestContext;
use crate::catalog::CatalogCache;
use crate::params::EndpointKind;
use crate::params::UpstreamParams;
use crate::rate_limit::RateLimiter;
use crate::sanitize::Redactor;
use crate::telemetry::GatewayMetrics;
use crate::telemetry::RequestMetricEvent;
use crate::telemetry::RpcMethod;
use crate::telemetry::ToolMetricEvent;
use crate::tools::ToolRouter;
use crate::tools::ToolRouterConfig;
use crate::upstream::UpstreamApi;
use crate::upstream::UpstreamError;
use crate::workflow::WorkflowGate;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

struct StaticUpstream;

#[async_trait]
impl UpstreamApi for StaticUpstream {
    async fn invoke(
        &self,
        _endpoint: EndpointKind,
        _params: &UpstreamParams,
    ) -> Result<Value, UpstreamError> {
        Ok(json!({"collections": [{"id": "trn-ntwk-street-1", "title": "Street"}]}))
    }

    fn has_credential(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct RecordingMetrics {
    requests: Mutex<Vec<RequestMetricEvent>>,
}

impl GatewayMetrics for RecordingMetrics {
    fn record_request(&self, event: RequestMetricEvent) {
        self.requests.lock().unwrap().push(event);
    }

    fn record_tool_call(&self, _event: ToolMetricEvent, _latency: Duration) {}
}

fn router_with(metrics: Arc<RecordingMetrics>) -> ToolRouter {
    let upstream: Arc<dyn UpstreamApi> = Arc::new(StaticUpstream);
    ToolRouter::new(ToolRouterConfig {
        upstream: Arc::clone(&upstream),
        catalog: Arc::new(CatalogCache::new(upstream, Duration::from_secs(60))),
        limiter: Arc::new(RateLimiter::new(Duration::from_secs(60), 100)),
        gate: Arc::new(WorkflowGate::new()),
        authz: Arc::new(DefaultToolAuthz::local_only()),
        audit: Arc::new(NoopAuditSink),
        metrics,
        redactor: Redactor::default(),
    })
}

fn router() -> ToolRouter {
    router_with(Arc::new(RecordingMetrics::default()))
}

fn frame(payload: &str) -> String {
    format!("Content-Length: {}\r\n\r\n{payload}", payload.len())
}

async fn rpc(router: &ToolRouter, payload: &str) -> (StatusCode, Option<Value>) {
    let (_, reply) =
        parse_and_handle(router, &RequestContext::stdio(), payload.as_bytes(), 4_096).await;
    (reply.status, reply.response.map(|response| serde_json::to_value(response).unwrap()))
}

/// Splits a stream of framed payloads into JSON values.
fn parse_frames(mut bytes: &[u8]) -> Vec<Value> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        let text = std::str::from_utf8(bytes).unwrap();
        let header_end = text.find("\r\n\r\n").unwrap();
        let len: usize =
            text[.. header_end].trim_start_matches("Content-Length: ").trim().parse().unwrap();
        let start = header_end + 4;
        frames.push(serde_json::from_slice(&bytes[start .. start + len]).unwrap());
        bytes = &bytes[start + len ..];
    }
    frames
}

// ============================================================================
// SECTION: Framing
// ============================================================================

#[tokio::test]
async fn read_framed_accepts_payload_at_limit() {
    let payload = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
    let mut reader = BufReader::new(Cursor::new(frame(payload).into_bytes()));
    let Some(Frame::Payload(bytes)) = read_framed(&mut reader, payload.len()).await.unwrap() else {
        panic!("expected payload frame");
    };
    assert_eq!(bytes, payload.as_bytes());
    assert!(read_framed(&mut reader, payload.len()).await.unwrap().is_none());
}

#[tokio::test]
async fn oversized_frame_is_skipped_and_stream_stays_aligned() {
    let big = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{"pad":"xxxxxxxx"}}"#;
    let small = r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#;
    let input = format!("{}{}", frame(big), frame(small));
    let mut reader = BufReader::new(Cursor::new(input.into_bytes()));
    let limit = small.len();
    assert!(matches!(read_framed(&mut reader, limit).await.unwrap(), Some(Frame::Oversized)));
    let Some(Frame::Payload(bytes)) = read_framed(&mut reader, limit).await.unwrap() else {
        panic!("expected payload frame");
    };
    assert_eq!(bytes, small.as_bytes());
}

#[tokio::test]
async fn read_framed_accepts_lowercase_header_names() {
    let payload = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
    let input = format!("content-length: {}\r\n\r\n{payload}", payload.len());
    let mut reader = BufReader::new(Cursor::new(input.into_bytes()));
    assert!(matches!(read_framed(&mut reader, 1_024).await.unwrap(), Some(Frame::Payload(_))));
}

#[tokio::test]
async fn read_framed_rejects_missing_length_and_truncated_headers() {
    let mut missing = BufReader::new(Cursor::new(b"Content-Type: json\r\n\r\n{}".to_vec()));
    assert!(read_framed(&mut missing, 1_024).await.is_err());
    let mut truncated = BufReader::new(Cursor::new(b"Content-Length: 10\r\n".to_vec()));
    assert!(read_framed(&mut truncated, 1_024).await.is_err());
}

// ============================================================================
// SECTION: JSON-RPC Dispatch
// ============================================================================

#[tokio::test]
async fn malformed_payloads_map_to_protocol_errors() {
    let router = router();
    let (status, response) = rpc(&router, "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response.unwrap()["error"]["code"], -32_700);

    let (_, response) = rpc(&router, r#"{"id":1}"#).await;
    assert_eq!(response.unwrap()["error"]["code"], -32_600);

    let (_, response) = rpc(&router, r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).await;
    assert_eq!(response.unwrap()["error"]["code"], -32_600);

    let (_, response) = rpc(&router, r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#).await;
    assert_eq!(response.unwrap()["error"]["code"], -32_601);

    let (_, response) =
        rpc(&router, r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"arguments":{}}}"#)
            .await;
    assert_eq!(response.unwrap()["error"]["code"], -32_602);
}

#[tokio::test]
async fn oversized_body_is_rejected_before_parsing() {
    let router = router();
    let payload = format!(r#"{{"jsonrpc":"2.0","id":1,"method":"ping","pad":"{}"}}"#, "x".repeat(5_000));
    let (status, response) = rpc(&router, &payload).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.unwrap()["error"]["code"], -32_070);
}

#[tokio::test]
async fn notifications_get_no_response() {
    let router = router();
    let (status, response) =
        rpc(&router, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(response.is_none());
}

#[tokio::test]
async fn initialize_advertises_tools_capability() {
    let router = router();
    let (status, response) =
        rpc(&router, r#"{"jsonrpc":"2.0","id":"init","method":"initialize","params":{}}"#).await;
    assert_eq!(status, StatusCode::OK);
    let response = response.unwrap();
    assert_eq!(response["id"], "init");
    assert_eq!(response["result"]["protocolVersion"], super::MCP_PROTOCOL_VERSION);
    assert!(response["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn tool_failures_are_results_with_is_error() {
    let router = router();
    let (status, response) = rpc(
        &router,
        r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"list_collections","arguments":{}}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let result = &response.unwrap()["result"];
    assert_eq!(result["isError"], true);
    let text = result["content"][0]["text"].as_str().unwrap();
    let envelope: Value = serde_json::from_str(text).unwrap();
    assert_eq!(envelope["error_code"], "WORKFLOW_CONTEXT_REQUIRED");
    assert_eq!(envelope["retry_guidance"]["tool"], "get_workflow_context");
}

#[tokio::test]
async fn tool_success_is_serialized_as_text_content() {
    let router = router();
    let (_, response) = rpc(
        &router,
        r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"check_api_key"}}"#,
    )
    .await;
    let result = &response.unwrap()["result"];
    assert_eq!(result["isError"], false);
    assert_eq!(result["content"][0]["type"], "text");
    let payload: Value = serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["api_key_configured"], false);
}

// ============================================================================
// SECTION: Stdio Session
// ============================================================================

#[tokio::test]
async fn stdio_session_answers_every_request_and_records_metrics() {
    let metrics = Arc::new(RecordingMetrics::default());
    let router = router_with(Arc::clone(&metrics));
    let (client, server) = tokio::io::duplex(1 << 20);
    let (server_read, server_write) = tokio::io::split(server);
    let session = tokio::spawn(serve_stdio(router, server_read, server_write, 64 * 1_024));

    let (mut client_read, mut client_write) = tokio::io::split(client);
    let requests = [
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"get_workflow_context","arguments":{}}}"#,
    ];
    for request in requests {
        client_write.write_all(frame(request).as_bytes()).await.unwrap();
    }
    client_write.shutdown().await.unwrap();

    let mut output = Vec::new();
    client_read.read_to_end(&mut output).await.unwrap();
    session.await.unwrap().unwrap();

    let mut responses = parse_frames(&output);
    responses.sort_by_key(|response| response["id"].as_i64().unwrap());
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "ngd-gateway");
    assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 12);
    assert_eq!(responses[2]["result"]["isError"], false);

    let methods: Vec<RpcMethod> =
        metrics.requests.lock().unwrap().iter().map(|event| event.method).collect();
    assert_eq!(methods.len(), 4);
    assert!(methods.contains(&RpcMethod::ToolsCall));
}
