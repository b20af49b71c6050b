// crates/ngd-gateway-mcp/src/server.rs
// ============================================================================
// Module: Gateway Server
// Description: JSON-RPC server for the stdio and HTTP transports.
// Purpose: Expose the NGD gateway tools via JSON-RPC 2.0.
// Dependencies: axum, tokio, serde, serde_json
// ============================================================================

//! ## Overview
//! The gateway server exposes tools using JSON-RPC 2.0 over stdio
//! (Content-Length framing) or HTTP (`POST /rpc`). Every call goes through
//! [`crate::tools::ToolRouter`]. Tool failures are returned as tool results
//! with `isError` set and the error envelope as content; JSON-RPC errors are
//! reserved for protocol faults.
//!
//! ## Invariants
//! - Each stdio frame is handled on its own task; one writer task owns stdout.
//! - Request bodies larger than `server.max_body_bytes` are never parsed.
//! - Notifications (requests without an id) never produce a response.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::audit::AuditSink;
use crate::audit::FileAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::StderrAuditSink;
use crate::auth::DefaultToolAuthz;
use crate::auth::RequestContext;
use crate::catalog::CatalogCache;
use crate::config::AuditConfig;
use crate::config::GatewayConfig;
use crate::config::ServerAuthMode;
use crate::config::ServerTransport;
use crate::identity::SESSION_HEADER;
use crate::rate_limit::RateLimiter;
use crate::telemetry::CallOutcome;
use crate::telemetry::GatewayMetrics;
use crate::telemetry::NoopMetrics;
use crate::telemetry::RequestMetricEvent;
use crate::telemetry::RpcMethod;
use crate::tools::ToolDefinition;
use crate::tools::ToolError;
use crate::tools::ToolRouter;
use crate::tools::ToolRouterConfig;
use crate::upstream::HttpUpstreamClient;
use crate::upstream::UpstreamApi;
use crate::workflow::WorkflowGate;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// MCP protocol revision advertised by `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
/// Server name advertised by `initialize`.
const SERVER_NAME: &str = "ngd-gateway";
/// Maximum length of one stdio header line.
const MAX_HEADER_LINE_BYTES: u64 = 1_024;
/// Responses queued for the stdio writer before frame handlers wait.
const STDIO_QUEUE_DEPTH: usize = 64;

/// JSON-RPC error codes used by the gateway.
mod rpc_code {
    /// Malformed JSON.
    pub const PARSE_ERROR: i64 = -32_700;
    /// Structurally invalid request.
    pub const INVALID_REQUEST: i64 = -32_600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i64 = -32_601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32_602;
    /// Caller failed authentication.
    pub const UNAUTHENTICATED: i64 = -32_001;
    /// Internal failure.
    pub const INTERNAL: i64 = -32_050;
    /// Response serialization failed.
    pub const SERIALIZATION: i64 = -32_060;
    /// Request body exceeded the configured limit.
    pub const BODY_TOO_LARGE: i64 = -32_070;
}

// ============================================================================
// SECTION: Gateway Server
// ============================================================================

/// Gateway server instance.
pub struct GatewayServer {
    /// Server configuration.
    config: GatewayConfig,
    /// Tool router for request dispatch.
    router: ToolRouter,
}

impl GatewayServer {
    /// Builds a server from validated configuration with no metrics exporter.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration or initialization fails.
    pub fn from_config(config: GatewayConfig) -> Result<Self, ServerError> {
        Self::with_metrics(config, Arc::new(NoopMetrics))
    }

    /// Builds a server that reports to the given metrics sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration or initialization fails.
    pub fn with_metrics(
        config: GatewayConfig,
        metrics: Arc<dyn GatewayMetrics>,
    ) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let audit = build_audit_sink(&config.audit)?;
        let client = HttpUpstreamClient::from_config(&config.upstream, Arc::clone(&audit))
            .map_err(|err| ServerError::Init(err.to_string()))?;
        let redactor = client.redactor().clone();
        let upstream: Arc<dyn UpstreamApi> = Arc::new(client);
        let catalog = Arc::new(CatalogCache::from_config(Arc::clone(&upstream), &config.catalog));
        let router = ToolRouter::new(ToolRouterConfig {
            upstream,
            catalog,
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            gate: Arc::new(WorkflowGate::from_config(&config.server)),
            authz: Arc::new(DefaultToolAuthz::from_config(&config.server.auth)),
            audit,
            metrics,
            redactor,
        });
        emit_local_only_warning(&config);
        Ok(Self {
            config,
            router,
        })
    }

    /// Returns the tool router.
    #[must_use]
    pub const fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Serves requests using the configured transport until the transport closes.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the transport fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let max_body_bytes = self.config.server.max_body_bytes;
        match self.config.server.transport {
            ServerTransport::Stdio => {
                serve_stdio(self.router, tokio::io::stdin(), tokio::io::stdout(), max_body_bytes)
                    .await
            }
            ServerTransport::Http => serve_http(&self.config, self.router).await,
        }
    }
}

/// Builds the audit sink selected by configuration.
fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, ServerError> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match config.path.as_deref() {
        Some(path) => {
            let sink = FileAuditSink::new(std::path::Path::new(path.trim()))
                .map_err(|err| ServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

/// Warns when HTTP runs without explicit caller authentication.
fn emit_local_only_warning(config: &GatewayConfig) {
    if config.server.transport == ServerTransport::Http
        && config.server.auth.mode == ServerAuthMode::LocalOnly
    {
        let _ = writeln!(
            std::io::stderr(),
            "ngd-gateway: WARNING: http transport running in local-only mode; configure \
             server.auth.mode = \"bearer_token\" for remote callers"
        );
    }
}

// ============================================================================
// SECTION: Stdio Transport
// ============================================================================

/// One stdio frame.
enum Frame {
    /// Payload within the body limit.
    Payload(Vec<u8>),
    /// Payload that exceeded the body limit and was discarded.
    Oversized,
}

/// Serves framed JSON-RPC requests from `reader`, writing responses to `writer`.
///
/// Returns once the reader reaches end of input and in-flight calls finish.
///
/// # Errors
///
/// Returns [`ServerError::Transport`] on malformed framing or I/O failure.
pub async fn serve_stdio<R, W>(
    router: ToolRouter,
    reader: R,
    writer: W,
    max_body_bytes: usize,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let (tx, rx) = mpsc::channel::<Vec<u8>>(STDIO_QUEUE_DEPTH);
    let writer_task = tokio::spawn(write_loop(writer, rx));
    let mut in_flight = JoinSet::new();
    let result = loop {
        let frame = match read_framed(&mut reader, max_body_bytes).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        };
        let router = router.clone();
        let tx = tx.clone();
        in_flight.spawn(async move {
            if let Some(response) = handle_frame(&router, frame, max_body_bytes).await {
                let payload = serde_json::to_vec(&response)
                    .unwrap_or_else(|_| serialization_failure().into_bytes());
                let _ = tx.send(payload).await;
            }
        });
        while in_flight.try_join_next().is_some() {}
    };
    while in_flight.join_next().await.is_some() {}
    drop(tx);
    writer_task
        .await
        .map_err(|_| ServerError::Transport("stdio writer task failed".to_string()))??;
    result
}

/// Handles one stdio frame.
async fn handle_frame(
    router: &ToolRouter,
    frame: Frame,
    max_body_bytes: usize,
) -> Option<JsonRpcResponse> {
    let context = RequestContext::stdio();
    match frame {
        Frame::Payload(bytes) => {
            dispatch_payload(router, &context, &bytes, max_body_bytes).await.response
        }
        Frame::Oversized => {
            record_request(router, &context, RpcMethod::Invalid, Some(rpc_code::BODY_TOO_LARGE), 0);
            Some(JsonRpcResponse::error(
                Value::Null,
                rpc_code::BODY_TOO_LARGE,
                "request body too large",
            ))
        }
    }
}

/// Writes queued responses in order.
async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Vec<u8>>) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(payload) = rx.recv().await {
        write_framed(&mut writer, &payload).await?;
    }
    Ok(())
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Shared server state for HTTP handlers.
struct ServerState {
    /// Tool router for request dispatch.
    router: ToolRouter,
    /// Maximum allowed request body size.
    max_body_bytes: usize,
}

/// Builds the HTTP application: `POST /rpc` for JSON-RPC, `DELETE /rpc` to
/// end the session named by the session header.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`.
#[must_use]
pub fn http_app(router: ToolRouter, max_body_bytes: usize) -> Router {
    let state = Arc::new(ServerState {
        router,
        max_body_bytes,
    });
    Router::new()
        .route("/rpc", post(handle_http).delete(handle_end_session))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Serves JSON-RPC requests over HTTP.
async fn serve_http(config: &GatewayConfig, router: ToolRouter) -> Result<(), ServerError> {
    let bind = config
        .server
        .bind
        .as_deref()
        .ok_or_else(|| ServerError::Config("bind address required".to_string()))?;
    let addr: SocketAddr =
        bind.trim().parse().map_err(|_| ServerError::Config("invalid bind address".to_string()))?;
    let app = http_app(router, config.server.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ServerError::Transport(format!("http bind failed: {err}")))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
}

/// Handles HTTP JSON-RPC requests.
async fn handle_http(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let context = http_request_context(peer, &headers);
    let reply = dispatch_payload(&state.router, &context, &bytes, state.max_body_bytes).await;
    match reply.response {
        Some(response) => (reply.status, axum::Json(response)).into_response(),
        None => reply.status.into_response(),
    }
}

/// Ends the session named by the session header.
async fn handle_end_session(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> StatusCode {
    let context = http_request_context(peer, &headers);
    if context.session_header.is_none() {
        return StatusCode::BAD_REQUEST;
    }
    match state.router.end_session(&context) {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(ToolError::Auth(_)) => StatusCode::UNAUTHORIZED,
        Err(_) => StatusCode::BAD_REQUEST,
    }
}

/// Builds a request context from HTTP headers.
fn http_request_context(peer: SocketAddr, headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| {
        headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
    };
    RequestContext::http(Some(peer.ip()), header(AUTHORIZATION.as_str()), header(SESSION_HEADER))
}

// ============================================================================
// SECTION: JSON-RPC Handling
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier; absent for notifications.
    #[serde(default)]
    id: Option<Value>,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    const fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Returns the error code, if any.
    fn error_code(&self) -> Option<i64> {
        self.error.as_ref().map(|error| error.code)
    }
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Human-readable error message.
    message: String,
}

/// Tool call parameters for JSON-RPC requests.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    arguments: Value,
}

/// Tool list response payload.
#[derive(Debug, Serialize)]
struct ToolListResult {
    /// Registered tool definitions.
    tools: Vec<ToolDefinition>,
}

/// Tool call response payload.
#[derive(Debug, Serialize)]
struct ToolCallResult {
    /// Tool output content.
    content: Vec<ToolContent>,
    /// True when the content is an error envelope.
    #[serde(rename = "isError")]
    is_error: bool,
}

/// Tool output payloads for JSON-RPC responses.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolContent {
    /// Serialized JSON tool output.
    Text {
        /// JSON text.
        text: String,
    },
}

/// Outcome of one JSON-RPC payload.
struct RpcReply {
    /// HTTP status for the HTTP transport.
    status: StatusCode,
    /// Response body; `None` for notifications.
    response: Option<JsonRpcResponse>,
}

/// Parses, dispatches, and records one JSON-RPC payload.
async fn dispatch_payload(
    router: &ToolRouter,
    context: &RequestContext,
    bytes: &[u8],
    max_body_bytes: usize,
) -> RpcReply {
    let (method, reply) = parse_and_handle(router, context, bytes, max_body_bytes).await;
    let error_code = reply.response.as_ref().and_then(JsonRpcResponse::error_code);
    record_request(router, context, method, error_code, bytes.len());
    reply
}

/// Parses a payload and dispatches it to the router.
async fn parse_and_handle(
    router: &ToolRouter,
    context: &RequestContext,
    bytes: &[u8],
    max_body_bytes: usize,
) -> (RpcMethod, RpcReply) {
    if bytes.len() > max_body_bytes {
        return (
            RpcMethod::Invalid,
            protocol_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                Value::Null,
                rpc_code::BODY_TOO_LARGE,
                "request body too large",
            ),
        );
    }
    let Ok(raw) = serde_json::from_slice::<Value>(bytes) else {
        return (
            RpcMethod::Invalid,
            protocol_error(StatusCode::BAD_REQUEST, Value::Null, rpc_code::PARSE_ERROR, "parse error"),
        );
    };
    let Ok(request) = serde_json::from_value::<JsonRpcRequest>(raw) else {
        return (
            RpcMethod::Invalid,
            protocol_error(
                StatusCode::BAD_REQUEST,
                Value::Null,
                rpc_code::INVALID_REQUEST,
                "invalid json-rpc request",
            ),
        );
    };
    let method = RpcMethod::classify(&request.method);
    (method, handle_request(router, context, request).await)
}

/// Dispatches a parsed JSON-RPC request.
async fn handle_request(
    router: &ToolRouter,
    base_context: &RequestContext,
    request: JsonRpcRequest,
) -> RpcReply {
    let Some(id) = request.id else {
        return RpcReply {
            status: StatusCode::ACCEPTED,
            response: None,
        };
    };
    if request.jsonrpc != "2.0" {
        return protocol_error(
            StatusCode::BAD_REQUEST,
            id,
            rpc_code::INVALID_REQUEST,
            "invalid json-rpc version",
        );
    }
    let context = base_context.clone().with_request_id(id.to_string());
    match request.method.as_str() {
        "initialize" => success(id, initialize_result()),
        "ping" => success(id, json!({})),
        "tools/list" => match router.list_tools(&context) {
            Ok(tools) => match serde_json::to_value(ToolListResult {
                tools,
            }) {
                Ok(value) => success(id, value),
                Err(_) => protocol_error(
                    StatusCode::OK,
                    id,
                    rpc_code::SERIALIZATION,
                    "serialization failed",
                ),
            },
            Err(err) => jsonrpc_error(id, &err),
        },
        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            let Ok(call) = serde_json::from_value::<ToolCallParams>(params) else {
                return protocol_error(
                    StatusCode::BAD_REQUEST,
                    id,
                    rpc_code::INVALID_PARAMS,
                    "invalid tool params",
                );
            };
            let outcome = router.handle_tool_call(&context, &call.name, call.arguments).await;
            let is_error = outcome.is_error();
            let Ok(text) = serde_json::to_string(&outcome.into_value()) else {
                return protocol_error(
                    StatusCode::OK,
                    id,
                    rpc_code::SERIALIZATION,
                    "serialization failed",
                );
            };
            match serde_json::to_value(ToolCallResult {
                content: vec![ToolContent::Text {
                    text,
                }],
                is_error,
            }) {
                Ok(value) => success(id, value),
                Err(_) => protocol_error(
                    StatusCode::OK,
                    id,
                    rpc_code::SERIALIZATION,
                    "serialization failed",
                ),
            }
        }
        _ => protocol_error(
            StatusCode::BAD_REQUEST,
            id,
            rpc_code::METHOD_NOT_FOUND,
            "method not found",
        ),
    }
}

/// Returns the `initialize` result payload.
fn initialize_result() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
        "instructions": "Call get_workflow_context first, then fetch_detailed_collections, then search_features."
    })
}

/// Builds a success reply.
const fn success(id: Value, result: Value) -> RpcReply {
    RpcReply {
        status: StatusCode::OK,
        response: Some(JsonRpcResponse::result(id, result)),
    }
}

/// Builds a protocol error reply.
fn protocol_error(status: StatusCode, id: Value, code: i64, message: &str) -> RpcReply {
    RpcReply {
        status,
        response: Some(JsonRpcResponse::error(id, code, message)),
    }
}

/// Builds a JSON-RPC error reply for a router failure outside tool calls.
fn jsonrpc_error(id: Value, error: &ToolError) -> RpcReply {
    match error {
        ToolError::Auth(_) => protocol_error(
            StatusCode::UNAUTHORIZED,
            id,
            rpc_code::UNAUTHENTICATED,
            "unauthenticated",
        ),
        ToolError::InvalidParams(_) | ToolError::InvalidSession(_) => {
            protocol_error(StatusCode::BAD_REQUEST, id, rpc_code::INVALID_PARAMS, &error.to_string())
        }
        _ => protocol_error(StatusCode::OK, id, rpc_code::INTERNAL, "internal error"),
    }
}

/// Fallback payload when a response cannot be serialized.
fn serialization_failure() -> String {
    json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": { "code": rpc_code::SERIALIZATION, "message": "serialization failed" }
    })
    .to_string()
}

/// Records a request metric event.
fn record_request(
    router: &ToolRouter,
    context: &RequestContext,
    method: RpcMethod,
    rpc_error_code: Option<i64>,
    request_bytes: usize,
) {
    router.metrics().record_request(RequestMetricEvent {
        transport: context.transport,
        method,
        outcome: if rpc_error_code.is_some() { CallOutcome::Error } else { CallOutcome::Ok },
        rpc_error_code,
        request_bytes,
    });
}

// ============================================================================
// SECTION: Framing Helpers
// ============================================================================

/// Reads one framed stdio payload using MCP Content-Length headers.
///
/// Returns `Ok(None)` on end of input between frames. Oversized bodies are
/// consumed and reported as [`Frame::Oversized`] so the stream stays aligned.
async fn read_framed<R>(reader: &mut R, max_body_bytes: usize) -> Result<Option<Frame>, ServerError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut in_headers = false;
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = (&mut *reader)
            .take(MAX_HEADER_LINE_BYTES)
            .read_line(&mut line)
            .await
            .map_err(|_| ServerError::Transport("stdio read failed".to_string()))?;
        if bytes == 0 {
            if in_headers {
                return Err(ServerError::Transport("stdio closed mid-frame".to_string()));
            }
            return Ok(None);
        }
        if !line.ends_with('\n') && u64::try_from(bytes).unwrap_or(u64::MAX) >= MAX_HEADER_LINE_BYTES
        {
            return Err(ServerError::Transport("stdio header line too long".to_string()));
        }
        if line.trim().is_empty() {
            if in_headers {
                break;
            }
            continue;
        }
        in_headers = true;
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            let parsed = value
                .trim()
                .parse::<usize>()
                .map_err(|_| ServerError::Transport("invalid content length".to_string()))?;
            content_length = Some(parsed);
        }
    }
    let len = content_length
        .ok_or_else(|| ServerError::Transport("missing content length".to_string()))?;
    if len > max_body_bytes {
        let mut body = (&mut *reader).take(u64::try_from(len).unwrap_or(u64::MAX));
        tokio::io::copy(&mut body, &mut tokio::io::sink())
            .await
            .map_err(|_| ServerError::Transport("stdio read failed".to_string()))?;
        return Ok(Some(Frame::Oversized));
    }
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|_| ServerError::Transport("stdio read failed".to_string()))?;
    Ok(Some(Frame::Payload(buf)))
}

/// Writes one framed stdio payload using MCP Content-Length headers.
async fn write_framed<W>(writer: &mut W, payload: &[u8]) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    writer
        .write_all(header.as_bytes())
        .await
        .map_err(|_| ServerError::Transport("stdio write failed".to_string()))?;
    writer
        .write_all(payload)
        .await
        .map_err(|_| ServerError::Transport("stdio write failed".to_string()))?;
    writer.flush().await.map_err(|_| ServerError::Transport("stdio write failed".to_string()))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
