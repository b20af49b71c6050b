// crates/ngd-gateway-mcp/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared upstream stubs and router builders for gateway tests.
// Purpose: Provide reusable test infrastructure for deterministic testing.
// Dependencies: ngd-gateway-mcp, tiny_http
// ============================================================================

//! ## Overview
//! Two upstream doubles: [`FakeUpstream`], an in-memory `UpstreamApi` that
//! counts calls per endpoint, and [`StubServer`], a `tiny_http` server that
//! exercises the real `reqwest` client.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use ngd_gateway_mcp::CatalogCache;
use ngd_gateway_mcp::DefaultToolAuthz;
use ngd_gateway_mcp::EndpointKind;
use ngd_gateway_mcp::NoopAuditSink;
use ngd_gateway_mcp::NoopMetrics;
use ngd_gateway_mcp::RateLimiter;
use ngd_gateway_mcp::ToolRouter;
use ngd_gateway_mcp::ToolRouterConfig;
use ngd_gateway_mcp::UpstreamApi;
use ngd_gateway_mcp::UpstreamError;
use ngd_gateway_mcp::UpstreamParams;
use ngd_gateway_mcp::WorkflowGate;
use ngd_gateway_mcp::auth::ToolAuthz;
use ngd_gateway_mcp::config::UpstreamConfig;
use ngd_gateway_mcp::sanitize::Redactor;
use serde_json::Value;
use serde_json::json;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;
use tokio::sync::Semaphore;

// ============================================================================
// SECTION: In-Memory Upstream
// ============================================================================

/// Collection ids served by [`FakeUpstream`].
pub const COLLECTIONS: &[&str] =
    &["bld-fts-buildingpart-1", "bld-fts-buildingpart-2", "lus-fts-site-1", "trn-ntwk-street-1"];

/// In-memory upstream that counts calls per endpoint.
#[derive(Default)]
pub struct FakeUpstream {
    calls: Mutex<BTreeMap<EndpointKind, usize>>,
    delay: Duration,
    queryables_gate: Option<Arc<Semaphore>>,
}

impl FakeUpstream {
    /// Builds a fake that answers immediately.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Builds a fake that waits `delay` before answering.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(BTreeMap::new()),
            delay,
            queryables_gate: None,
        })
    }

    /// Builds a fake whose queryables answers each wait for a permit on `gate`.
    pub fn with_queryables_gate(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(BTreeMap::new()),
            delay: Duration::ZERO,
            queryables_gate: Some(gate),
        })
    }

    /// Returns how many times `endpoint` was invoked.
    pub fn calls(&self, endpoint: EndpointKind) -> usize {
        self.calls.lock().unwrap().get(&endpoint).copied().unwrap_or(0)
    }

    /// Returns the total number of upstream invocations.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl UpstreamApi for FakeUpstream {
    async fn invoke(
        &self,
        endpoint: EndpointKind,
        params: &UpstreamParams,
    ) -> Result<Value, UpstreamError> {
        *self.calls.lock().unwrap().entry(endpoint).or_insert(0) += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if endpoint == EndpointKind::CollectionQueryables
            && let Some(gate) = &self.queryables_gate
        {
            gate.acquire().await.unwrap().forget();
        }
        Ok(match endpoint {
            EndpointKind::Collections => json!({
                "collections": COLLECTIONS
                    .iter()
                    .map(|id| json!({"id": id, "title": id.to_uppercase()}))
                    .collect::<Vec<_>>()
            }),
            EndpointKind::OpenApiSpec => json!({
                "openapi": "3.0.3",
                "paths": {"/collections": {}, "/collections/{collectionId}/items": {}}
            }),
            EndpointKind::CollectionQueryables => json!({
                "type": "object",
                "properties": {
                    "description": {"type": "string", "enum": ["Building", "Structure"]},
                    "height_m": {"type": "number"}
                }
            }),
            _ => json!({"type": "FeatureCollection", "features": [], "path": params.path}),
        })
    }

    fn has_credential(&self) -> bool {
        true
    }
}

// ============================================================================
// SECTION: Router Builders
// ============================================================================

/// Builds a local-only router over `upstream` with a per-client limit.
pub fn router(upstream: Arc<dyn UpstreamApi>, max_requests: u32) -> ToolRouter {
    router_with_authz(upstream, max_requests, Arc::new(DefaultToolAuthz::local_only()))
}

/// Builds a router with an explicit auth policy.
pub fn router_with_authz(
    upstream: Arc<dyn UpstreamApi>,
    max_requests: u32,
    authz: Arc<dyn ToolAuthz>,
) -> ToolRouter {
    build_router(upstream, max_requests, authz, Duration::from_secs(3_600))
}

/// Builds a local-only router whose catalog entries expire after `ttl`.
pub fn router_with_catalog_ttl(upstream: Arc<dyn UpstreamApi>, ttl: Duration) -> ToolRouter {
    build_router(upstream, 100, Arc::new(DefaultToolAuthz::local_only()), ttl)
}

fn build_router(
    upstream: Arc<dyn UpstreamApi>,
    max_requests: u32,
    authz: Arc<dyn ToolAuthz>,
    catalog_ttl: Duration,
) -> ToolRouter {
    ToolRouter::new(ToolRouterConfig {
        upstream: Arc::clone(&upstream),
        catalog: Arc::new(CatalogCache::new(upstream, catalog_ttl)),
        limiter: Arc::new(RateLimiter::new(Duration::from_secs(60), max_requests)),
        gate: Arc::new(WorkflowGate::new()),
        authz,
        audit: Arc::new(NoopAuditSink),
        metrics: Arc::new(NoopMetrics),
        redactor: Redactor::default(),
    })
}

// ============================================================================
// SECTION: HTTP Stub
// ============================================================================

/// One request observed by [`StubServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request path and query.
    pub url: String,
    /// Value of the `key` header, if present.
    pub key_header: Option<String>,
}

/// Canned response returned by [`StubServer`].
pub struct StubResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON body.
    pub body: String,
}

impl StubResponse {
    /// Builds a JSON response.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

/// Responder callback: receives the request and its zero-based index.
type Responder = dyn Fn(&RecordedRequest, usize) -> StubResponse + Send + Sync;

/// `tiny_http` upstream stub that records requests until dropped.
pub struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StubServer {
    /// Starts a stub answering every request with `responder`.
    pub fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest, usize) -> StubResponse + Send + Sync + 'static,
    {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let responder: Box<Responder> = Box::new(responder);
        let handle = {
            let requests = Arc::clone(&requests);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let Ok(Some(request)) = server.recv_timeout(Duration::from_millis(20)) else {
                        continue;
                    };
                    let recorded = RecordedRequest {
                        url: request.url().to_string(),
                        key_header: request
                            .headers()
                            .iter()
                            .find(|header| header.field.equiv("key"))
                            .map(|header| header.value.as_str().to_string()),
                    };
                    let index = {
                        let mut log = requests.lock().unwrap();
                        log.push(recorded.clone());
                        log.len() - 1
                    };
                    let reply = responder(&recorded, index);
                    let content_type =
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
                    let response = Response::from_string(reply.body)
                        .with_status_code(reply.status)
                        .with_header(content_type);
                    let _ = request.respond(response);
                }
            })
        };
        Self {
            base_url: format!("http://{addr}"),
            requests,
            stop,
            handle: Some(handle),
        }
    }

    /// Returns the stub's base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns every request seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Returns an upstream config pointed at this stub with fast backoff.
    pub fn upstream_config(&self, api_key: Option<&str>) -> UpstreamConfig {
        UpstreamConfig {
            features_base_url: format!("{}/features/ngd/ofa/v1", self.base_url),
            links_base_url: format!("{}/search/links/v1", self.base_url),
            api_key: api_key.map(ngd_gateway_mcp::config::SecretString::new),
            max_retries: 2,
            backoff_base_ms: 1,
            max_backoff_ms: 5,
            connect_timeout_ms: 1_000,
            request_timeout_ms: 5_000,
            allow_http: true,
            ..UpstreamConfig::default()
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
