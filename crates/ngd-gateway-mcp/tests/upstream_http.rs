// crates/ngd-gateway-mcp/tests/upstream_http.rs
// ============================================================================
// Module: Upstream HTTP Client Tests
// Description: Drives the reqwest-backed client against a tiny_http stub.
// Purpose: Validate retry policy, status mapping, credential handling, and redaction.
// Dependencies: ngd-gateway-mcp, tiny_http, tokio
// ============================================================================

//! ## Overview
//! Every test starts a fresh local stub so request counts are exact.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use ngd_gateway_mcp::EndpointKind;
use ngd_gateway_mcp::ErrorCode;
use ngd_gateway_mcp::HttpUpstreamClient;
use ngd_gateway_mcp::NoopAuditSink;
use ngd_gateway_mcp::UpstreamApi;
use ngd_gateway_mcp::UpstreamError;
use ngd_gateway_mcp::UpstreamParams;
use ngd_gateway_mcp::config::CredentialPlacement;
use ngd_gateway_mcp::config::UpstreamConfig;
use ngd_gateway_mcp::params::ParamValue;
use serde_json::json;

use crate::common::StubResponse;
use crate::common::StubServer;

const API_KEY: &str = "test-key-0123456789";

fn client(config: &UpstreamConfig) -> HttpUpstreamClient {
    HttpUpstreamClient::from_config(config, Arc::new(NoopAuditSink)).unwrap()
}

fn collection(id: &str) -> UpstreamParams {
    UpstreamParams::new().with_segment(id)
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

#[tokio::test]
async fn service_unavailable_is_retried_exactly_max_retries_times() {
    let stub = StubServer::start(|_, _| StubResponse::json(503, &json!({"message": "busy"})));
    let config = stub.upstream_config(Some(API_KEY));
    let err = client(&config).invoke(EndpointKind::Collections, &UpstreamParams::new()).await;
    let err = err.unwrap_err();
    assert_eq!(err.code(), ErrorCode::UpstreamError);
    assert!(err.to_string().contains("3 attempt(s)"));
    assert_eq!(stub.requests().len(), 1 + config.max_retries as usize);
}

#[tokio::test]
async fn bad_request_is_never_retried() {
    let stub = StubServer::start(|_, _| {
        StubResponse::json(400, &json!({"code": 400, "description": "Invalid filter syntax"}))
    });
    let config = stub.upstream_config(Some(API_KEY));
    let params = collection("bld-fts-buildingpart-1")
        .with_param("filter", ParamValue::Text("description = 'x'".to_string()));
    let err = client(&config).invoke(EndpointKind::CollectionFeatures, &params).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);
    assert!(err.to_string().contains("Invalid filter syntax"));
    assert_eq!(stub.requests().len(), 1);
}

#[tokio::test]
async fn too_many_requests_is_retried_until_success() {
    let stub = StubServer::start(|_, index| {
        if index == 0 {
            StubResponse::json(429, &json!({"message": "slow down"}))
        } else {
            StubResponse::json(200, &json!({"collections": []}))
        }
    });
    let config = stub.upstream_config(Some(API_KEY));
    let value = client(&config).invoke(EndpointKind::Collections, &UpstreamParams::new()).await;
    assert_eq!(value.unwrap(), json!({"collections": []}));
    assert_eq!(stub.requests().len(), 2);
}

#[tokio::test]
async fn connection_failures_surface_as_upstream_errors() {
    let config = {
        let stub = StubServer::start(|_, _| StubResponse::json(200, &json!({})));
        stub.upstream_config(Some(API_KEY))
    };
    let err = client(&config)
        .invoke(EndpointKind::Collections, &UpstreamParams::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UpstreamError);
    assert!(!err.to_string().contains(API_KEY));
}

// ============================================================================
// SECTION: Status Mapping
// ============================================================================

#[tokio::test]
async fn final_statuses_map_onto_the_taxonomy() {
    let cases = [
        (401, EndpointKind::Collections, ErrorCode::AuthError),
        (403, EndpointKind::Collections, ErrorCode::Forbidden),
        (404, EndpointKind::CollectionQueryables, ErrorCode::InvalidCollection),
        (404, EndpointKind::CollectionFeatureById, ErrorCode::InvalidInput),
    ];
    for (status, endpoint, expected) in cases {
        let stub = StubServer::start(move |_, _| StubResponse::json(status, &json!({})));
        let config = stub.upstream_config(Some(API_KEY));
        let params = match endpoint {
            EndpointKind::Collections => UpstreamParams::new(),
            EndpointKind::CollectionFeatureById => collection("trn-ntwk-street-1").with_segment("f-1"),
            _ => collection("trn-ntwk-street-1"),
        };
        let err = client(&config).invoke(endpoint, &params).await.unwrap_err();
        assert_eq!(err.code(), expected, "status {status} on {endpoint}");
        assert_eq!(stub.requests().len(), 1);
    }
}

#[tokio::test]
async fn malformed_success_body_is_an_upstream_error() {
    let stub = StubServer::start(|_, _| StubResponse {
        status: 200,
        body: "<html>not json</html>".to_string(),
    });
    let config = stub.upstream_config(Some(API_KEY));
    let err = client(&config)
        .invoke(EndpointKind::Collections, &UpstreamParams::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Upstream(_)));
}

#[tokio::test]
async fn oversized_response_is_rejected() {
    let stub = StubServer::start(|_, _| {
        StubResponse::json(200, &json!({"collections": [], "pad": "x".repeat(4_096)}))
    });
    let mut config = stub.upstream_config(Some(API_KEY));
    config.max_response_bytes = 1_024;
    let err = client(&config)
        .invoke(EndpointKind::Collections, &UpstreamParams::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("size limit"));
}

// ============================================================================
// SECTION: Credential Handling
// ============================================================================

#[tokio::test]
async fn missing_credential_fails_without_a_request() {
    let stub = StubServer::start(|_, _| StubResponse::json(200, &json!({})));
    let config = stub.upstream_config(None);
    let upstream = client(&config);
    assert!(!upstream.has_credential());
    let err = upstream.invoke(EndpointKind::Collections, &UpstreamParams::new()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthError);
    assert!(stub.requests().is_empty());
}

#[tokio::test]
async fn credential_is_sent_as_query_or_header() {
    let stub = StubServer::start(|_, _| StubResponse::json(200, &json!({"collections": []})));
    let mut config = stub.upstream_config(Some(API_KEY));
    client(&config).invoke(EndpointKind::Collections, &UpstreamParams::new()).await.unwrap();
    config.credential_placement = CredentialPlacement::Header;
    client(&config).invoke(EndpointKind::Collections, &UpstreamParams::new()).await.unwrap();

    let requests = stub.requests();
    assert_eq!(requests[0].url, format!("/features/ngd/ofa/v1/collections?key={API_KEY}"));
    assert_eq!(requests[0].key_header, None);
    assert_eq!(requests[1].url, "/features/ngd/ofa/v1/collections");
    assert_eq!(requests[1].key_header.as_deref(), Some(API_KEY));
}

#[tokio::test]
async fn echoed_credential_never_reaches_the_caller() {
    let stub = StubServer::start(|request, _| {
        StubResponse::json(
            200,
            &json!({
                "type": "FeatureCollection",
                "echo": API_KEY,
                "links": [{"href": format!("https://api.os.uk{}", request.url)}],
                "note": format!("issued for {API_KEY} today")
            }),
        )
    });
    let config = stub.upstream_config(Some(API_KEY));
    let value = client(&config)
        .invoke(EndpointKind::CollectionFeatures, &collection("bld-fts-buildingpart-1"))
        .await
        .unwrap();
    let text = value.to_string();
    assert!(!text.contains(API_KEY), "credential leaked: {text}");
    assert_eq!(value["type"], "FeatureCollection");
}

#[tokio::test]
async fn credential_in_error_detail_is_redacted() {
    let stub = StubServer::start(|_, _| {
        StubResponse::json(401, &json!({"error": {"message": format!("key {API_KEY} is revoked")}}))
    });
    let config = stub.upstream_config(Some(API_KEY));
    let err = client(&config)
        .invoke(EndpointKind::Collections, &UpstreamParams::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthError);
    assert!(!err.to_string().contains(API_KEY));
    assert!(err.to_string().contains("revoked"));
}

// ============================================================================
// SECTION: Path Building
// ============================================================================

#[tokio::test]
async fn linked_identifiers_use_the_links_service() {
    let stub = StubServer::start(|_, _| StubResponse::json(200, &json!({"correlations": []})));
    let mut config = stub.upstream_config(Some(API_KEY));
    config.credential_placement = CredentialPlacement::Header;
    let params = UpstreamParams::new().with_segment("TOID").with_segment("osgb1000005132451");
    client(&config).invoke(EndpointKind::LinkedIdentifiers, &params).await.unwrap();
    assert_eq!(
        stub.requests()[0].url,
        "/search/links/v1/identifierTypes/TOID/osgb1000005132451"
    );
}
