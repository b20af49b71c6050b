// crates/ngd-gateway-mcp/src/params/tests.rs
// ============================================================================
// Module: Upstream Parameter Unit Tests
// Description: Tests for endpoint metadata and parameter validation.
// Purpose: Ensure malformed requests are rejected before any network call.
// Dependencies: ngd-gateway-mcp
// ============================================================================

//! ## Overview
//! Covers path arity, query allow-lists, bbox/limit/CRS bounds, and filter
//! balance checking.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions use unwrap for clarity."
)]

use super::EndpointKind;
use super::ParamValue;
use super::SUPPORTED_CRS;
use super::UpstreamBase;
use super::UpstreamParams;
use super::normalize_crs;
use super::validate_filter;
use super::validate_params;
use crate::upstream::UpstreamError;

fn features(collection: &str) -> UpstreamParams {
    UpstreamParams::new().with_segment(collection)
}

fn assert_invalid(result: Result<(), UpstreamError>, needle: &str) {
    match result {
        Err(UpstreamError::InvalidInput(message)) => {
            assert!(message.contains(needle), "message '{message}' missing '{needle}'");
        }
        other => panic!("expected invalid input containing '{needle}', got {other:?}"),
    }
}

#[test]
fn endpoint_names_round_trip_through_parse() {
    for kind in EndpointKind::ALL {
        assert_eq!(EndpointKind::parse(kind.as_str()).unwrap(), kind);
    }
    assert!(matches!(EndpointKind::parse("ADMIN"), Err(UpstreamError::InvalidInput(_))));
}

#[test]
fn linked_identifiers_target_links_service() {
    assert_eq!(EndpointKind::LinkedIdentifiers.base(), UpstreamBase::Links);
    assert_eq!(EndpointKind::CollectionFeatures.base(), UpstreamBase::Features);
}

#[test]
fn path_templates_expand_in_order() {
    let path = vec!["bld-fts-buildingpart-1".to_string(), "abc".to_string()];
    assert_eq!(
        EndpointKind::CollectionFeatureById.path_segments(&path),
        vec!["collections", "bld-fts-buildingpart-1", "items", "abc"]
    );
    assert_eq!(
        EndpointKind::LinkedIdentifiers.path_segments(&["TOID".to_string(), "osgb1".to_string()]),
        vec!["identifierTypes", "TOID", "osgb1"]
    );
    assert_eq!(EndpointKind::OpenApiSpec.path_segments(&[]), vec!["api"]);
}

#[test]
fn only_collection_scoped_endpoints_map_404_to_collection() {
    assert!(EndpointKind::CollectionFeatures.is_collection_scoped());
    assert!(EndpointKind::CollectionQueryables.is_collection_scoped());
    assert!(!EndpointKind::CollectionFeatureById.is_collection_scoped());
    assert!(!EndpointKind::LinkedIdentifiers.is_collection_scoped());
}

#[test]
fn path_arity_mismatch_is_rejected() {
    assert_invalid(
        validate_params(EndpointKind::CollectionFeatures, &UpstreamParams::new()),
        "expects 1 path parameter",
    );
    assert_invalid(
        validate_params(EndpointKind::Collections, &features("x")),
        "expects 0 path parameter",
    );
}

#[test]
fn path_segments_reject_traversal_characters() {
    assert_invalid(validate_params(EndpointKind::CollectionInfo, &features("../admin")), "unsupported");
    assert_invalid(validate_params(EndpointKind::CollectionInfo, &features("a b")), "unsupported");
    assert_invalid(validate_params(EndpointKind::CollectionInfo, &features("")), "non-empty");
}

#[test]
fn unknown_query_parameters_are_rejected() {
    let params = features("trn-ntwk-street-1").with_param("key", ParamValue::Text("x".to_string()));
    assert_invalid(validate_params(EndpointKind::CollectionFeatures, &params), "'key' is not supported");
    let params = features("trn-ntwk-street-1").with_param("limit", ParamValue::Integer(5));
    assert_invalid(validate_params(EndpointKind::CollectionInfo, &params), "'limit' is not supported");
}

#[test]
fn valid_feature_search_passes() {
    let params = features("trn-ntwk-street-1")
        .with_param("bbox", ParamValue::BoundingBox([-0.2, 51.4, 0.1, 51.6]))
        .with_param("limit", ParamValue::Integer(100))
        .with_param("offset", ParamValue::Integer(0))
        .with_param("filter", ParamValue::Text("usrn = 12345".to_string()))
        .with_param("crs", ParamValue::Text(SUPPORTED_CRS[1].to_string()));
    validate_params(EndpointKind::CollectionFeatures, &params).unwrap();
}

#[test]
fn limit_bounds_are_enforced() {
    for limit in [0, 101, -1] {
        let params = features("c").with_param("limit", ParamValue::Integer(limit));
        assert_invalid(validate_params(EndpointKind::CollectionFeatures, &params), "limit");
    }
    let params = features("c").with_param("limit", ParamValue::Integer(1));
    validate_params(EndpointKind::CollectionFeatures, &params).unwrap();
}

#[test]
fn negative_offset_is_rejected() {
    let params = features("c").with_param("offset", ParamValue::Integer(-5));
    assert_invalid(validate_params(EndpointKind::CollectionFeatures, &params), "offset");
}

#[test]
fn inverted_bbox_is_rejected() {
    let params = features("c").with_param("bbox", ParamValue::BoundingBox([1.0, 0.0, 0.0, 1.0]));
    assert_invalid(validate_params(EndpointKind::CollectionFeatures, &params), "min_x < max_x");
    let params = features("c").with_param("bbox", ParamValue::BoundingBox([0.0, 0.0, f64::NAN, 1.0]));
    assert_invalid(validate_params(EndpointKind::CollectionFeatures, &params), "finite");
}

#[test]
fn bbox_text_parses_and_validates() {
    assert_eq!(
        ParamValue::parse_bbox("1, 2, 3, 4").unwrap(),
        ParamValue::BoundingBox([1.0, 2.0, 3.0, 4.0])
    );
    assert!(ParamValue::parse_bbox("1,2,3").is_err());
    assert!(ParamValue::parse_bbox("1,2,x,4").is_err());
    assert!(ParamValue::parse_bbox("3,2,1,4").is_err());
}

#[test]
fn unsupported_crs_is_rejected() {
    let params = features("c").with_param("crs", ParamValue::Text("EPSG:9999".to_string()));
    assert_invalid(validate_params(EndpointKind::CollectionFeatures, &params), "crs must be one of");
}

#[test]
fn crs_short_forms_normalize() {
    assert_eq!(normalize_crs("EPSG:27700"), Some("http://www.opengis.net/def/crs/EPSG/0/27700"));
    assert_eq!(normalize_crs("epsg:4326"), Some("http://www.opengis.net/def/crs/EPSG/0/4326"));
    assert_eq!(normalize_crs("CRS84"), Some("http://www.opengis.net/def/crs/OGC/1.3/CRS84"));
    assert_eq!(normalize_crs("27700"), Some("http://www.opengis.net/def/crs/EPSG/0/27700"));
    assert_eq!(normalize_crs("EPSG:9999"), None);
}

#[test]
fn filter_balance_is_checked() {
    validate_filter("name = 'O''Brien Street' AND (a = 1 OR b = 2)").unwrap();
    validate_filter("description = 'has ( paren'").unwrap();
    assert_invalid(validate_filter("name = 'open"), "unterminated");
    assert_invalid(validate_filter("(a = 1"), "unbalanced");
    assert_invalid(validate_filter("a = 1)"), "unmatched");
    assert_invalid(validate_filter("   "), "non-empty");
    assert_invalid(validate_filter(&"a".repeat(4_097)), "exceeds");
}

#[test]
fn filter_lang_must_be_cql_text() {
    let params = features("c").with_param("filter-lang", ParamValue::Text("cql2-json".to_string()));
    assert_invalid(validate_params(EndpointKind::CollectionFeatures, &params), "filter-lang");
}
