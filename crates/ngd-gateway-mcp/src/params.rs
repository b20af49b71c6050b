// crates/ngd-gateway-mcp/src/params.rs
// ============================================================================
// Module: Upstream Request Parameters
// Description: Closed endpoint set, typed parameters, and local validation.
// Purpose: Reject malformed upstream requests before any network traffic.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! An upstream request is an [`EndpointKind`] plus [`UpstreamParams`]. The
//! endpoint set is closed and fixes both the path arity and which upstream
//! base (features or linked identifiers) the request targets. Validation is
//! syntactic only: filter expressions are checked for balanced quoting and
//! parentheses and otherwise passed through to the upstream untouched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use crate::upstream::UpstreamError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum page size accepted for feature searches.
pub const MAX_FEATURE_LIMIT: i64 = 100;
/// Maximum length of a filter expression.
pub const MAX_FILTER_LENGTH: usize = 4_096;
/// Maximum length of a single path segment.
const MAX_SEGMENT_LENGTH: usize = 256;
/// Coordinate reference systems accepted by the features service.
pub const SUPPORTED_CRS: &[&str] = &[
    "http://www.opengis.net/def/crs/OGC/1.3/CRS84",
    "http://www.opengis.net/def/crs/EPSG/0/27700",
    "http://www.opengis.net/def/crs/EPSG/0/4326",
    "http://www.opengis.net/def/crs/EPSG/0/7405",
    "http://www.opengis.net/def/crs/EPSG/0/3857",
];
/// Filter languages accepted by the features service.
const FILTER_LANGS: &[&str] = &["cql-text"];
/// Query parameters accepted by feature searches.
const FEATURE_SEARCH_PARAMS: &[&str] =
    &["bbox", "bbox-crs", "crs", "filter", "filter-crs", "filter-lang", "limit", "offset"];
/// Query parameters accepted by single-feature fetches.
const FEATURE_FETCH_PARAMS: &[&str] = &["crs"];

// ============================================================================
// SECTION: Endpoints
// ============================================================================

/// Upstream service a request is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamBase {
    /// OGC API Features service.
    Features,
    /// Linked identifiers service.
    Links,
}

/// Closed set of supported upstream operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndpointKind {
    /// `GET collections`.
    Collections,
    /// `GET collections/{id}`.
    CollectionInfo,
    /// `GET collections/{id}/schema`, fetched by `get_collection_info` when
    /// `include_schema` is set.
    CollectionSchema,
    /// `GET collections/{id}/queryables`.
    CollectionQueryables,
    /// `GET collections/{id}/items`.
    CollectionFeatures,
    /// `GET collections/{id}/items/{featureId}`.
    CollectionFeatureById,
    /// `GET api`, cached as the workflow context's `openapi_endpoints`.
    OpenApiSpec,
    /// `GET identifierTypes/{type}/{identifier}` on the links service.
    LinkedIdentifiers,
}

impl EndpointKind {
    /// All endpoint kinds.
    pub const ALL: [Self; 8] = [
        Self::Collections,
        Self::CollectionInfo,
        Self::CollectionSchema,
        Self::CollectionQueryables,
        Self::CollectionFeatures,
        Self::CollectionFeatureById,
        Self::OpenApiSpec,
        Self::LinkedIdentifiers,
    ];

    /// Parses an endpoint name produced by [`Self::as_str`].
    ///
    /// This is the checked entry point for callers that name endpoints as
    /// text; the tool handlers use the typed variants directly.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidInput`] for names outside the closed set.
    pub fn parse(name: &str) -> Result<Self, UpstreamError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| UpstreamError::InvalidInput(format!("unknown endpoint kind: {name}")))
    }

    /// Returns the stable endpoint name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Collections => "COLLECTIONS",
            Self::CollectionInfo => "COLLECTION_INFO",
            Self::CollectionSchema => "COLLECTION_SCHEMA",
            Self::CollectionQueryables => "COLLECTION_QUERYABLES",
            Self::CollectionFeatures => "COLLECTION_FEATURES",
            Self::CollectionFeatureById => "COLLECTION_FEATURE_BY_ID",
            Self::OpenApiSpec => "OPENAPI_SPEC",
            Self::LinkedIdentifiers => "LINKED_IDENTIFIERS",
        }
    }

    /// Returns the upstream service the endpoint lives on.
    #[must_use]
    pub const fn base(self) -> UpstreamBase {
        match self {
            Self::LinkedIdentifiers => UpstreamBase::Links,
            _ => UpstreamBase::Features,
        }
    }

    /// Returns the number of path parameters the endpoint takes.
    #[must_use]
    pub const fn path_arity(self) -> usize {
        match self {
            Self::Collections | Self::OpenApiSpec => 0,
            Self::CollectionInfo
            | Self::CollectionSchema
            | Self::CollectionQueryables
            | Self::CollectionFeatures => 1,
            Self::CollectionFeatureById | Self::LinkedIdentifiers => 2,
        }
    }

    /// Returns true when an upstream 404 means the collection is unknown.
    #[must_use]
    pub const fn is_collection_scoped(self) -> bool {
        matches!(
            self,
            Self::CollectionInfo
                | Self::CollectionSchema
                | Self::CollectionQueryables
                | Self::CollectionFeatures
        )
    }

    /// Returns the query parameters the endpoint accepts.
    #[must_use]
    pub const fn allowed_query(self) -> &'static [&'static str] {
        match self {
            Self::CollectionFeatures => FEATURE_SEARCH_PARAMS,
            Self::CollectionFeatureById => FEATURE_FETCH_PARAMS,
            _ => &[],
        }
    }

    /// Expands the endpoint's path template with validated path parameters.
    #[must_use]
    pub fn path_segments(self, path: &[String]) -> Vec<String> {
        let first = path.first().cloned().unwrap_or_default();
        let second = path.get(1).cloned().unwrap_or_default();
        let collections = "collections".to_string();
        match self {
            Self::Collections => vec![collections],
            Self::CollectionInfo => vec![collections, first],
            Self::CollectionSchema => vec![collections, first, "schema".to_string()],
            Self::CollectionQueryables => vec![collections, first, "queryables".to_string()],
            Self::CollectionFeatures => vec![collections, first, "items".to_string()],
            Self::CollectionFeatureById => vec![collections, first, "items".to_string(), second],
            Self::OpenApiSpec => vec!["api".to_string()],
            Self::LinkedIdentifiers => vec!["identifierTypes".to_string(), first, second],
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// Pre-validated query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Free text (CRS URIs, filters).
    Text(String),
    /// Integer value (limit, offset).
    Integer(i64),
    /// Floating point value.
    Number(f64),
    /// Bounding box `[min_x, min_y, max_x, max_y]`.
    BoundingBox([f64; 4]),
}

impl ParamValue {
    /// Renders the value for a query string.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::BoundingBox(values) => {
                values.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
            }
        }
    }

    /// Parses a `min_x,min_y,max_x,max_y` bounding box string.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidInput`] when the text is not four
    /// finite, ordered numbers.
    pub fn parse_bbox(text: &str) -> Result<Self, UpstreamError> {
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(UpstreamError::InvalidInput(
                "bbox must be four comma-separated numbers: min_x,min_y,max_x,max_y".to_string(),
            ));
        }
        let mut values = [0.0_f64; 4];
        for (slot, part) in values.iter_mut().zip(parts) {
            *slot = part.parse::<f64>().map_err(|_| {
                UpstreamError::InvalidInput(format!("bbox value '{part}' is not a number"))
            })?;
        }
        validate_bbox(&values)?;
        Ok(Self::BoundingBox(values))
    }
}

/// Path and query parameters for one upstream request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpstreamParams {
    /// Path parameters in template order.
    pub path: Vec<String>,
    /// Query parameters by name.
    pub query: BTreeMap<String, ParamValue>,
}

impl UpstreamParams {
    /// Creates empty parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a path parameter.
    #[must_use]
    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.path.push(segment.into());
        self
    }

    /// Sets a query parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.query.insert(name.into(), value);
        self
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates parameters against the endpoint's contract.
///
/// # Errors
///
/// Returns [`UpstreamError::InvalidInput`] describing the first violation.
pub fn validate_params(endpoint: EndpointKind, params: &UpstreamParams) -> Result<(), UpstreamError> {
    if params.path.len() != endpoint.path_arity() {
        return Err(UpstreamError::InvalidInput(format!(
            "{endpoint} expects {} path parameter(s), got {}",
            endpoint.path_arity(),
            params.path.len()
        )));
    }
    for segment in &params.path {
        validate_segment(segment)?;
    }
    for (name, value) in &params.query {
        if !endpoint.allowed_query().contains(&name.as_str()) {
            return Err(UpstreamError::InvalidInput(format!(
                "parameter '{name}' is not supported by {endpoint}"
            )));
        }
        validate_query_value(name, value)?;
    }
    Ok(())
}

/// Validates a filter expression for balanced quoting and parentheses.
///
/// Quotes inside a quoted string are escaped by doubling them.
///
/// # Errors
///
/// Returns [`UpstreamError::InvalidInput`] when the expression is empty, too
/// long, or unbalanced.
pub fn validate_filter(expression: &str) -> Result<(), UpstreamError> {
    if expression.trim().is_empty() {
        return Err(UpstreamError::InvalidInput("filter must be non-empty".to_string()));
    }
    if expression.len() > MAX_FILTER_LENGTH {
        return Err(UpstreamError::InvalidInput(format!(
            "filter exceeds {MAX_FILTER_LENGTH} characters"
        )));
    }
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut chars = expression.chars().peekable();
    while let Some(ch) = chars.next() {
        match quote {
            Some(open) => {
                if ch == open {
                    if chars.peek() == Some(&open) {
                        chars.next();
                    } else {
                        quote = None;
                    }
                }
            }
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '(' => depth += 1,
                ')' => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        UpstreamError::InvalidInput(
                            "filter has an unmatched closing parenthesis".to_string(),
                        )
                    })?;
                }
                _ => {}
            },
        }
    }
    if quote.is_some() {
        return Err(UpstreamError::InvalidInput(
            "filter has an unterminated quoted string".to_string(),
        ));
    }
    if depth != 0 {
        return Err(UpstreamError::InvalidInput("filter has unbalanced parentheses".to_string()));
    }
    Ok(())
}

/// Resolves a CRS given as a URI, `EPSG:<code>`, bare code, or `CRS84`.
#[must_use]
pub fn normalize_crs(input: &str) -> Option<&'static str> {
    let trimmed = input.trim();
    if let Some(uri) = SUPPORTED_CRS.iter().copied().find(|uri| uri.eq_ignore_ascii_case(trimmed)) {
        return Some(uri);
    }
    let code = trimmed
        .split_once(':')
        .filter(|(prefix, _)| prefix.eq_ignore_ascii_case("epsg"))
        .map_or(trimmed, |(_, code)| code);
    SUPPORTED_CRS
        .iter()
        .copied()
        .find(|uri| uri.rsplit('/').next().is_some_and(|tail| tail.eq_ignore_ascii_case(code)))
}

/// Validates one path parameter.
fn validate_segment(segment: &str) -> Result<(), UpstreamError> {
    if segment.is_empty() {
        return Err(UpstreamError::InvalidInput("path parameter must be non-empty".to_string()));
    }
    if segment.len() > MAX_SEGMENT_LENGTH {
        return Err(UpstreamError::InvalidInput("path parameter is too long".to_string()));
    }
    if !segment.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | ':' | '~'))
    {
        return Err(UpstreamError::InvalidInput(format!(
            "path parameter '{segment}' contains unsupported characters"
        )));
    }
    Ok(())
}

/// Validates one query parameter by name.
fn validate_query_value(name: &str, value: &ParamValue) -> Result<(), UpstreamError> {
    match (name, value) {
        ("bbox", ParamValue::BoundingBox(values)) => validate_bbox(values),
        ("bbox", _) => Err(UpstreamError::InvalidInput(
            "bbox must be four numbers: min_x,min_y,max_x,max_y".to_string(),
        )),
        ("limit", ParamValue::Integer(limit)) if (1 ..= MAX_FEATURE_LIMIT).contains(limit) => Ok(()),
        ("limit", _) => Err(UpstreamError::InvalidInput(format!(
            "limit must be an integer between 1 and {MAX_FEATURE_LIMIT}"
        ))),
        ("offset", ParamValue::Integer(offset)) if *offset >= 0 => Ok(()),
        ("offset", _) => {
            Err(UpstreamError::InvalidInput("offset must be a non-negative integer".to_string()))
        }
        ("crs" | "bbox-crs" | "filter-crs", ParamValue::Text(uri))
            if SUPPORTED_CRS.contains(&uri.as_str()) =>
        {
            Ok(())
        }
        ("crs" | "bbox-crs" | "filter-crs", _) => Err(UpstreamError::InvalidInput(format!(
            "{name} must be one of: {}",
            SUPPORTED_CRS.join(", ")
        ))),
        ("filter", ParamValue::Text(expression)) => validate_filter(expression),
        ("filter", _) => Err(UpstreamError::InvalidInput("filter must be text".to_string())),
        ("filter-lang", ParamValue::Text(lang)) if FILTER_LANGS.contains(&lang.as_str()) => Ok(()),
        ("filter-lang", _) => Err(UpstreamError::InvalidInput(format!(
            "filter-lang must be one of: {}",
            FILTER_LANGS.join(", ")
        ))),
        _ => Err(UpstreamError::InvalidInput(format!("parameter '{name}' is not supported"))),
    }
}

/// Validates bounding box ordering and finiteness.
fn validate_bbox(values: &[f64; 4]) -> Result<(), UpstreamError> {
    if values.iter().any(|value| !value.is_finite()) {
        return Err(UpstreamError::InvalidInput("bbox values must be finite numbers".to_string()));
    }
    let [min_x, min_y, max_x, max_y] = *values;
    if min_x >= max_x || min_y >= max_y {
        return Err(UpstreamError::InvalidInput(
            "bbox must satisfy min_x < max_x and min_y < max_y".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
