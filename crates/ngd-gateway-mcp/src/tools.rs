// crates/ngd-gateway-mcp/src/tools.rs
// ============================================================================
// Module: Gateway Tool Router
// Description: Tool catalog and per-call pipeline for the NGD gateway.
// Purpose: Wire admission, gating, catalog, and upstream into tool calls.
// Dependencies: tokio, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`ToolRouter`] owns no state of its own: the rate limiter, workflow gate,
//! catalog cache, and upstream client are built at startup and injected by
//! [`Arc`]. Each call runs the same pipeline:
//!
//! parse tool name -> authenticate -> rate limit -> guardrails -> workflow
//! gate -> handler.
//!
//! Any failure along the way becomes an [`ErrorEnvelope`]; nothing is thrown
//! past the router boundary.
//!
//! ## Invariants
//! - Validation and gating failures never reach the upstream.
//! - State-advancing tools advance the session before they return.
//! - Audit events carry tool labels, never argument values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::audit::AuditSink;
use crate::audit::ToolCallAuditEvent;
use crate::audit::ToolCallAuditParams;
use crate::auth::AuthAction;
use crate::auth::AuthAuditEvent;
use crate::auth::AuthContext;
use crate::auth::AuthError;
use crate::auth::RequestContext;
use crate::auth::ToolAuthz;
use crate::catalog::CatalogCache;
use crate::catalog::CollectionCatalog;
use crate::envelope::ErrorCode;
use crate::envelope::ErrorEnvelope;
use crate::guardrails::GuardrailViolation;
use crate::guardrails::screen_arguments;
use crate::identity::ClientId;
use crate::identity::SessionId;
use crate::identity::sanitize_session_id;
use crate::params::EndpointKind;
use crate::params::ParamValue;
use crate::params::UpstreamParams;
use crate::params::normalize_crs;
use crate::params::validate_params;
use crate::rate_limit::Admission;
use crate::rate_limit::RateLimiter;
use crate::sanitize::Redactor;
use crate::telemetry::CallOutcome;
use crate::telemetry::GatewayMetrics;
use crate::telemetry::ToolMetricEvent;
use crate::telemetry::duration_ms;
use crate::upstream::UpstreamApi;
use crate::upstream::UpstreamError;
use crate::workflow::GateDenial;
use crate::workflow::SessionState;
use crate::workflow::ToolTier;
use crate::workflow::WorkflowGate;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum identifiers accepted by bulk tools.
pub const MAX_BULK_ITEMS: usize = 50;
/// Maximum collections accepted by `fetch_detailed_collections`.
pub const MAX_DETAILED_COLLECTIONS: usize = 20;
/// Default page size for `search_features`.
const DEFAULT_SEARCH_LIMIT: i64 = 10;
/// Maximum characters of caller text echoed into an envelope.
const MAX_ECHO_CHARS: usize = 64;
/// Maximum unknown collection ids echoed into an envelope.
const MAX_ECHO_COLLECTIONS: usize = 10;
/// Ordered workflow instructions returned with the context.
const WORKFLOW_INSTRUCTIONS: &[&str] = &[
    "Pick the collections relevant to the question from available_collections.",
    "openapi_endpoints lists the upstream API paths for reference.",
    "Call fetch_detailed_collections with those collection ids to load their queryables.",
    "Build filters only from the returned queryable properties and their enum values.",
    "Call search_features with the collection id and filter, bbox, or both.",
];

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Closed set of tools exposed by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Connectivity check.
    HelloWorld,
    /// Reports whether an upstream credential is configured.
    CheckApiKey,
    /// Loads the catalog and establishes workflow context.
    GetWorkflowContext,
    /// Resets the session's workflow state.
    ResetWorkflow,
    /// Lists collection ids and titles.
    ListCollections,
    /// Returns one collection's metadata.
    GetCollectionInfo,
    /// Loads queryables for named collections.
    FetchDetailedCollections,
    /// Looks up identifiers linked to one identifier.
    GetLinkedIdentifiers,
    /// Looks up identifiers linked to many identifiers.
    GetBulkLinkedFeatures,
    /// Fetches one feature by id.
    GetFeature,
    /// Searches a collection with filters.
    SearchFeatures,
    /// Fetches many features by id or attribute value.
    GetBulkFeatures,
}

impl ToolName {
    /// All tools in listing order.
    pub const ALL: [Self; 12] = [
        Self::HelloWorld,
        Self::CheckApiKey,
        Self::GetWorkflowContext,
        Self::ResetWorkflow,
        Self::ListCollections,
        Self::GetCollectionInfo,
        Self::FetchDetailedCollections,
        Self::GetLinkedIdentifiers,
        Self::GetBulkLinkedFeatures,
        Self::GetFeature,
        Self::SearchFeatures,
        Self::GetBulkFeatures,
    ];

    /// Returns the wire name of the tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HelloWorld => "hello_world",
            Self::CheckApiKey => "check_api_key",
            Self::GetWorkflowContext => "get_workflow_context",
            Self::ResetWorkflow => "reset_workflow",
            Self::ListCollections => "list_collections",
            Self::GetCollectionInfo => "get_collection_info",
            Self::FetchDetailedCollections => "fetch_detailed_collections",
            Self::GetLinkedIdentifiers => "get_linked_identifiers",
            Self::GetBulkLinkedFeatures => "get_bulk_linked_features",
            Self::GetFeature => "get_feature",
            Self::SearchFeatures => "search_features",
            Self::GetBulkFeatures => "get_bulk_features",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    /// Returns the workflow tier the tool requires.
    #[must_use]
    pub const fn tier(self) -> ToolTier {
        match self {
            Self::HelloWorld | Self::CheckApiKey | Self::GetWorkflowContext | Self::ResetWorkflow => {
                ToolTier::Open
            }
            Self::ListCollections
            | Self::GetCollectionInfo
            | Self::FetchDetailedCollections
            | Self::GetLinkedIdentifiers
            | Self::GetBulkLinkedFeatures
            | Self::GetFeature => ToolTier::RequiresContext,
            Self::SearchFeatures | Self::GetBulkFeatures => ToolTier::RequiresQueryables,
        }
    }

    /// Returns the client-facing description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::HelloWorld => "Connectivity check for the NGD gateway.",
            Self::CheckApiKey => "Reports whether the upstream OS API key is configured.",
            Self::GetWorkflowContext => {
                "Loads available collections and workflow instructions. Call this first."
            }
            Self::ResetWorkflow => "Resets this session's workflow state.",
            Self::ListCollections => "Lists feature collection ids and titles.",
            Self::GetCollectionInfo => "Returns metadata for one feature collection.",
            Self::FetchDetailedCollections => {
                "Loads queryable properties for collections. Required before searching."
            }
            Self::GetLinkedIdentifiers => {
                "Returns identifiers linked to a TOID, UPRN, USRN, or other identifier."
            }
            Self::GetBulkLinkedFeatures => "Runs linked identifier lookups for many identifiers.",
            Self::GetFeature => "Fetches one feature by collection and feature id.",
            Self::SearchFeatures => {
                "Searches a collection using a CQL filter, bounding box, or attribute match."
            }
            Self::GetBulkFeatures => "Fetches many features by id or by attribute value.",
        }
    }

    /// Returns the JSON schema for the tool's arguments.
    #[must_use]
    pub fn input_schema(self) -> Value {
        let collection_id = json!({"type": "string", "description": "Collection id"});
        let crs = json!({"type": "string", "description": "CRS URI or EPSG code"});
        match self {
            Self::HelloWorld
            | Self::CheckApiKey
            | Self::GetWorkflowContext
            | Self::ResetWorkflow
            | Self::ListCollections => object_schema(&json!({}), &[]),
            Self::GetCollectionInfo => object_schema(
                &json!({
                    "collection_id": collection_id,
                    "include_schema": {
                        "type": "boolean",
                        "description": "Also return the collection's property schema"
                    }
                }),
                &["collection_id"],
            ),
            Self::FetchDetailedCollections => object_schema(
                &json!({
                    "collection_ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 1,
                        "maxItems": MAX_DETAILED_COLLECTIONS
                    }
                }),
                &["collection_ids"],
            ),
            Self::GetLinkedIdentifiers => object_schema(
                &json!({
                    "identifier_type": {"type": "string"},
                    "identifier": {"type": "string"},
                    "feature_type": {"type": "string"}
                }),
                &["identifier_type", "identifier"],
            ),
            Self::GetBulkLinkedFeatures => object_schema(
                &json!({
                    "identifier_type": {"type": "string"},
                    "identifiers": {
                        "type": "array",
                        "items": {"type": "string"},
                        "maxItems": MAX_BULK_ITEMS
                    },
                    "feature_type": {"type": "string"}
                }),
                &["identifier_type", "identifiers"],
            ),
            Self::GetFeature => object_schema(
                &json!({
                    "collection_id": collection_id,
                    "feature_id": {"type": "string"},
                    "crs": crs
                }),
                &["collection_id", "feature_id"],
            ),
            Self::SearchFeatures => object_schema(
                &json!({
                    "collection_id": collection_id,
                    "filter": {"type": "string", "description": "CQL2 text filter"},
                    "bbox": {
                        "description": "min_x,min_y,max_x,max_y",
                        "oneOf": [
                            {"type": "string"},
                            {"type": "array", "items": {"type": "number"}, "minItems": 4, "maxItems": 4}
                        ]
                    },
                    "bbox_crs": crs,
                    "crs": crs,
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100},
                    "offset": {"type": "integer", "minimum": 0},
                    "query_attr": {"type": "string"},
                    "query_attr_value": {"type": "string"}
                }),
                &["collection_id"],
            ),
            Self::GetBulkFeatures => object_schema(
                &json!({
                    "collection_id": collection_id,
                    "identifiers": {
                        "type": "array",
                        "items": {"type": "string"},
                        "maxItems": MAX_BULK_ITEMS
                    },
                    "query_by_attr": {"type": "string"}
                }),
                &["collection_id", "identifiers"],
            ),
        }
    }
}

/// Builds a closed object schema.
fn object_schema(properties: &Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Tool listing entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: ToolName,
    /// Tool description for clients.
    pub description: &'static str,
    /// JSON schema for tool input.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Returns definitions for every tool.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolName::ALL
        .into_iter()
        .map(|tool| ToolDefinition {
            name: tool,
            description: tool.description(),
            input_schema: tool.input_schema(),
        })
        .collect()
}

// ============================================================================
// SECTION: Tool Arguments
// ============================================================================

/// Arguments for tools that take none.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

/// Arguments for `get_collection_info`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CollectionArgs {
    /// Collection id.
    collection_id: String,
    /// Also fetch the collection's property schema.
    #[serde(default)]
    include_schema: bool,
}

/// Arguments for `fetch_detailed_collections`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetailedCollectionsArgs {
    /// Collection ids.
    collection_ids: Vec<String>,
}

/// Arguments for `get_linked_identifiers`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LinkedIdentifiersArgs {
    /// Identifier type (TOID, UPRN, USRN, ...).
    identifier_type: String,
    /// Identifier value.
    identifier: String,
    /// Optional correlated feature type filter.
    feature_type: Option<String>,
}

/// Arguments for `get_bulk_linked_features`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BulkLinkedArgs {
    /// Identifier type.
    identifier_type: String,
    /// Identifier values.
    identifiers: Vec<String>,
    /// Optional correlated feature type filter.
    feature_type: Option<String>,
}

/// Arguments for `get_feature`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FeatureArgs {
    /// Collection id.
    collection_id: String,
    /// Feature id.
    feature_id: String,
    /// Optional response CRS.
    crs: Option<String>,
}

/// Bounding box as text or numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BboxArg {
    /// `min_x,min_y,max_x,max_y`.
    Text(String),
    /// `[min_x, min_y, max_x, max_y]`.
    Numbers(Vec<f64>),
}

/// Arguments for `search_features`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    /// Collection id.
    collection_id: String,
    /// CQL2 text filter.
    filter: Option<String>,
    /// Bounding box.
    bbox: Option<BboxArg>,
    /// Bounding box CRS.
    bbox_crs: Option<String>,
    /// Response CRS.
    crs: Option<String>,
    /// Page size.
    limit: Option<i64>,
    /// Page offset.
    offset: Option<i64>,
    /// Attribute for a simple equality match.
    query_attr: Option<String>,
    /// Value for the attribute match.
    query_attr_value: Option<String>,
}

/// Arguments for `get_bulk_features`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BulkFeaturesArgs {
    /// Collection id.
    collection_id: String,
    /// Feature ids, or attribute values when `query_by_attr` is set.
    identifiers: Vec<String>,
    /// Attribute to match identifiers against.
    query_by_attr: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool routing errors.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name not recognized.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// Tool arguments were malformed.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    /// Session header was rejected.
    #[error("invalid session id: {0}")]
    InvalidSession(&'static str),
    /// Authentication failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Local admission control rejected the call.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Time until a slot frees up.
        retry_after: Duration,
    },
    /// Arguments tripped a guardrail.
    #[error(transparent)]
    Guardrail(#[from] GuardrailViolation),
    /// The workflow gate denied the call.
    #[error(transparent)]
    Gate(#[from] GateDenial),
    /// Collection ids missing from the catalog.
    #[error("unknown collection id(s): {}", unknown.join(", "))]
    InvalidCollection {
        /// Unknown ids.
        unknown: Vec<String>,
        /// Known ids.
        valid: Vec<String>,
    },
    /// Upstream failure.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Returns the envelope error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownTool(_)
            | Self::InvalidParams(_)
            | Self::InvalidSession(_)
            | Self::Guardrail(_) => ErrorCode::InvalidInput,
            Self::Auth(_) => ErrorCode::AuthError,
            Self::RateLimited {
                ..
            } => ErrorCode::RateLimit,
            Self::Gate(denial) => denial.code(),
            Self::InvalidCollection {
                ..
            } => ErrorCode::InvalidCollection,
            Self::Upstream(err) => err.code(),
            Self::Internal(_) => ErrorCode::GeneralError,
        }
    }

    /// Converts the error into an envelope for `tool`.
    #[must_use]
    pub fn into_envelope(self, tool: &str, redactor: &Redactor) -> ErrorEnvelope {
        match self {
            Self::RateLimited {
                retry_after,
            } => ErrorEnvelope::rate_limited(tool, retry_after),
            Self::InvalidCollection {
                unknown,
                valid,
            } => ErrorEnvelope::invalid_collection(tool, &unknown, &valid),
            Self::UnknownTool(name) => {
                ErrorEnvelope::new(tool, ErrorCode::InvalidInput, format!("unknown tool: {name}"))
                    .with_hint("Call tools/list for the supported tool names.")
            }
            other => ErrorEnvelope::new(tool, other.code(), redactor.redact_text(&other.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Tool Outcome
// ============================================================================

/// Result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Domain payload.
    Success(Value),
    /// Normalized failure.
    Failure(ErrorEnvelope),
}

impl ToolOutcome {
    /// Returns true for failures.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the failure envelope, if any.
    #[must_use]
    pub const fn envelope(&self) -> Option<&ErrorEnvelope> {
        match self {
            Self::Success(_) => None,
            Self::Failure(envelope) => Some(envelope),
        }
    }

    /// Returns the JSON body for either outcome.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Success(value) => value,
            Self::Failure(envelope) => envelope.to_value(),
        }
    }
}

// ============================================================================
// SECTION: Tool Router
// ============================================================================

/// Components injected into a [`ToolRouter`].
pub struct ToolRouterConfig {
    /// Upstream API client.
    pub upstream: Arc<dyn UpstreamApi>,
    /// Catalog cache backed by the same upstream.
    pub catalog: Arc<CatalogCache>,
    /// Per-client admission control.
    pub limiter: Arc<RateLimiter>,
    /// Per-session workflow gate.
    pub gate: Arc<WorkflowGate>,
    /// Caller authentication policy.
    pub authz: Arc<dyn ToolAuthz>,
    /// Audit sink for tool calls and auth decisions.
    pub audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    pub metrics: Arc<dyn GatewayMetrics>,
    /// Credential redactor applied to envelope messages.
    pub redactor: Redactor,
}

/// Tool router for gateway requests.
#[derive(Clone)]
pub struct ToolRouter {
    /// Upstream API client.
    upstream: Arc<dyn UpstreamApi>,
    /// Catalog cache.
    catalog: Arc<CatalogCache>,
    /// Per-client admission control.
    limiter: Arc<RateLimiter>,
    /// Per-session workflow gate.
    gate: Arc<WorkflowGate>,
    /// Caller authentication policy.
    authz: Arc<dyn ToolAuthz>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn GatewayMetrics>,
    /// Credential redactor.
    redactor: Redactor,
}

/// Caller labels resolved while a call runs.
#[derive(Default)]
struct CallScope {
    /// Parsed tool.
    tool: Option<ToolName>,
    /// Authenticated caller.
    client: Option<ClientId>,
    /// Workflow session.
    session: Option<SessionId>,
}

impl ToolRouter {
    /// Creates a new tool router.
    #[must_use]
    pub fn new(config: ToolRouterConfig) -> Self {
        Self {
            upstream: config.upstream,
            catalog: config.catalog,
            limiter: config.limiter,
            gate: config.gate,
            authz: config.authz,
            audit: config.audit,
            metrics: config.metrics,
            redactor: config.redactor,
        }
    }

    /// Returns the workflow gate.
    #[must_use]
    pub fn gate(&self) -> &WorkflowGate {
        &self.gate
    }

    /// Returns the catalog cache.
    #[must_use]
    pub fn catalog(&self) -> &CatalogCache {
        &self.catalog
    }

    /// Returns the metrics sink shared with the server.
    #[must_use]
    pub fn metrics(&self) -> &dyn GatewayMetrics {
        self.metrics.as_ref()
    }

    /// Authenticates a request and records the decision.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Auth`] when the request fails the auth policy.
    pub fn authorize(
        &self,
        context: &RequestContext,
        action: AuthAction,
    ) -> Result<AuthContext, ToolError> {
        match self.authz.authorize(context, action) {
            Ok(auth) => {
                self.audit.record_auth(&AuthAuditEvent::allowed(context, action, &auth));
                Ok(auth)
            }
            Err(err) => {
                self.audit.record_auth(&AuthAuditEvent::denied(context, action, &err));
                Err(ToolError::Auth(err))
            }
        }
    }

    /// Lists the tools supported by this gateway.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when authentication fails.
    pub fn list_tools(&self, context: &RequestContext) -> Result<Vec<ToolDefinition>, ToolError> {
        self.authorize(context, AuthAction::ListTools)?;
        Ok(tool_definitions())
    }

    /// Resolves the workflow session for an authenticated caller.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidSession`] for malformed session headers.
    pub fn resolve_session(
        context: &RequestContext,
        client: &ClientId,
    ) -> Result<SessionId, ToolError> {
        match context.session_header.as_deref() {
            Some(raw) => sanitize_session_id(raw)
                .map_err(|rejection| ToolError::InvalidSession(rejection.label())),
            None => Ok(SessionId::for_client(client)),
        }
    }

    /// Ends the caller's workflow session.
    ///
    /// Returns true when the session had tracked state.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when authentication fails or the session header
    /// is malformed.
    pub fn end_session(&self, context: &RequestContext) -> Result<bool, ToolError> {
        let auth = self.authorize(context, AuthAction::EndSession)?;
        let session = Self::resolve_session(context, &auth.client)?;
        Ok(self.gate.end_session(&session))
    }

    /// Handles a tool call by name with JSON arguments.
    pub async fn handle_tool_call(
        &self,
        context: &RequestContext,
        name: &str,
        arguments: Value,
    ) -> ToolOutcome {
        let started = Instant::now();
        let mut scope = CallScope::default();
        let result = self.dispatch(context, name, arguments, &mut scope).await;
        let latency = started.elapsed();
        let tool_label = scope.tool.map_or_else(|| clip(name), |tool| tool.as_str().to_string());
        let (outcome, error_code, tool_outcome) = match result {
            Ok(value) => (CallOutcome::Ok, None, ToolOutcome::Success(value)),
            Err(err) => {
                let envelope = err.into_envelope(&tool_label, &self.redactor);
                (CallOutcome::Error, Some(envelope.error_code), ToolOutcome::Failure(envelope))
            }
        };
        self.audit.record_tool_call(&ToolCallAuditEvent::new(ToolCallAuditParams {
            request_id: context.request_id.clone(),
            transport: context.transport,
            client: scope.client.map_or_else(|| "unauthenticated".to_string(), |c| c.to_string()),
            session: scope.session.map_or_else(|| "none".to_string(), |s| s.to_string()),
            tool: scope.tool.map_or("unknown", ToolName::as_str).to_string(),
            outcome,
            error_code,
            latency_ms: duration_ms(latency),
        }));
        self.metrics.record_tool_call(
            ToolMetricEvent {
                tool: scope.tool.map_or("unknown", ToolName::as_str).to_string(),
                outcome,
                error_code,
            },
            latency,
        );
        tool_outcome
    }

    /// Runs the call pipeline up to and including the handler.
    async fn dispatch(
        &self,
        context: &RequestContext,
        name: &str,
        arguments: Value,
        scope: &mut CallScope,
    ) -> Result<Value, ToolError> {
        let tool = ToolName::parse(name).ok_or_else(|| ToolError::UnknownTool(clip(name)))?;
        scope.tool = Some(tool);
        let auth = self.authorize(context, AuthAction::CallTool(tool))?;
        scope.client = Some(auth.client.clone());
        let session = Self::resolve_session(context, &auth.client)?;
        scope.session = Some(session.clone());
        if let Admission::Rejected {
            retry_after,
        } = self.limiter.admit(&auth.client)
        {
            return Err(ToolError::RateLimited {
                retry_after,
            });
        }
        screen_arguments(&arguments)?;
        self.gate.authorize(&session, tool)?;
        self.run_tool(tool, &session, arguments).await
    }

    /// Invokes the handler for an admitted call.
    async fn run_tool(
        &self,
        tool: ToolName,
        session: &SessionId,
        arguments: Value,
    ) -> Result<Value, ToolError> {
        match tool {
            ToolName::HelloWorld => {
                decode::<NoArgs>(arguments)?;
                Ok(json!({
                    "message": "Hello from the OS NGD gateway! The connection is working correctly."
                }))
            }
            ToolName::CheckApiKey => {
                decode::<NoArgs>(arguments)?;
                Ok(self.handle_check_api_key())
            }
            ToolName::GetWorkflowContext => {
                decode::<NoArgs>(arguments)?;
                self.handle_workflow_context(session).await
            }
            ToolName::ResetWorkflow => {
                decode::<NoArgs>(arguments)?;
                let state = self.gate.reset(session);
                Ok(json!({
                    "workflow_state": state,
                    "message": "Workflow reset. Call get_workflow_context to start again."
                }))
            }
            ToolName::ListCollections => {
                decode::<NoArgs>(arguments)?;
                let catalog = self.catalog.collections().await?;
                Ok(json!({ "collections": catalog.collections() }))
            }
            ToolName::GetCollectionInfo => {
                let args = decode::<CollectionArgs>(arguments)?;
                self.handle_collection_info(args).await
            }
            ToolName::FetchDetailedCollections => {
                let args = decode::<DetailedCollectionsArgs>(arguments)?;
                self.handle_detailed_collections(session, args).await
            }
            ToolName::GetLinkedIdentifiers => {
                let args = decode::<LinkedIdentifiersArgs>(arguments)?;
                let params = linked_params(&args.identifier_type, &args.identifier);
                let payload = self.invoke(EndpointKind::LinkedIdentifiers, &params).await?;
                Ok(match args.feature_type.as_deref() {
                    Some(feature_type) => filter_linked_identifiers(&payload, feature_type),
                    None => payload,
                })
            }
            ToolName::GetBulkLinkedFeatures => {
                let args = decode::<BulkLinkedArgs>(arguments)?;
                self.handle_bulk_linked(args).await
            }
            ToolName::GetFeature => {
                let args = decode::<FeatureArgs>(arguments)?;
                let params = feature_params(&args.collection_id, &args.feature_id, args.crs.as_deref())?;
                self.invoke_in_collection(
                    EndpointKind::CollectionFeatureById,
                    &params,
                    &args.collection_id,
                )
                .await
            }
            ToolName::SearchFeatures => {
                let args = decode::<SearchArgs>(arguments)?;
                let collection_id = args.collection_id.clone();
                let params = search_params(args)?;
                self.invoke_in_collection(EndpointKind::CollectionFeatures, &params, &collection_id)
                    .await
            }
            ToolName::GetBulkFeatures => {
                let args = decode::<BulkFeaturesArgs>(arguments)?;
                self.handle_bulk_features(args).await
            }
        }
    }

    /// Reports credential presence without revealing it.
    fn handle_check_api_key(&self) -> Value {
        let configured = self.upstream.has_credential();
        json!({
            "api_key_configured": configured,
            "message": if configured {
                "OS API key is configured."
            } else {
                "OS API key is not configured; set OS_API_KEY."
            }
        })
    }

    /// Loads the catalog and establishes context.
    ///
    /// The OpenAPI path list is best effort: a failed fetch yields an empty
    /// list and is retried on the next call.
    async fn handle_workflow_context(&self, session: &SessionId) -> Result<Value, ToolError> {
        let (catalog, description) =
            tokio::join!(self.catalog.collections(), self.catalog.api_description());
        let catalog = catalog?;
        let openapi_endpoints: Vec<String> =
            description.map(|description| description.paths().to_vec()).unwrap_or_default();
        let state = self.gate.advance(session, SessionState::ContextEstablished, &[]);
        let available: Map<String, Value> = catalog
            .latest_versions()
            .into_iter()
            .map(|summary| (summary.id, json!({ "title": summary.title })))
            .collect();
        let collection_count = available.len();
        Ok(json!({
            "workflow_state": state,
            "available_collections": available,
            "collection_count": collection_count,
            "openapi_endpoints": openapi_endpoints,
            "instructions": WORKFLOW_INSTRUCTIONS,
            "next_step": ToolName::FetchDetailedCollections.as_str(),
        }))
    }

    /// Returns collection metadata, with its property schema when asked.
    async fn handle_collection_info(&self, args: CollectionArgs) -> Result<Value, ToolError> {
        let params = UpstreamParams::new().with_segment(args.collection_id.clone());
        let mut info = self
            .invoke_in_collection(EndpointKind::CollectionInfo, &params, &args.collection_id)
            .await?;
        if args.include_schema {
            let schema = self.invoke(EndpointKind::CollectionSchema, &params).await?;
            info = match info {
                Value::Object(mut fields) => {
                    fields.insert("schema".to_string(), schema);
                    Value::Object(fields)
                }
                other => json!({ "collection": other, "schema": schema }),
            };
        }
        Ok(info)
    }

    /// Loads queryables and advances the session.
    async fn handle_detailed_collections(
        &self,
        session: &SessionId,
        args: DetailedCollectionsArgs,
    ) -> Result<Value, ToolError> {
        let ids: Vec<String> =
            args.collection_ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        if ids.is_empty() {
            return Err(ToolError::InvalidParams(
                "collection_ids must name at least one collection".to_string(),
            ));
        }
        if ids.len() > MAX_DETAILED_COLLECTIONS {
            return Err(ToolError::InvalidParams(format!(
                "collection_ids accepts at most {MAX_DETAILED_COLLECTIONS} collections"
            )));
        }
        self.ensure_collections(&ids).await?;
        let mut fetches = JoinSet::new();
        for id in ids.iter().cloned() {
            let catalog = Arc::clone(&self.catalog);
            fetches.spawn(async move { catalog.queryables(&id).await });
        }
        let mut collections = BTreeMap::new();
        while let Some(joined) = fetches.join_next().await {
            let queryables = joined
                .map_err(|_| ToolError::Internal("queryables fetch task failed".to_string()))??;
            collections.insert(
                queryables.collection_id.clone(),
                json!({
                    "queryable_properties": queryables.property_names(),
                    "queryables": queryables.payload,
                }),
            );
        }
        let state = self.gate.advance(session, SessionState::QueryablesFetched, &ids);
        Ok(json!({
            "workflow_state": state,
            "collections": collections,
            "next_step": ToolName::SearchFeatures.as_str(),
        }))
    }

    /// Runs linked identifier lookups concurrently.
    async fn handle_bulk_linked(&self, args: BulkLinkedArgs) -> Result<Value, ToolError> {
        check_bulk_size(&args.identifiers)?;
        let requests = args
            .identifiers
            .iter()
            .map(|identifier| {
                (
                    identifier.clone(),
                    EndpointKind::LinkedIdentifiers,
                    linked_params(&args.identifier_type, identifier),
                )
            })
            .collect::<Vec<_>>();
        validate_requests(&requests)?;
        let results = self.fan_out(requests).await?;
        let feature_type = args.feature_type.as_deref();
        Ok(bulk_results(results, |payload| match feature_type {
            Some(feature_type) => filter_linked_identifiers(&payload, feature_type),
            None => payload,
        }))
    }

    /// Fetches features concurrently by id or attribute value.
    async fn handle_bulk_features(&self, args: BulkFeaturesArgs) -> Result<Value, ToolError> {
        check_bulk_size(&args.identifiers)?;
        let mut requests = Vec::with_capacity(args.identifiers.len());
        for identifier in &args.identifiers {
            let request = match args.query_by_attr.as_deref() {
                Some(attribute) => (
                    identifier.clone(),
                    EndpointKind::CollectionFeatures,
                    UpstreamParams::new()
                        .with_segment(args.collection_id.clone())
                        .with_param("filter", ParamValue::Text(equality_filter(attribute, identifier)?))
                        .with_param("limit", ParamValue::Integer(DEFAULT_SEARCH_LIMIT)),
                ),
                None => (
                    identifier.clone(),
                    EndpointKind::CollectionFeatureById,
                    feature_params(&args.collection_id, identifier, None)?,
                ),
            };
            requests.push(request);
        }
        validate_requests(&requests)?;
        self.ensure_collections(std::slice::from_ref(&args.collection_id)).await?;
        let results = self.fan_out(requests).await?;
        Ok(bulk_results(results, |payload| payload))
    }

    /// Validates parameters locally, then calls the upstream.
    async fn invoke(&self, endpoint: EndpointKind, params: &UpstreamParams) -> Result<Value, ToolError> {
        validate_params(endpoint, params)?;
        Ok(self.upstream.invoke(endpoint, params).await?)
    }

    /// Validates a collection-scoped request, then checks the collection
    /// against the catalog before sending it.
    ///
    /// Malformed input never reaches the catalog, so it cannot trigger a
    /// collections refresh.
    async fn invoke_in_collection(
        &self,
        endpoint: EndpointKind,
        params: &UpstreamParams,
        collection_id: &str,
    ) -> Result<Value, ToolError> {
        validate_params(endpoint, params)?;
        self.ensure_collections(&[collection_id.to_string()]).await?;
        Ok(self.upstream.invoke(endpoint, params).await?)
    }

    /// Runs upstream requests concurrently, preserving input order.
    ///
    /// Callers validate the batch with [`validate_requests`] first.
    async fn fan_out(
        &self,
        requests: Vec<(String, EndpointKind, UpstreamParams)>,
    ) -> Result<Vec<(String, Result<Value, UpstreamError>)>, ToolError> {
        let mut tasks = JoinSet::new();
        for (index, (label, endpoint, params)) in requests.into_iter().enumerate() {
            let upstream = Arc::clone(&self.upstream);
            tasks.spawn(async move {
                let result = upstream.invoke(endpoint, &params).await;
                (index, label, result)
            });
        }
        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            results.push(
                joined.map_err(|_| ToolError::Internal("bulk request task failed".to_string()))?,
            );
        }
        results.sort_by_key(|(index, _, _)| *index);
        Ok(results.into_iter().map(|(_, label, result)| (label, result)).collect())
    }

    /// Checks collection ids against the cached catalog.
    async fn ensure_collections(&self, ids: &[String]) -> Result<Arc<CollectionCatalog>, ToolError> {
        let catalog = self.catalog.collections().await?;
        let unknown: Vec<String> = ids
            .iter()
            .filter(|id| !catalog.contains(id))
            .take(MAX_ECHO_COLLECTIONS)
            .map(|id| clip(id))
            .collect();
        if unknown.is_empty() {
            Ok(catalog)
        } else {
            Err(ToolError::InvalidCollection {
                unknown,
                valid: catalog.ids(),
            })
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Decodes tool arguments, treating `null` as an empty object.
fn decode<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() { Value::Object(Map::new()) } else { arguments };
    serde_json::from_value(arguments).map_err(|err| ToolError::InvalidParams(err.to_string()))
}

/// Truncates caller-provided text before echoing it.
fn clip(text: &str) -> String {
    text.chars().take(MAX_ECHO_CHARS).collect()
}

/// Validates every request of a batch before any is sent.
fn validate_requests(requests: &[(String, EndpointKind, UpstreamParams)]) -> Result<(), ToolError> {
    for (_, endpoint, params) in requests {
        validate_params(*endpoint, params)?;
    }
    Ok(())
}

/// Rejects empty or oversized bulk requests.
fn check_bulk_size(identifiers: &[String]) -> Result<(), ToolError> {
    if identifiers.is_empty() {
        return Err(ToolError::InvalidParams("identifiers must not be empty".to_string()));
    }
    if identifiers.len() > MAX_BULK_ITEMS {
        return Err(ToolError::InvalidParams(format!(
            "identifiers accepts at most {MAX_BULK_ITEMS} values"
        )));
    }
    Ok(())
}

/// Resolves a CRS argument to a supported URI.
fn resolve_crs(field: &str, value: &str) -> Result<ParamValue, ToolError> {
    normalize_crs(value)
        .map(|uri| ParamValue::Text(uri.to_string()))
        .ok_or_else(|| ToolError::InvalidParams(format!("{field} '{}' is not supported", clip(value))))
}

/// Builds linked identifier parameters.
fn linked_params(identifier_type: &str, identifier: &str) -> UpstreamParams {
    UpstreamParams::new().with_segment(identifier_type).with_segment(identifier)
}

/// Builds single-feature parameters.
fn feature_params(
    collection_id: &str,
    feature_id: &str,
    crs: Option<&str>,
) -> Result<UpstreamParams, ToolError> {
    let mut params = UpstreamParams::new().with_segment(collection_id).with_segment(feature_id);
    if let Some(crs) = crs {
        params = params.with_param("crs", resolve_crs("crs", crs)?);
    }
    Ok(params)
}

/// Builds feature search parameters.
fn search_params(args: SearchArgs) -> Result<UpstreamParams, ToolError> {
    let mut params = UpstreamParams::new()
        .with_segment(args.collection_id)
        .with_param("limit", ParamValue::Integer(args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)));
    if let Some(offset) = args.offset {
        params = params.with_param("offset", ParamValue::Integer(offset));
    }
    let attribute_filter = match (args.query_attr.as_deref(), args.query_attr_value.as_deref()) {
        (Some(attribute), Some(value)) => Some(equality_filter(attribute, value)?),
        (None, None) => None,
        _ => {
            return Err(ToolError::InvalidParams(
                "query_attr and query_attr_value must be provided together".to_string(),
            ));
        }
    };
    let filter = match (args.filter, attribute_filter) {
        (Some(_), Some(_)) => {
            return Err(ToolError::InvalidParams(
                "use either filter or query_attr/query_attr_value, not both".to_string(),
            ));
        }
        (filter, attribute_filter) => filter.or(attribute_filter),
    };
    if let Some(filter) = filter {
        params = params
            .with_param("filter", ParamValue::Text(filter))
            .with_param("filter-lang", ParamValue::Text("cql-text".to_string()));
    }
    if let Some(bbox) = args.bbox {
        let bbox = match bbox {
            BboxArg::Text(text) => ParamValue::parse_bbox(&text)?,
            BboxArg::Numbers(values) => {
                let values: [f64; 4] = values.try_into().map_err(|_| {
                    ToolError::InvalidParams("bbox must have exactly four numbers".to_string())
                })?;
                ParamValue::BoundingBox(values)
            }
        };
        params = params.with_param("bbox", bbox);
    }
    if let Some(bbox_crs) = args.bbox_crs {
        params = params.with_param("bbox-crs", resolve_crs("bbox_crs", &bbox_crs)?);
    }
    if let Some(crs) = args.crs {
        params = params.with_param("crs", resolve_crs("crs", &crs)?);
    }
    Ok(params)
}

/// Builds a CQL2 text equality filter with a quoted literal.
fn equality_filter(attribute: &str, value: &str) -> Result<String, ToolError> {
    let valid_attribute = !attribute.is_empty()
        && attribute.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid_attribute {
        return Err(ToolError::InvalidParams(format!(
            "attribute '{}' must contain only letters, digits, and underscores",
            clip(attribute)
        )));
    }
    Ok(format!("{attribute} = '{}'", value.replace('\'', "''")))
}

/// Extracts identifiers correlated with `feature_type`.
fn filter_linked_identifiers(payload: &Value, feature_type: &str) -> Value {
    let identifiers: Vec<Value> = payload
        .get("correlations")
        .and_then(Value::as_array)
        .and_then(|correlations| {
            correlations.iter().find(|item| {
                item.get("correlatedFeatureType").and_then(Value::as_str) == Some(feature_type)
            })
        })
        .and_then(|item| item.get("correlatedIdentifiers"))
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(|entry| entry.get("identifier").cloned()).collect())
        .unwrap_or_default();
    json!({ "identifiers": identifiers })
}

/// Shapes bulk results; per-item failures do not fail the call.
fn bulk_results<F>(results: Vec<(String, Result<Value, UpstreamError>)>, shape: F) -> Value
where
    F: Fn(Value) -> Value,
{
    let items: Vec<Value> = results
        .into_iter()
        .map(|(identifier, result)| match result {
            Ok(payload) => json!({ "identifier": identifier, "result": shape(payload) }),
            Err(err) => json!({
                "identifier": identifier,
                "error": { "error_code": err.code(), "message": err.to_string() },
            }),
        })
        .collect();
    json!({ "results": items })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
