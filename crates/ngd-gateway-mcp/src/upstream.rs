// crates/ngd-gateway-mcp/src/upstream.rs
// ============================================================================
// Module: Upstream Client
// Description: Async HTTP client for the OS NGD features and links services.
// Purpose: Inject credentials, bound latency, retry transient failures, and
//          normalize upstream failures into the gateway error taxonomy.
// Dependencies: reqwest, rand, tokio, async-trait, serde_json
// ============================================================================

//! ## Overview
//! [`UpstreamApi`] is the seam between the tool router and the network.
//! [`HttpUpstreamClient`] implements it with `reqwest`: parameters are
//! validated locally before any request, the credential is attached as the
//! `key` query parameter or header, and every successful payload passes
//! through the [`Redactor`] before it is returned.
//!
//! ## Invariants
//! - Only GET requests are issued, so retries are side-effect free.
//! - Transport errors, 5xx, and 429 are retried `max_retries` times with
//!   exponentially growing, fully jittered backoff. Other statuses are final.
//! - Error messages never include URLs, query strings, or the credential.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use ngd_gateway_config::CredentialPlacement;
use ngd_gateway_config::SecretString;
use ngd_gateway_config::UpstreamConfig;
use rand::Rng;
use reqwest::Client;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::header::ACCEPT;
use reqwest::redirect::Policy;
use serde_json::Value;
use thiserror::Error;

use crate::audit::AuditSink;
use crate::audit::UpstreamAuditEvent;
use crate::envelope::ErrorCode;
use crate::params::EndpointKind;
use crate::params::UpstreamBase;
use crate::params::UpstreamParams;
use crate::params::validate_params;
use crate::sanitize::Redactor;
use crate::telemetry::duration_ms;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Query parameter and header name carrying the credential.
const CREDENTIAL_NAME: &str = "key";
/// Maximum length of an upstream error detail copied into a message.
const MAX_ERROR_DETAIL_CHARS: usize = 240;
/// Fields inspected for an upstream error description.
const ERROR_DETAIL_FIELDS: &[&str] = &["description", "detail", "message", "error"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Upstream failures mapped onto the gateway error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Parameters were rejected locally or by the upstream (400).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The collection does not exist upstream.
    #[error("invalid collection: {0}")]
    InvalidCollection(String),
    /// The credential is missing or was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The credential lacks entitlement for the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Upstream failure after retries, malformed payload, or transport fault.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl UpstreamError {
    /// Returns the envelope error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::InvalidCollection(_) => ErrorCode::InvalidCollection,
            Self::Auth(_) => ErrorCode::AuthError,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::Upstream(_) => ErrorCode::UpstreamError,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Read-only access to the upstream geospatial API.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Invokes one upstream endpoint and returns its sanitized JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] for invalid parameters, missing or rejected
    /// credentials, and upstream failures after retries.
    async fn invoke(
        &self,
        endpoint: EndpointKind,
        params: &UpstreamParams,
    ) -> Result<Value, UpstreamError>;

    /// Returns true when an upstream credential is configured.
    fn has_credential(&self) -> bool;
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Bounded exponential backoff with full jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for the first retry.
    pub backoff_base: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Builds the policy from upstream configuration.
    #[must_use]
    pub const fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Returns the total number of attempts.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns the delay ceiling before retry number `retry` (zero-based).
    #[must_use]
    pub fn ceiling(&self, retry: u32) -> Duration {
        let factor = 2_u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.backoff_base.checked_mul(factor).unwrap_or(self.max_backoff).min(self.max_backoff)
    }

    /// Returns a uniformly jittered delay in `0 ..= ceiling(retry)`.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let ceiling = duration_ms(self.ceiling(retry));
        Duration::from_millis(rand::thread_rng().gen_range(0 ..= ceiling))
    }
}

/// Returns true when a status warrants another attempt.
fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

// ============================================================================
// SECTION: HTTP Client
// ============================================================================

/// Outcome of a single attempt.
enum AttemptOutcome {
    /// Final result; no further attempts.
    Done(Result<Value, UpstreamError>),
    /// Transient failure with a redacted reason.
    Retry(String),
}

/// Failure while reading a response body.
enum BodyError {
    /// Body exceeded the configured cap.
    TooLarge,
    /// Transport failure mid-body.
    Transport(String),
}

/// `reqwest`-backed [`UpstreamApi`] implementation.
pub struct HttpUpstreamClient {
    /// Shared connection pool.
    client: Client,
    /// Features service base URL.
    features_base: Url,
    /// Linked identifiers service base URL.
    links_base: Url,
    /// Upstream credential, when configured.
    credential: Option<SecretString>,
    /// Where the credential is attached.
    placement: CredentialPlacement,
    /// Retry and backoff policy.
    retry: RetryPolicy,
    /// Maximum response body size.
    max_response_bytes: usize,
    /// Payload sanitizer bound to the credential.
    redactor: Redactor,
    /// Audit sink for attempt records.
    audit: Arc<dyn AuditSink>,
}

impl HttpUpstreamClient {
    /// Builds the client from upstream configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Upstream`] when a base URL is invalid or the
    /// HTTP client cannot be constructed.
    pub fn from_config(
        config: &UpstreamConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .redirect(Policy::none())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|_| UpstreamError::Upstream("failed to build upstream http client".to_string()))?;
        let credential = config
            .api_key
            .clone()
            .filter(|secret| !secret.expose().trim().is_empty());
        Ok(Self {
            client,
            features_base: parse_base_url(&config.features_base_url, "features_base_url")?,
            links_base: parse_base_url(&config.links_base_url, "links_base_url")?,
            redactor: Redactor::new(credential.clone()),
            credential,
            placement: config.credential_placement,
            retry: RetryPolicy::from_config(config),
            max_response_bytes: config.max_response_bytes,
            audit,
        })
    }

    /// Returns the sanitizer bound to this client's credential.
    #[must_use]
    pub const fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Builds the credential-free request URL.
    fn build_url(
        &self,
        endpoint: EndpointKind,
        params: &UpstreamParams,
    ) -> Result<Url, UpstreamError> {
        let mut url = match endpoint.base() {
            UpstreamBase::Features => self.features_base.clone(),
            UpstreamBase::Links => self.links_base.clone(),
        };
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                UpstreamError::Upstream("upstream base url cannot carry a path".to_string())
            })?;
            segments.pop_if_empty();
            for segment in endpoint.path_segments(&params.path) {
                segments.push(&segment);
            }
        }
        if !params.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &params.query {
                pairs.append_pair(name, &value.render());
            }
        }
        Ok(url)
    }

    /// Runs one attempt and classifies its outcome.
    async fn attempt(
        &self,
        endpoint: EndpointKind,
        url: &Url,
        credential: &SecretString,
        attempt: u32,
    ) -> AttemptOutcome {
        let started = Instant::now();
        let mut target = url.clone();
        if self.placement == CredentialPlacement::Query {
            target.query_pairs_mut().append_pair(CREDENTIAL_NAME, credential.expose());
        }
        let mut request = self.client.get(target).header(ACCEPT, "application/json");
        if self.placement == CredentialPlacement::Header {
            request = request.header(CREDENTIAL_NAME, credential.expose());
        }
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                self.record(endpoint, None, attempt, "transport_error", started);
                return AttemptOutcome::Retry(describe_transport_error(&err).to_string());
            }
        };
        let status = response.status();
        if status.is_success() {
            let outcome = match read_body(response, self.max_response_bytes).await {
                Ok(body) => match serde_json::from_slice::<Value>(&body) {
                    Ok(payload) => AttemptOutcome::Done(Ok(self.redactor.sanitize(payload))),
                    Err(_) => AttemptOutcome::Done(Err(UpstreamError::Upstream(
                        "upstream returned malformed JSON".to_string(),
                    ))),
                },
                Err(BodyError::TooLarge) => AttemptOutcome::Done(Err(UpstreamError::Upstream(
                    "upstream response exceeds size limit".to_string(),
                ))),
                Err(BodyError::Transport(reason)) => AttemptOutcome::Retry(reason),
            };
            let label = match &outcome {
                AttemptOutcome::Done(Ok(_)) => "ok",
                AttemptOutcome::Done(Err(_)) => "error",
                AttemptOutcome::Retry(_) => "transport_error",
            };
            self.record(endpoint, Some(status.as_u16()), attempt, label, started);
            return outcome;
        }
        if is_retryable(status) {
            self.record(endpoint, Some(status.as_u16()), attempt, "retryable_status", started);
            return AttemptOutcome::Retry(format!("upstream returned status {}", status.as_u16()));
        }
        let detail = read_body(response, self.max_response_bytes)
            .await
            .ok()
            .and_then(|body| error_detail(&body))
            .map(|detail| self.redactor.redact_text(&detail));
        self.record(endpoint, Some(status.as_u16()), attempt, "error", started);
        AttemptOutcome::Done(Err(map_status(endpoint, status.as_u16(), detail.as_deref())))
    }

    /// Emits an upstream audit record.
    fn record(
        &self,
        endpoint: EndpointKind,
        status: Option<u16>,
        attempt: u32,
        outcome: &'static str,
        started: Instant,
    ) {
        self.audit.record_upstream(&UpstreamAuditEvent::new(
            endpoint,
            status,
            attempt,
            outcome,
            duration_ms(started.elapsed()),
        ));
    }
}

#[async_trait]
impl UpstreamApi for HttpUpstreamClient {
    async fn invoke(
        &self,
        endpoint: EndpointKind,
        params: &UpstreamParams,
    ) -> Result<Value, UpstreamError> {
        validate_params(endpoint, params)?;
        let credential = self.credential.as_ref().ok_or_else(|| {
            UpstreamError::Auth("upstream API key is not configured".to_string())
        })?;
        let url = self.build_url(endpoint, params)?;
        let attempts = self.retry.attempts();
        let mut last_failure = String::new();
        for attempt in 0 .. attempts {
            if attempt > 0 {
                let delay = self.retry.backoff(attempt - 1);
                tokio::time::sleep(delay).await;
            }
            match self.attempt(endpoint, &url, credential, attempt + 1).await {
                AttemptOutcome::Done(result) => return result,
                AttemptOutcome::Retry(reason) => last_failure = reason,
            }
        }
        Err(UpstreamError::Upstream(format!(
            "{endpoint} failed after {attempts} attempt(s): {last_failure}"
        )))
    }

    fn has_credential(&self) -> bool {
        self.credential.is_some()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a configured base URL.
fn parse_base_url(raw: &str, field: &str) -> Result<Url, UpstreamError> {
    Url::parse(raw).map_err(|_| UpstreamError::Upstream(format!("upstream.{field} is not a valid url")))
}

/// Maps a final non-success status onto the error taxonomy.
#[must_use]
pub fn map_status(endpoint: EndpointKind, status: u16, detail: Option<&str>) -> UpstreamError {
    let suffix = detail.map(|detail| format!(": {detail}")).unwrap_or_default();
    match status {
        400 => UpstreamError::InvalidInput(format!("upstream rejected the request (400){suffix}")),
        401 => UpstreamError::Auth(format!("upstream rejected the API key (401){suffix}")),
        403 => UpstreamError::Forbidden(format!(
            "API key is not entitled to this resource (403){suffix}"
        )),
        404 if endpoint.is_collection_scoped() => {
            UpstreamError::InvalidCollection(format!("collection not found upstream (404){suffix}"))
        }
        404 => UpstreamError::InvalidInput(format!("resource not found upstream (404){suffix}")),
        _ => UpstreamError::Upstream(format!("upstream returned status {status}{suffix}")),
    }
}

/// Extracts a short description from an upstream error body.
fn error_detail(body: &[u8]) -> Option<String> {
    let payload: Value = serde_json::from_slice(body).ok()?;
    let object = payload.as_object()?;
    let text = ERROR_DETAIL_FIELDS.iter().find_map(|field| match object.get(*field) {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Object(nested)) => {
            nested.get("message").and_then(Value::as_str).map(str::to_string)
        }
        _ => None,
    })?;
    Some(text.chars().take(MAX_ERROR_DETAIL_CHARS).collect())
}

/// Reads a response body up to `max_bytes`.
async fn read_body(mut response: Response, max_bytes: usize) -> Result<Vec<u8>, BodyError> {
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if let Some(length) = response.content_length()
        && length > limit
    {
        return Err(BodyError::TooLarge);
    }
    let mut body = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                if body.len().saturating_add(chunk.len()) > max_bytes {
                    return Err(BodyError::TooLarge);
                }
                body.extend_from_slice(&chunk);
            }
            Ok(None) => return Ok(body),
            Err(err) => return Err(BodyError::Transport(describe_transport_error(&err).to_string())),
        }
    }
}

/// Describes a transport error without its URL.
fn describe_transport_error(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "upstream request timed out"
    } else if err.is_connect() {
        "could not connect to upstream"
    } else if err.is_body() || err.is_decode() {
        "upstream response body failed"
    } else {
        "upstream transport error"
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
