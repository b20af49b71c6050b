// crates/ngd-gateway-config/src/config.rs
// ============================================================================
// Module: NGD Gateway Configuration
// Description: Configuration loading, env overrides, and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits,
//! then merged with environment overrides and validated. Missing or invalid
//! configuration fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "ngd-gateway.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "NGD_GATEWAY_CONFIG";
/// Default environment variable holding the upstream API key.
pub const DEFAULT_API_KEY_ENV: &str = "OS_API_KEY";
/// Default environment variable holding comma-separated bearer tokens.
pub const DEFAULT_BEARER_TOKENS_ENV: &str = "BEARER_TOKENS";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of server auth tokens.
const MAX_AUTH_TOKENS: usize = 64;
/// Maximum length of a server auth token.
const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Maximum allowed request body size.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
/// Maximum number of tracked workflow sessions.
const MAX_SESSIONS: usize = 65_536;
/// Default max tracked workflow sessions.
const DEFAULT_MAX_SESSIONS: usize = 4_096;
/// Minimum allowed rate limit window in milliseconds.
const MIN_RATE_LIMIT_WINDOW_MS: u64 = 100;
/// Maximum allowed rate limit window in milliseconds.
const MAX_RATE_LIMIT_WINDOW_MS: u64 = 3_600_000;
/// Maximum allowed requests per rate limit window.
const MAX_RATE_LIMIT_REQUESTS: u32 = 100_000;
/// Maximum number of tracked rate limit entries.
const MAX_RATE_LIMIT_ENTRIES: usize = 65_536;
/// Maximum number of per-client rate limit overrides.
const MAX_RATE_LIMIT_OVERRIDES: usize = 128;
/// Default max requests per window.
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 10;
/// Default rate limit window in milliseconds.
const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 60_000;
/// Default max tracked rate limit entries.
const DEFAULT_RATE_LIMIT_MAX_ENTRIES: usize = 4_096;
/// Minimum catalog TTL in milliseconds.
const MIN_CATALOG_TTL_MS: u64 = 1_000;
/// Maximum catalog TTL in milliseconds.
const MAX_CATALOG_TTL_MS: u64 = 86_400_000;
/// Default catalog TTL in milliseconds.
const DEFAULT_CATALOG_TTL_MS: u64 = 3_600_000;
/// Default upstream features base URL.
const DEFAULT_FEATURES_BASE_URL: &str = "https://api.os.uk/features/ngd/ofa/v1";
/// Default upstream linked identifiers base URL.
const DEFAULT_LINKS_BASE_URL: &str = "https://api.os.uk/search/links/v1";
/// Minimum upstream connect timeout in milliseconds.
const MIN_CONNECT_TIMEOUT_MS: u64 = 100;
/// Maximum upstream connect timeout in milliseconds.
const MAX_CONNECT_TIMEOUT_MS: u64 = 30_000;
/// Minimum upstream request timeout in milliseconds.
const MIN_REQUEST_TIMEOUT_MS: u64 = 100;
/// Maximum upstream request timeout in milliseconds.
const MAX_REQUEST_TIMEOUT_MS: u64 = 300_000;
/// Default upstream connect timeout in milliseconds.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
/// Default upstream request timeout (slow queryable fetches included).
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;
/// Maximum upstream retries after the first attempt.
const MAX_UPSTREAM_RETRIES: u32 = 5;
/// Default upstream retries after the first attempt.
const DEFAULT_UPSTREAM_RETRIES: u32 = 2;
/// Default backoff base in milliseconds.
const DEFAULT_BACKOFF_BASE_MS: u64 = 250;
/// Default backoff ceiling in milliseconds.
const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;
/// Maximum backoff ceiling in milliseconds.
const MAX_BACKOFF_MS: u64 = 60_000;
/// Default maximum upstream response size in bytes.
const DEFAULT_MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;
/// Maximum allowed upstream response size in bytes.
const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Secrets
// ============================================================================

/// String wrapper that never prints its contents.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret value for injection into outbound requests.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// NGD gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-client admission control.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Catalog cache configuration.
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Upstream API client configuration.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl GatewayConfig {
    /// Loads configuration from disk, applies process environment overrides,
    /// and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::parse(content)?;
        config.apply_env_overrides(|name| env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text without env overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the TOML is malformed.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies environment overrides using the provided lookup.
    ///
    /// The upstream credential from `upstream.api_key_env` replaces any
    /// file-provided key. Bearer tokens from `server.auth.bearer_tokens_env`
    /// are appended to the configured list.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(&self.upstream.api_key_env) {
            let trimmed = key.trim();
            if !trimmed.is_empty() {
                self.upstream.api_key = Some(SecretString::new(trimmed));
            }
        }
        if let Some(tokens) = lookup(&self.server.auth.bearer_tokens_env) {
            for token in tokens.split(',').map(str::trim).filter(|token| !token.is_empty()) {
                if !self.server.auth.bearer_tokens.iter().any(|existing| existing == token) {
                    self.server.auth.bearer_tokens.push(token.to_string());
                }
            }
        }
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.rate_limit.validate()?;
        self.catalog.validate()?;
        self.upstream.validate()?;
        self.audit.validate()?;
        Ok(())
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Transport type for the tool surface.
    #[serde(default)]
    pub transport: ServerTransport,
    /// Bind address for the HTTP transport.
    #[serde(default)]
    pub bind: Option<String>,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Maximum number of workflow sessions tracked at once.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Authentication configuration for inbound tool calls.
    #[serde(default)]
    pub auth: ServerAuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: ServerTransport::Stdio,
            bind: None,
            max_body_bytes: default_max_body_bytes(),
            max_sessions: default_max_sessions(),
            auth: ServerAuthConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validates server transport configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_BYTES}"
            )));
        }
        if self.max_sessions == 0 || self.max_sessions > MAX_SESSIONS {
            return Err(ConfigError::Invalid(format!(
                "server.max_sessions must be between 1 and {MAX_SESSIONS}"
            )));
        }
        self.auth.validate()?;
        match self.transport {
            ServerTransport::Http => {
                let bind = self.bind.as_deref().unwrap_or_default().trim();
                if bind.is_empty() {
                    return Err(ConfigError::Invalid(
                        "http transport requires bind address".to_string(),
                    ));
                }
                let addr: SocketAddr = bind
                    .parse()
                    .map_err(|_| ConfigError::Invalid("invalid bind address".to_string()))?;
                if !addr.ip().is_loopback() && self.auth.mode == ServerAuthMode::LocalOnly {
                    return Err(ConfigError::Invalid(
                        "non-loopback bind disallowed without bearer_token auth".to_string(),
                    ));
                }
            }
            ServerTransport::Stdio => {
                if self.auth.mode != ServerAuthMode::LocalOnly {
                    return Err(ConfigError::Invalid(
                        "stdio transport only supports local_only auth".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Supported tool surface transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerTransport {
    /// Use stdin/stdout transport.
    #[default]
    Stdio,
    /// Use HTTP JSON-RPC transport.
    Http,
}

impl ServerTransport {
    /// Returns a stable label for the transport.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        }
    }
}

/// Inbound auth modes for tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerAuthMode {
    /// Local-only loopback or stdio access.
    #[default]
    LocalOnly,
    /// Bearer token authentication.
    BearerToken,
}

/// Server authentication configuration for inbound tool calls.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerAuthConfig {
    /// Auth mode for inbound tool calls.
    #[serde(default)]
    pub mode: ServerAuthMode,
    /// Bearer tokens allowed for `bearer_token` mode.
    #[serde(default)]
    pub bearer_tokens: Vec<String>,
    /// Environment variable holding extra comma-separated bearer tokens.
    #[serde(default = "default_bearer_tokens_env")]
    pub bearer_tokens_env: String,
}

impl Default for ServerAuthConfig {
    fn default() -> Self {
        Self {
            mode: ServerAuthMode::LocalOnly,
            bearer_tokens: Vec::new(),
            bearer_tokens_env: default_bearer_tokens_env(),
        }
    }
}

impl ServerAuthConfig {
    /// Validates auth configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bearer_tokens.len() > MAX_AUTH_TOKENS {
            return Err(ConfigError::Invalid("too many bearer tokens".to_string()));
        }
        for token in &self.bearer_tokens {
            if token.trim().is_empty() {
                return Err(ConfigError::Invalid("bearer tokens must be non-empty".to_string()));
            }
            if token.len() > MAX_AUTH_TOKEN_LENGTH {
                return Err(ConfigError::Invalid("bearer token too long".to_string()));
            }
            if token.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(
                    "bearer tokens must not contain whitespace".to_string(),
                ));
            }
        }
        if self.mode == ServerAuthMode::BearerToken && self.bearer_tokens.is_empty() {
            return Err(ConfigError::Invalid(
                "bearer_token mode requires at least one token".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sliding-window rate limit configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Enables admission control.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum requests per time window.
    #[serde(default = "default_rate_limit_max_requests")]
    pub max_requests: u32,
    /// Window duration in milliseconds.
    #[serde(default = "default_rate_limit_window_ms")]
    pub window_ms: u64,
    /// Maximum number of distinct tracked clients.
    #[serde(default = "default_rate_limit_max_entries")]
    pub max_entries: usize,
    /// Per-client ceiling overrides.
    #[serde(default)]
    pub overrides: Vec<RateLimitOverride>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_rate_limit_max_requests(),
            window_ms: default_rate_limit_window_ms(),
            max_entries: default_rate_limit_max_entries(),
            overrides: Vec::new(),
        }
    }
}

impl RateLimitConfig {
    /// Validates rate limit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_max_requests("rate_limit.max_requests", self.max_requests)?;
        if self.window_ms < MIN_RATE_LIMIT_WINDOW_MS || self.window_ms > MAX_RATE_LIMIT_WINDOW_MS {
            return Err(ConfigError::Invalid(format!(
                "rate_limit.window_ms must be between {MIN_RATE_LIMIT_WINDOW_MS} and \
                 {MAX_RATE_LIMIT_WINDOW_MS}",
            )));
        }
        if self.max_entries == 0 || self.max_entries > MAX_RATE_LIMIT_ENTRIES {
            return Err(ConfigError::Invalid(format!(
                "rate_limit.max_entries must be between 1 and {MAX_RATE_LIMIT_ENTRIES}"
            )));
        }
        if self.overrides.len() > MAX_RATE_LIMIT_OVERRIDES {
            return Err(ConfigError::Invalid("too many rate_limit overrides".to_string()));
        }
        for (index, entry) in self.overrides.iter().enumerate() {
            if entry.client.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "rate_limit.overrides[{index}].client must be non-empty"
                )));
            }
            if self.overrides[.. index].iter().any(|prior| prior.client == entry.client) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate rate_limit override for client {}",
                    entry.client
                )));
            }
            validate_max_requests("rate_limit.overrides.max_requests", entry.max_requests)?;
        }
        Ok(())
    }
}

/// Per-client rate limit ceiling.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitOverride {
    /// Client identity the override applies to (for example `stdio`).
    pub client: String,
    /// Maximum requests per window for this client.
    pub max_requests: u32,
}

/// Catalog cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Entry lifetime in milliseconds.
    #[serde(default = "default_catalog_ttl_ms")]
    pub ttl_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_catalog_ttl_ms(),
        }
    }
}

impl CatalogConfig {
    /// Validates catalog settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_timeout_range("catalog.ttl_ms", self.ttl_ms, MIN_CATALOG_TTL_MS, MAX_CATALOG_TTL_MS)
    }
}

/// Where the upstream credential is attached on outbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPlacement {
    /// `key` query parameter.
    #[default]
    Query,
    /// `key` request header.
    Header,
}

/// Upstream API client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL for OGC API Features endpoints.
    #[serde(default = "default_features_base_url")]
    pub features_base_url: String,
    /// Base URL for linked identifier endpoints.
    #[serde(default = "default_links_base_url")]
    pub links_base_url: String,
    /// Upstream API key (prefer the environment variable).
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Environment variable consulted for the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Credential placement on outbound requests.
    #[serde(default)]
    pub credential_placement: CredentialPlacement,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-attempt request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Exponential backoff base in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Maximum upstream response size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// User agent for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Allow cleartext `http://` base URLs (tests and local stubs only).
    #[serde(default)]
    pub allow_http: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            features_base_url: default_features_base_url(),
            links_base_url: default_links_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            credential_placement: CredentialPlacement::Query,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_response_bytes: default_max_response_bytes(),
            user_agent: default_user_agent(),
            allow_http: false,
        }
    }
}

impl UpstreamConfig {
    /// Validates upstream client settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url("upstream.features_base_url", &self.features_base_url, self.allow_http)?;
        validate_base_url("upstream.links_base_url", &self.links_base_url, self.allow_http)?;
        if self.api_key_env.trim().is_empty() {
            return Err(ConfigError::Invalid("upstream.api_key_env must be non-empty".to_string()));
        }
        validate_timeout_range(
            "upstream.connect_timeout_ms",
            self.connect_timeout_ms,
            MIN_CONNECT_TIMEOUT_MS,
            MAX_CONNECT_TIMEOUT_MS,
        )?;
        validate_timeout_range(
            "upstream.request_timeout_ms",
            self.request_timeout_ms,
            MIN_REQUEST_TIMEOUT_MS,
            MAX_REQUEST_TIMEOUT_MS,
        )?;
        if self.max_retries > MAX_UPSTREAM_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "upstream.max_retries must be at most {MAX_UPSTREAM_RETRIES}"
            )));
        }
        if self.backoff_base_ms == 0 || self.max_backoff_ms > MAX_BACKOFF_MS {
            return Err(ConfigError::Invalid(format!(
                "upstream backoff must be between 1 and {MAX_BACKOFF_MS} milliseconds"
            )));
        }
        if self.max_backoff_ms < self.backoff_base_ms {
            return Err(ConfigError::Invalid(
                "upstream.max_backoff_ms must be >= upstream.backoff_base_ms".to_string(),
            ));
        }
        if self.max_response_bytes == 0 || self.max_response_bytes > MAX_RESPONSE_BYTES {
            return Err(ConfigError::Invalid(format!(
                "upstream.max_response_bytes must be between 1 and {MAX_RESPONSE_BYTES}"
            )));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("upstream.user_agent must be non-empty".to_string()));
        }
        Ok(())
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Enable structured audit logging.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional audit log path (JSON lines); stderr when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an upstream base URL scheme.
fn validate_base_url(field: &str, value: &str, allow_http: bool) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.starts_with("https://") {
        return Ok(());
    }
    if trimmed.starts_with("http://") {
        if allow_http {
            return Ok(());
        }
        return Err(ConfigError::Invalid(format!("{field} uses http:// without allow_http")));
    }
    Err(ConfigError::Invalid(format!("{field} must include https://")))
}

/// Validates a per-window request ceiling.
fn validate_max_requests(field: &str, value: u32) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_RATE_LIMIT_REQUESTS {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between 1 and {MAX_RATE_LIMIT_REQUESTS}"
        )));
    }
    Ok(())
}

/// Validates a duration value against bounds.
fn validate_timeout_range(
    field: &str,
    value_ms: u64,
    min_ms: u64,
    max_ms: u64,
) -> Result<(), ConfigError> {
    if value_ms < min_ms || value_ms > max_ms {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between {min_ms} and {max_ms} milliseconds",
        )));
    }
    Ok(())
}

/// Default boolean `true` for serde.
const fn default_true() -> bool {
    true
}

/// Default maximum request body size.
const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default workflow session table bound.
const fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

/// Default bearer token env var.
fn default_bearer_tokens_env() -> String {
    DEFAULT_BEARER_TOKENS_ENV.to_string()
}

/// Default rate limit ceiling.
const fn default_rate_limit_max_requests() -> u32 {
    DEFAULT_RATE_LIMIT_MAX_REQUESTS
}

/// Default rate limit window.
const fn default_rate_limit_window_ms() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_MS
}

/// Default rate limit table bound.
const fn default_rate_limit_max_entries() -> usize {
    DEFAULT_RATE_LIMIT_MAX_ENTRIES
}

/// Default catalog TTL.
const fn default_catalog_ttl_ms() -> u64 {
    DEFAULT_CATALOG_TTL_MS
}

/// Default features base URL.
fn default_features_base_url() -> String {
    DEFAULT_FEATURES_BASE_URL.to_string()
}

/// Default linked identifiers base URL.
fn default_links_base_url() -> String {
    DEFAULT_LINKS_BASE_URL.to_string()
}

/// Default API key env var.
fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

/// Default connect timeout.
const fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// Default request timeout.
const fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

/// Default retry count.
const fn default_max_retries() -> u32 {
    DEFAULT_UPSTREAM_RETRIES
}

/// Default backoff base.
const fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}

/// Default backoff ceiling.
const fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

/// Default upstream response cap.
const fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

/// Default outbound user agent.
fn default_user_agent() -> String {
    format!("ngd-gateway/{}", env!("CARGO_PKG_VERSION"))
}
