// crates/ngd-gateway-mcp/src/sanitize.rs
// ============================================================================
// Module: Credential Redaction
// Description: Recursive removal of credential echoes from upstream payloads.
// Purpose: Guarantee the upstream API key never reaches a caller or a log.
// Dependencies: ngd-gateway-config, serde_json
// ============================================================================

//! ## Overview
//! Upstream services echo request URLs (including the `key` query parameter)
//! in pagination links and error bodies. [`Redactor`] walks any JSON value and
//! removes those echoes before the value leaves the upstream client.
//!
//! ## Invariants
//! - Object fields named `api_key` or `apikey` are dropped. A field named
//!   `key` is ordinary feature data and is kept with its value scrubbed.
//! - Fields whose name contains the credential or a credential query
//!   fragment are dropped, as are fields whose string value equals the
//!   credential.
//! - Every remaining string has the credential replaced with [`REDACTED`],
//!   and so has the value of every `key`, `api_key`, or `apikey` query
//!   parameter. A parameter name starts at the beginning of the text or
//!   after `?`, `&`, or ASCII whitespace, so `monkey=` is left alone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ngd_gateway_config::SecretString;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Replacement text for redacted values.
pub const REDACTED: &str = "[REDACTED]";
/// Object field names that always carry credentials.
const CREDENTIAL_FIELDS: &[&str] = &["api_key", "apikey"];
/// Query parameter names whose values are credentials.
const CREDENTIAL_PARAMS: &[&str] = &["key", "api_key", "apikey"];

// ============================================================================
// SECTION: Redactor
// ============================================================================

/// Credential-aware payload sanitizer.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    /// Credential to scrub, when configured.
    secret: Option<SecretString>,
}

impl Redactor {
    /// Builds a redactor for the given credential.
    #[must_use]
    pub fn new(secret: Option<SecretString>) -> Self {
        let secret = secret.filter(|secret| !secret.expose().is_empty());
        Self {
            secret,
        }
    }

    /// Returns the sanitized copy of a JSON value.
    #[must_use]
    pub fn sanitize(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut clean = Map::with_capacity(map.len());
                for (field, nested) in map {
                    if self.drops_field(&field, &nested) {
                        continue;
                    }
                    clean.insert(field, self.sanitize(nested));
                }
                Value::Object(clean)
            }
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|item| self.sanitize(item)).collect())
            }
            Value::String(text) => Value::String(self.redact_text(&text)),
            other => other,
        }
    }

    /// Redacts the credential and credential query parameters from free text.
    #[must_use]
    pub fn redact_text(&self, text: &str) -> String {
        let scrubbed = match &self.secret {
            Some(secret) => text.replace(secret.expose(), REDACTED),
            None => text.to_string(),
        };
        redact_key_fragments(&scrubbed)
    }

    /// Returns true when a field must be removed entirely.
    fn drops_field(&self, field: &str, value: &Value) -> bool {
        if CREDENTIAL_FIELDS.iter().any(|name| field.eq_ignore_ascii_case(name)) {
            return true;
        }
        if self.redact_text(field) != field {
            return true;
        }
        match (&self.secret, value) {
            (Some(secret), Value::String(text)) => text == secret.expose(),
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Replaces the value of every credential query parameter with [`REDACTED`].
fn redact_key_fragments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(offset) = text[cursor ..].find('=') {
        let equals = cursor + offset;
        let value_start = equals + 1;
        out.push_str(&text[cursor .. value_start]);
        cursor = value_start;
        let name_start = text[.. equals].rfind(is_param_boundary).map_or(0, |index| index + 1);
        let name = &text[name_start .. equals];
        if !CREDENTIAL_PARAMS.iter().any(|param| name.eq_ignore_ascii_case(param)) {
            continue;
        }
        let value_len = text[value_start ..]
            .find(|ch: char| ch.is_whitespace() || matches!(ch, '&' | '"' | '\'' | '#' | ',' | '<'))
            .unwrap_or(text.len() - value_start);
        if value_len > 0 {
            out.push_str(REDACTED);
        }
        cursor = value_start + value_len;
    }
    out.push_str(&text[cursor ..]);
    out
}

/// Returns true for characters that end one query parameter and start the next.
const fn is_param_boundary(ch: char) -> bool {
    matches!(ch, '?' | '&') || ch.is_ascii_whitespace()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
