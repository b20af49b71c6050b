// crates/ngd-gateway-mcp/src/guardrails.rs
// ============================================================================
// Module: Prompt Injection Guardrails
// Description: Screening of tool arguments for instruction-override text.
// Purpose: Refuse tool calls whose arguments try to steer the calling model.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every string inside a tool call's arguments is matched, case-insensitively,
//! against a fixed set of phrases, ordered word pairs, and `{{...}}`
//! templates. A hit names the offending argument path; the call is refused
//! before the workflow gate or any upstream request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Patterns
// ============================================================================

/// Phrases rejected anywhere in a string argument.
const SUSPICIOUS_PHRASES: &[&str] = &[
    "ignore previous",
    "ignore all previous instructions",
    "assistant:",
    "forget",
    "show credentials",
    "show secrets",
    "reveal password",
    "dump tokens",
    "dump secrets",
    "dump passwords",
    "dump credentials",
    "leak confidential",
    "reveal secrets",
    "expose secrets",
    "extract secrets",
];

/// Word pairs rejected when the first appears before the second.
const SUSPICIOUS_SEQUENCES: &[(&str, &str)] = &[("secrets", "contain"), ("{{", "}}")];

/// Maximum nesting depth walked before the arguments are refused outright.
const MAX_SCREEN_DEPTH: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Guardrail refusal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardrailViolation {
    /// An argument matched a suspicious pattern.
    #[error("potential prompt injection detected in argument '{argument}'")]
    SuspiciousContent {
        /// Argument path, e.g. `filter` or `ids[2]`.
        argument: String,
        /// Pattern that matched.
        pattern: &'static str,
    },
    /// Arguments nest deeper than the screening bound.
    #[error("arguments nest deeper than {MAX_SCREEN_DEPTH} levels")]
    TooDeep,
}

// ============================================================================
// SECTION: Screening
// ============================================================================

/// Returns the first pattern matched by `text`, if any.
#[must_use]
pub fn detect_prompt_injection(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    if let Some(phrase) = SUSPICIOUS_PHRASES.iter().find(|phrase| lowered.contains(*phrase)) {
        return Some(phrase);
    }
    SUSPICIOUS_SEQUENCES.iter().find_map(|(first, second)| {
        let start = lowered.find(first)?;
        lowered[start + first.len() ..].contains(second).then_some(*first)
    })
}

/// Screens every string in a tool's arguments.
///
/// # Errors
///
/// Returns [`GuardrailViolation`] naming the first offending argument.
pub fn screen_arguments(arguments: &Value) -> Result<(), GuardrailViolation> {
    screen_value(arguments, String::new(), 0)
}

/// Walks one value, tracking its argument path.
fn screen_value(value: &Value, path: String, depth: usize) -> Result<(), GuardrailViolation> {
    if depth > MAX_SCREEN_DEPTH {
        return Err(GuardrailViolation::TooDeep);
    }
    match value {
        Value::String(text) => match detect_prompt_injection(text) {
            Some(pattern) => Err(GuardrailViolation::SuspiciousContent {
                argument: if path.is_empty() { "arguments".to_string() } else { path },
                pattern,
            }),
            None => Ok(()),
        },
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                screen_value(item, format!("{path}[{index}]"), depth + 1)?;
            }
            Ok(())
        }
        Value::Object(fields) => {
            for (name, nested) in fields {
                let nested_path =
                    if path.is_empty() { name.clone() } else { format!("{path}.{name}") };
                screen_value(nested, nested_path, depth + 1)?;
            }
            Ok(())
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
