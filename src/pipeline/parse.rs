//! Decoding model responses into typed JSON.
//!
//! Every generation call in this crate asks for "JSON only", and every model
//! sometimes ignores that: the object arrives inside a ```` ```json ```` fence,
//! behind a sentence of preamble, or not at all. This module is the single
//! place where that is tolerated:
//!
//! 1. If the text contains a fenced block, the first block's body is used
//!    (a `json` language tag is preferred over an untagged fence).
//! 2. The candidate is parsed as-is.
//! 3. If that fails, the outermost `{ … }` span is tried.
//!
//! Anything else is a [`ModelError::Format`]; call sites turn it into their
//! documented default.
//!
//! Inside a decodable object, the field helpers [`null_as_default`] and
//! [`skip_invalid`] keep one malformed field or list entry from discarding
//! its siblings.

use crate::error::ModelError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*\n?(.*?)(?:```|$)").unwrap());

static RE_ANY_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z0-9_-]*\s*\n?(.*?)(?:```|$)").unwrap());

/// Return the body of the first fenced code block, or the whole text.
pub fn extract_fenced_block(response: &str) -> &str {
    if let Some(caps) = RE_JSON_FENCE.captures(response) {
        if let Some(body) = caps.get(1) {
            return body.as_str().trim();
        }
    }
    if let Some(caps) = RE_ANY_FENCE.captures(response) {
        if let Some(body) = caps.get(1) {
            return body.as_str().trim();
        }
    }
    response.trim()
}

/// Decode a model response into `T`.
pub fn parse_json_response<T: DeserializeOwned>(response: &str) -> Result<T, ModelError> {
    if response.trim().is_empty() {
        return Err(ModelError::Format {
            detail: "empty response".into(),
        });
    }

    let candidate = extract_fenced_block(response);
    match serde_json::from_str::<T>(candidate) {
        Ok(v) => Ok(v),
        Err(first_err) => {
            if let Some(span) = outermost_object(candidate) {
                if let Ok(v) = serde_json::from_str::<T>(span) {
                    return Ok(v);
                }
            }
            Err(ModelError::Format {
                detail: first_err.to_string(),
            })
        }
    }
}

/// Field helper: `null` decodes as the field's default.
pub fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Field helper: decode a list entry by entry, dropping entries that do not
/// fit `T`. A `null` or non-list value decodes as an empty list.
pub fn skip_invalid<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return Ok(vec![]),
        Some(other) => {
            debug!("expected a list, got {}", other);
            return Ok(vec![]);
        }
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!("skipping list entry: {}", e);
                None
            }
        })
        .collect())
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
