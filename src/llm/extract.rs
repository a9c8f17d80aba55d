//! Best-effort structured extraction from free-form generated text.
//!
//! Backends wrap JSON in markdown fences, preambles, or trailing commentary.
//! Extraction is lossy by contract: callers deserialize with
//! `#[serde(default)]` fields so a malformed or missing block degrades to
//! typed defaults instead of failing the pipeline.

use serde::de::DeserializeOwned;

/// Extract a JSON object from generated text.
///
/// Tries, in order: the text itself, a ```json fence, a bare ``` fence whose
/// body starts with `{`, and finally the outermost brace span. Returns the
/// trimmed input when nothing better is found.
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in a ```json fence
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // Bare fence whose body is an object
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Outermost brace span
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

/// Parse a typed value out of generated text, if a parseable block exists.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_str(&extract_json_object(text)).ok()
}

/// Parse a typed value out of generated text, falling back to `T::default()`
/// when no parseable structure is present.
pub fn parse_structured_or_default<T: DeserializeOwned + Default>(text: &str) -> T {
    parse_structured(text).unwrap_or_default()
}
