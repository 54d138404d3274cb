//! Tolerant parsing of JSON embedded in generated text.
//!
//! Completion oracles wrap JSON in Markdown fences, add prose around it,
//! leave trailing commas and emit raw control characters. [`parse_tolerant`]
//! undoes the common damage and either yields a typed value or a
//! [`JsonShapeError`] the caller can recover from.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Generated text did not contain a usable JSON value of the expected shape.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason} (response starts with: {excerpt:?})")]
pub struct JsonShapeError {
    pub reason: String,
    pub excerpt: String,
}

impl JsonShapeError {
    fn new(reason: impl Into<String>, text: &str) -> Self {
        Self { reason: reason.into(), excerpt: text.chars().take(120).collect() }
    }
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)```").unwrap())
}

fn trailing_comma_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").unwrap())
}

fn flat_object_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").unwrap())
}

/// Strip a Markdown code fence if the text contains one.
pub fn strip_fences(text: &str) -> &str {
    fence_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim()
}

/// Slice from the first opening bracket to the last closing bracket.
fn outermost_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    (end > start).then(|| &text[start..=end])
}

fn scrub(text: &str) -> String {
    let no_control: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    trailing_comma_regex().replace_all(&no_control, "$1").into_owned()
}

/// Extract the most plausible JSON value from generated text.
pub fn extract_value(text: &str) -> Result<Value, JsonShapeError> {
    let body = strip_fences(text);
    if body.is_empty() {
        return Err(JsonShapeError::new("empty response", text));
    }
    if let Ok(v) = serde_json::from_str(body) {
        return Ok(v);
    }

    let span = outermost_span(body).unwrap_or(body);
    let cleaned = scrub(span);
    if let Ok(v) = serde_json::from_str(&cleaned) {
        return Ok(v);
    }

    // Last resort: the first object with no nesting.
    if let Some(m) = flat_object_regex().find(&cleaned) {
        if let Ok(v) = serde_json::from_str(m.as_str()) {
            return Ok(v);
        }
    }

    Err(JsonShapeError::new("no parseable JSON found", text))
}

/// Extract and deserialize into `T`.
pub fn parse_tolerant<T: DeserializeOwned>(text: &str) -> Result<T, JsonShapeError> {
    let value = extract_value(text)?;
    serde_json::from_value(value)
        .map_err(|e| JsonShapeError::new(format!("unexpected JSON shape: {e}"), text))
}

/// Parse a list of names: a JSON array of strings if possible, otherwise
/// comma-separated text with quotes and brackets trimmed off each item.
///
/// Duplicates are dropped, first occurrence wins.
pub fn parse_string_list(text: &str) -> Vec<String> {
    let items: Vec<String> = match parse_tolerant::<Vec<Value>>(text) {
        Ok(values) => values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Err(_) => strip_fences(text)
            .split([',', '\n'])
            .map(|s| s.trim_matches(|c: char| c.is_whitespace() || "'\"[]".contains(c)).to_string())
            .collect(),
    };

    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Decision {
        action: String,
    }

    #[test]
    fn test_fenced_json() {
        let d: Decision = parse_tolerant("Here you go:\n```json\n{\"action\": \"proceed\"}\n```").unwrap();
        assert_eq!(d.action, "proceed");
    }

    #[test]
    fn test_prose_and_trailing_commas() {
        let text = "Sure! {\"drugs\": [{\"drug\": \"Metformin\",},],} Hope that helps.";
        let v = extract_value(text).unwrap();
        assert_eq!(v["drugs"][0]["drug"], "Metformin");
    }

    #[test]
    fn test_raw_newline_inside_string() {
        let v = extract_value("{\"rationale\": \"line one\nline two\"}").unwrap();
        assert_eq!(v["rationale"], "line one line two");
    }

    #[test]
    fn test_flat_object_fallback() {
        let text = "{\"action\": \"expand_class\"} and also {broken";
        let d: Decision = parse_tolerant(text).unwrap();
        assert_eq!(d.action, "expand_class");
    }

    #[test]
    fn test_garbage_is_shape_error() {
        let err = parse_tolerant::<Decision>("I cannot answer that.").unwrap_err();
        assert!(err.reason.contains("no parseable JSON"));
        assert!(parse_tolerant::<Decision>("   ").is_err());
    }

    #[test]
    fn test_string_list_json_and_comma_fallback() {
        assert_eq!(parse_string_list("[\"EGFR\", \"KRAS\", \"egfr\"]"), ["EGFR", "KRAS"]);
        assert_eq!(parse_string_list("'BRAF', \"MEK1\", [PIK3CA]"), ["BRAF", "MEK1", "PIK3CA"]);
        assert!(parse_string_list("").is_empty());
    }
}
