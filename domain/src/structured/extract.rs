//! Layered JSON extraction from model output.
//!
//! Models asked for JSON frequently wrap it in prose or fences. Extraction
//! tries, in order:
//!
//! 1. the whole text as JSON,
//! 2. the substring from the first `{` to the last `}`,
//! 3. the contents of a fenced block labelled `json`,
//! 4. any brace-delimited substring (up to two levels of nesting) that parses.
//!
//! Only objects and arrays count as structured data. Text that is already a
//! valid object is returned unchanged by layer 1.

use crate::completion::CompletionResponse;
use crate::core::string::truncate;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::LazyLock;
use thiserror::Error;

/// Longest raw text kept in a fallback value.
pub const MAX_FALLBACK_TEXT: usize = 2000;

static BRACE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)\{[^{}]*(?:\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}[^{}]*)*\}")
        .expect("brace pattern is valid")
});

/// No layer produced structured data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no structured data in response ({raw_len} bytes)")]
pub struct ExtractionFailure {
    /// Raw text, truncated to [`MAX_FALLBACK_TEXT`]
    pub raw_text: String,
    pub raw_len: usize,
}

impl ExtractionFailure {
    fn new(text: &str) -> Self {
        Self {
            raw_text: truncate(text, MAX_FALLBACK_TEXT),
            raw_len: text.len(),
        }
    }

    /// Minimal valid structure carrying the raw text and an explicit flag
    pub fn fallback_value(&self) -> Value {
        json!({
            "rawText": self.raw_text,
            "extractionFailed": true,
        })
    }
}

fn parse_structured(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(value) if value.is_object() || value.is_array() => Some(value),
        _ => None,
    }
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn json_fence(text: &str) -> Option<String> {
    let mut in_block = false;
    let mut block = String::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if !in_block {
            if let Some(info) = trimmed.strip_prefix("```")
                && info.trim().eq_ignore_ascii_case("json")
            {
                in_block = true;
                block.clear();
            }
        } else if trimmed == "```" {
            return Some(block);
        } else {
            block.push_str(line);
            block.push('\n');
        }
    }
    // Unterminated fence: use what we have
    (in_block && !block.trim().is_empty()).then_some(block)
}

/// Run the extraction layers over `text`.
pub fn extract_json(text: &str) -> Result<Value, ExtractionFailure> {
    if let Some(value) = parse_structured(text) {
        return Ok(value);
    }
    if let Some(value) = outer_braces(text).and_then(parse_structured) {
        return Ok(value);
    }
    if let Some(value) = json_fence(text).as_deref().and_then(parse_structured) {
        return Ok(value);
    }
    if let Some(value) = BRACE_RE
        .find_iter(text)
        .find_map(|m| parse_structured(m.as_str()))
    {
        return Ok(value);
    }
    Err(ExtractionFailure::new(text))
}

/// Like [`extract_json`] but never fails: returns the fallback structure.
pub fn extract_json_or_fallback(text: &str) -> Value {
    extract_json(text).unwrap_or_else(|failure| failure.fallback_value())
}

/// Structured responses pass through; raw text goes through the layers.
pub fn extract_from_response(response: &CompletionResponse) -> Result<Value, ExtractionFailure> {
    match response {
        CompletionResponse::Structured(value) => Ok(value.clone()),
        CompletionResponse::Raw(text) => extract_json(text),
    }
}

/// Extract and deserialize into `T`.
pub fn extract_as<T: DeserializeOwned>(text: &str) -> Result<T, ExtractionFailure> {
    let value = extract_json(text)?;
    serde_json::from_value(value).map_err(|_| ExtractionFailure::new(text))
}

/// Whether `value` is a fallback produced by [`ExtractionFailure::fallback_value`]
pub fn is_extraction_failure(value: &Value) -> bool {
    value
        .get("extractionFailed")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_valid_json_is_returned_unchanged() {
        let text = r#"{"steps":[{"id":"a","title":"A"}],"title":"t"}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value, serde_json::from_str::<Value>(text).unwrap());
        // Feeding the result back in yields the same value
        assert_eq!(extract_json(&value.to_string()).unwrap(), value);
    }

    #[test]
    fn test_prose_around_object() {
        let text = "Sure! Here is the plan:\n{\"title\": \"x\", \"steps\": []}\nHope this helps.";
        assert_eq!(extract_json(text).unwrap()["title"], "x");
    }

    #[test]
    fn test_json_fence() {
        let text = "Note: {not json}\n```json\n{\"a\": 1}\n```\nand {also not} json";
        assert_eq!(extract_json(text).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_fenced_array() {
        let text = "steps:\n```JSON\n[1, 2]\n```";
        assert_eq!(extract_json(text).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_regex_layer_finds_nested_object() {
        let text = "prefix { unclosed note, then {\"outer\": {\"inner\": 1}} end";
        assert_eq!(extract_json(text).unwrap(), json!({"outer": {"inner": 1}}));
    }

    #[test]
    fn test_scalars_are_not_structured() {
        assert!(extract_json("42").is_err());
        assert!(extract_json("\"just a string\"").is_err());
    }

    #[test]
    fn test_fallback_value() {
        let long = "x".repeat(MAX_FALLBACK_TEXT * 2);
        let value = extract_json_or_fallback(&long);
        assert!(is_extraction_failure(&value));
        assert!(value["rawText"].as_str().unwrap().len() <= MAX_FALLBACK_TEXT);
    }

    #[test]
    fn test_structured_response_passthrough() {
        let response = CompletionResponse::Structured(json!({"k": "v"}));
        assert_eq!(extract_from_response(&response).unwrap(), json!({"k": "v"}));
    }

    #[test]
    fn test_extract_as() {
        #[derive(Deserialize)]
        struct Summary {
            summary: String,
        }
        let parsed: Summary = extract_as("Result: {\"summary\": \"ok\"}").unwrap();
        assert_eq!(parsed.summary, "ok");
        assert!(extract_as::<Summary>("{\"other\": 1}").is_err());
    }
}
