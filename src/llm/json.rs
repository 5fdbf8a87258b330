//! Tolerant extraction of JSON objects from model output
//!
//! Models wrap JSON in prose or markdown fences despite instructions. The
//! extraction ladder: direct parse, then fenced code spans (marker `json` or
//! bare), then the first-`{`-to-last-`}` substring. A direct parse always
//! wins over the heuristics.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::{truncate, ModelError};

lazy_static! {
    static ref FENCED_SPAN: Regex =
        Regex::new(r"(?s)```(?:json)?[ \t]*\r?\n?(.*?)```").expect("fenced span regex");
}

/// Extract a JSON object from raw model text
pub fn extract_json(text: &str) -> Result<Value, ModelError> {
    if let Some(value) = parse_object(text) {
        return Ok(value);
    }

    // Fenced spans, innermost-first: later matches of the non-greedy regex
    // sit deeper when fences nest, so try them in reverse
    let spans: Vec<&str> = FENCED_SPAN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    for span in spans.iter().rev() {
        if let Some(value) = parse_object(span) {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Some(value) = parse_object(&text[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(ModelError::Response(format!(
        "no JSON object in model output: {}",
        truncate(text, 200)
    )))
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
