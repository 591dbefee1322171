//! Agent response extraction.
//!
//! Agent capabilities answer with a small envelope of message parts whose
//! exact shape tracks an external, versioned format. The "first usable
//! payload" precedence is therefore configuration, not a hard-coded rule:
//! callers can reorder or subset the rule list.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One extraction rule, tried against the whole response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionRule {
    /// An explicit `tool-result` part's output.
    ToolResult,
    /// Any part whose type carries a `tool-` prefix.
    ToolPrefixed,
    /// A generic `data` part.
    DataPayload,
    /// The raw response when it is shaped like a bare result object.
    BareResult,
}

/// Ordered extraction rules; the first rule that produces a payload wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStrategy {
    pub rules: Vec<ExtractionRule>,
}

impl Default for ExtractionStrategy {
    fn default() -> Self {
        Self {
            rules: vec![
                ExtractionRule::ToolResult,
                ExtractionRule::ToolPrefixed,
                ExtractionRule::DataPayload,
                ExtractionRule::BareResult,
            ],
        }
    }
}

impl ExtractionStrategy {
    /// Extract the first usable payload, or `None` when no rule matches.
    pub fn extract(&self, response: &JsonValue) -> Option<JsonValue> {
        let parts = message_parts(response);
        for rule in &self.rules {
            let extracted = match rule {
                ExtractionRule::ToolResult => parts.iter().find_map(|part| {
                    (part_type(part) == Some("tool-result"))
                        .then(|| part_payload(part))
                        .flatten()
                }),
                ExtractionRule::ToolPrefixed => parts.iter().find_map(|part| {
                    part_type(part)
                        .filter(|t| t.starts_with("tool-"))
                        .and_then(|_| part_payload(part))
                }),
                ExtractionRule::DataPayload => parts.iter().find_map(|part| {
                    (part_type(part) == Some("data"))
                        .then(|| part.get("data").cloned())
                        .flatten()
                }),
                ExtractionRule::BareResult => response.get("result").cloned(),
            };
            if let Some(value) = extracted {
                return Some(value);
            }
        }
        None
    }
}

/// The envelope is either a bare array of parts or `{"parts": [...]}`.
fn message_parts(response: &JsonValue) -> Vec<&JsonValue> {
    match response {
        JsonValue::Array(items) => items.iter().collect(),
        JsonValue::Object(map) => map
            .get("parts")
            .and_then(JsonValue::as_array)
            .map(|items| items.iter().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn part_type(part: &JsonValue) -> Option<&str> {
    part.get("type").and_then(JsonValue::as_str)
}

fn part_payload(part: &JsonValue) -> Option<JsonValue> {
    part.get("output")
        .or_else(|| part.get("result"))
        .or_else(|| part.get("data"))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_result_takes_precedence() {
        let response = json!([
            {"type": "text", "text": "thinking..."},
            {"type": "tool-search", "output": {"hits": 3}},
            {"type": "tool-result", "output": {"answer": 42}}
        ]);
        let strategy = ExtractionStrategy::default();
        assert_eq!(strategy.extract(&response), Some(json!({"answer": 42})));
    }

    #[test]
    fn tool_prefixed_is_the_fallback() {
        let response = json!([
            {"type": "tool-search", "output": {"hits": 3}},
            {"type": "data", "data": {"d": 1}}
        ]);
        let strategy = ExtractionStrategy::default();
        assert_eq!(strategy.extract(&response), Some(json!({"hits": 3})));
    }

    #[test]
    fn data_part_and_bare_result() {
        let strategy = ExtractionStrategy::default();
        let data_only = json!({"parts": [{"type": "data", "data": [1, 2]}]});
        assert_eq!(strategy.extract(&data_only), Some(json!([1, 2])));

        let bare = json!({"result": 42});
        assert_eq!(strategy.extract(&bare), Some(json!(42)));
    }

    #[test]
    fn custom_precedence_is_honored() {
        let strategy = ExtractionStrategy {
            rules: vec![ExtractionRule::DataPayload, ExtractionRule::ToolResult],
        };
        let response = json!([
            {"type": "tool-result", "output": "tool wins by default"},
            {"type": "data", "data": "data wins here"}
        ]);
        assert_eq!(strategy.extract(&response), Some(json!("data wins here")));
    }

    #[test]
    fn no_match_yields_none() {
        let strategy = ExtractionStrategy::default();
        assert_eq!(strategy.extract(&json!([{"type": "text", "text": "hi"}])), None);
        assert_eq!(strategy.extract(&json!("plain string")), None);
    }
}
