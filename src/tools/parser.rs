//! Tolerant scanner for the textual tool-invocation protocol.
//!
//! The decision model emits zero or more invocation blocks interleaved
//! with free text:
//!
//! ```text
//! [TOOL_CALL: tool_name]
//! { "argument": "value" }
//! [/TOOL_CALL]
//! ```
//!
//! Scanning is two-phase: a lenient pattern yields `{name, raw
//! argument text}` candidates, then a strict JSON decode runs per
//! candidate. A decode failure drops that candidate only — the model
//! may simply answer without tools, so malformed blocks are never a
//! request-level error. Text outside blocks is ignored here but
//! preserved upstream as the model's natural-language answer.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

static TOOL_CALL_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[TOOL_CALL:\s*(\w+)\]\s*(\{.*?\})\s*\[/TOOL_CALL\]")
        .expect("tool call pattern is valid")
});

/// One well-formed invocation decision parsed out of model text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub name: String,
    /// Always a JSON object.
    pub arguments: serde_json::Value,
}

/// Extract every well-formed invocation block, in order of appearance.
pub fn extract_tool_calls(content: &str) -> Vec<ParsedToolCall> {
    TOOL_CALL_BLOCK
        .captures_iter(content)
        .filter_map(|caps| {
            let name = caps[1].to_string();
            match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&caps[2]) {
                Ok(arguments) => Some(ParsedToolCall {
                    name,
                    arguments: serde_json::Value::Object(arguments),
                }),
                Err(err) => {
                    debug!(tool = %name, %err, "dropping malformed tool call block");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_a_single_block() {
        let content = r#"Let me check the weather.
[TOOL_CALL: get_weather]
{"city": "Seoul"}
[/TOOL_CALL]
I'll have an answer shortly."#;
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[0].arguments, json!({"city": "Seoul"}));
    }

    #[test]
    fn extracts_multiple_blocks_in_order() {
        let content = r#"[TOOL_CALL: first]
{"a": 1}
[/TOOL_CALL]
some text between
[TOOL_CALL: second]
{"b": 2}
[/TOOL_CALL]"#;
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[1].name, "second");
    }

    #[test]
    fn malformed_json_drops_only_that_block() {
        let content = r#"[TOOL_CALL: broken]
{"city": Seoul}
[/TOOL_CALL]
[TOOL_CALL: get_weather]
{"city": "Seoul"}
[/TOOL_CALL]"#;
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_weather");
    }

    #[test]
    fn plain_answers_yield_nothing() {
        assert!(extract_tool_calls("The capital of France is Paris.").is_empty());
        assert!(extract_tool_calls("").is_empty());
    }

    #[test]
    fn unterminated_blocks_are_ignored() {
        let content = r#"[TOOL_CALL: get_weather]
{"city": "Seoul"}"#;
        assert!(extract_tool_calls(content).is_empty());
    }

    #[test]
    fn nested_json_objects_parse() {
        let content = r#"[TOOL_CALL: search]
{"filters": {"country": "KR", "limit": 5}}
[/TOOL_CALL]"#;
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["filters"]["limit"], 5);
    }
}
