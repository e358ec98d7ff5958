// scoutchat Engine — Tool-call extraction
//
// Models are asked to answer with a single JSON object
//
//     {"tool": "web_search" | "read_url" | "instant_answer", "arguments": {...}}
//
// but routinely wrap it in prose or ```json fences. Extraction is best-effort:
//
//   1. greedy span: first '{' .. last '}' → parse
//   2. otherwise: from each '{' in order, parse the first complete JSON value
//
// A parsed object counts as a tool call only if it has a string `tool` field.
// Anything else is "no tool call" and the text is treated as an answer.

use crate::atoms::types::ToolCall;
use serde_json::Value;

pub fn extract_tool_call(text: &str) -> Option<ToolCall> {
    let first = text.find('{')?;
    if let Some(last) = text.rfind('}') {
        if last > first {
            if let Some(call) = parse_candidate(&text[first..=last]) {
                return Some(call);
            }
        }
    }

    for (idx, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            if let Some(call) = to_tool_call(value) {
                return Some(call);
            }
        }
    }
    None
}

/// Cheap check used while streaming: does the text so far look like the
/// start of a tool call rather than prose?
pub fn looks_like_tool_call_prefix(text: &str) -> bool {
    let t = text.trim_start();
    t.starts_with('{') || t.starts_with("```")
}

fn parse_candidate(span: &str) -> Option<ToolCall> {
    serde_json::from_str::<Value>(span).ok().and_then(to_tool_call)
}

fn to_tool_call(value: Value) -> Option<ToolCall> {
    let obj = value.as_object()?;
    let tool = obj.get("tool")?.as_str()?.trim().to_string();
    if tool.is_empty() {
        return None;
    }
    let arguments = match obj.get("arguments") {
        Some(v @ Value::Object(_)) => v.clone(),
        Some(Value::String(s)) => {
            // Some models double-encode the arguments object.
            serde_json::from_str::<Value>(s)
                .ok()
                .filter(|v| v.is_object())
                .unwrap_or_else(|| Value::Object(Default::default()))
        }
        _ => Value::Object(Default::default()),
    };
    Some(ToolCall { tool, arguments })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::ToolKind;
    use serde_json::json;

    #[test]
    fn bare_object() {
        let call =
            extract_tool_call(r#"{"tool":"web_search","arguments":{"query":"rust"}}"#).unwrap();
        assert_eq!(call.kind(), Some(ToolKind::WebSearch));
        assert_eq!(call.arguments, json!({"query": "rust"}));
    }

    #[test]
    fn embedded_in_prose_and_fences() {
        let text = concat!(
            "Sure, let me look that up.\n```json\n",
            r#"{"tool": "read_url", "arguments": {"url": "https://example.com", "start": 0}}"#,
            "\n```\nOne moment."
        );
        let call = extract_tool_call(text).unwrap();
        assert_eq!(call.tool, "read_url");
        assert_eq!(call.arguments, json!({"url": "https://example.com", "start": 0}));
    }

    #[test]
    fn braces_in_surrounding_prose() {
        let text = concat!(
            "Use {curly} braces like {this}. ",
            r#"{"tool":"instant_answer","arguments":{"query":"capital of France"}}"#,
            " and a trailing } too"
        );
        let call = extract_tool_call(text).unwrap();
        assert_eq!(call.kind(), Some(ToolKind::InstantAnswer));
        assert_eq!(call.arguments["query"], "capital of France");
    }

    #[test]
    fn nested_braces_inside_strings() {
        let text = r#"{"tool":"web_search","arguments":{"query":"what does {} mean in rust"}}"#;
        let call = extract_tool_call(text).unwrap();
        assert_eq!(call.arguments["query"], "what does {} mean in rust");
    }

    #[test]
    fn malformed_or_absent_json_is_no_call() {
        assert!(extract_tool_call("Paris is the capital of France.").is_none());
        let unclosed = r#"{"tool": "web_search", "arguments": {"query": "x"}"#;
        assert!(extract_tool_call(unclosed).is_none());
        assert!(extract_tool_call("{not json at all}").is_none());
        assert!(extract_tool_call("}{").is_none());
        assert!(extract_tool_call("").is_none());
    }

    #[test]
    fn objects_without_tool_field_are_ignored() {
        assert!(extract_tool_call(r#"The config is {"debug": true}."#).is_none());
        assert!(extract_tool_call(r#"{"tool": 42, "arguments": {}}"#).is_none());
    }

    #[test]
    fn missing_or_string_arguments() {
        let call = extract_tool_call(r#"{"tool":"instant_answer"}"#).unwrap();
        assert_eq!(call.arguments, json!({}));
        let stringly = r#"{"tool":"web_search","arguments":"{\"query\":\"rust\"}"}"#;
        let call = extract_tool_call(stringly).unwrap();
        assert_eq!(call.arguments, json!({"query": "rust"}));
    }

    #[test]
    fn unknown_tool_is_still_extracted() {
        let call = extract_tool_call(r#"{"tool":"delete_everything","arguments":{}}"#).unwrap();
        assert_eq!(call.kind(), None);
    }

    #[test]
    fn stream_prefix_detection() {
        assert!(looks_like_tool_call_prefix("  {\"tool\""));
        assert!(looks_like_tool_call_prefix("```json"));
        assert!(!looks_like_tool_call_prefix("Step 1 [Fact]:"));
    }
}
