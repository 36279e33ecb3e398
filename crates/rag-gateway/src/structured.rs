//! Structured (JSON) output: prompt decoration and lenient parsing.
//!
//! Models asked for JSON frequently wrap it in prose or code fences. Parsing
//! tries the whole text first, then each balanced `{...}` or `[...]` span in
//! order until one parses. Anything else is
//! [`GatewayError::MalformedStructuredOutput`].

use crate::error::{GatewayError, Result};
use serde_json::Value;

const OUTPUT_INSTRUCTION: &str = "Respond with structured output only: a single JSON value \
conforming to the schema, with no commentary, markdown or code fences.";

/// Appends the schema and the structured-output instruction to a user prompt.
pub fn structured_prompt(prompt: &str, schema: &Value) -> Result<String> {
    let schema_text = serde_json::to_string_pretty(schema)?;
    Ok(format!(
        "{prompt}\n\nJSON schema:\n{schema_text}\n\n{OUTPUT_INSTRUCTION}"
    ))
}

/// Appends the structured-output instruction to the system prompt, if any.
pub fn structured_system_prompt(system_prompt: Option<&str>) -> String {
    match system_prompt.filter(|s| !s.trim().is_empty()) {
        Some(system) => format!("{system}\n\n{OUTPUT_INSTRUCTION}"),
        None => OUTPUT_INSTRUCTION.to_string(),
    }
}

/// Parses generated text into a JSON value.
pub fn parse_structured(raw: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(value);
    }

    for candidate in balanced_json_candidates(raw) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => {
                log::debug!("Extracted embedded JSON ({} bytes) from model output", candidate.len());
                return Ok(value);
            }
            Err(e) => log::debug!("Embedded JSON candidate failed to parse: {}", e),
        }
    }
    log::debug!("No parseable JSON candidate found in model output");

    Err(GatewayError::MalformedStructuredOutput {
        raw: raw.to_string(),
    })
}

/// Returns the first balanced top-level `{...}` or `[...]` span of `text`.
///
/// Brackets inside string literals are ignored. A closing bracket that does
/// not match its opener abandons the current candidate.
pub fn first_balanced_json(text: &str) -> Option<&str> {
    balanced_json_candidates(text).next()
}

/// Yields every balanced `{...}` or `[...]` span of `text`, left to right.
///
/// After each span the scan resumes just past its opening bracket, so a
/// bracketed citation such as `[Document 1]` does not hide the JSON after it
/// and a value nested inside a non-JSON span is still found.
pub fn balanced_json_candidates(text: &str) -> impl Iterator<Item = &str> {
    let mut offset = 0;
    std::iter::from_fn(move || {
        let (start, end) = balanced_span(&text[offset..])?;
        let span = &text[offset + start..=offset + end];
        // Openers are ASCII, so one byte past one is a char boundary.
        offset += start + 1;
        Some(span)
    })
}

/// Byte range of the first balanced span, as inclusive `(start, end)`.
fn balanced_span(text: &str) -> Option<(usize, usize)> {
    let mut stack: Vec<char> = Vec::new();
    let mut start_pos = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' if start_pos.is_some() => in_string = !in_string,
            '{' | '[' if !in_string => {
                if stack.is_empty() {
                    start_pos = Some(i);
                }
                stack.push(ch);
            }
            '}' | ']' if !in_string && !stack.is_empty() => {
                let opening = stack.pop();
                let matched = matches!((opening, ch), (Some('{'), '}') | (Some('['), ']'));
                if !matched {
                    stack.clear();
                    start_pos = None;
                    continue;
                }
                if stack.is_empty()
                    && let Some(p) = start_pos
                {
                    return Some((p, i));
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_parse() {
        let value = parse_structured(r#"  {"answer": 42}  "#).unwrap();
        assert_eq!(value, json!({"answer": 42}));
    }

    #[test]
    fn test_embedded_object_in_prose() {
        let raw = r#"Sure! Here is the data you asked for:
{"name": "Filing deadline", "days": 30}
Let me know if you need anything else."#;
        assert_eq!(
            parse_structured(raw).unwrap(),
            json!({"name": "Filing deadline", "days": 30})
        );
    }

    #[test]
    fn test_embedded_array_in_code_fence() {
        let raw = "```json\n[1, 2, {\"k\": [3]}]\n```";
        assert_eq!(parse_structured(raw).unwrap(), json!([1, 2, {"k": [3]}]));
    }

    #[test]
    fn test_brackets_inside_strings_are_ignored() {
        let raw = r#"Result: {"text": "a } tricky ] string \" with {braces}", "ok": true} trailing"#;
        let value = parse_structured(raw).unwrap();
        assert_eq!(value["ok"], json!(true));
        assert_eq!(value["text"], json!("a } tricky ] string \" with {braces}"));
    }

    #[test]
    fn test_prose_apostrophes_and_quotes_before_json() {
        let raw = r#"The model said "here you go": {"a": 1}"#;
        assert_eq!(parse_structured(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_bracketed_citation_before_json() {
        let raw = r#"Based on [Document 1], here is the result: {"days": 30}"#;
        assert_eq!(parse_structured(raw).unwrap(), json!({"days": 30}));
    }

    #[test]
    fn test_several_citations_before_json_array() {
        let raw = r#"Per [Document 2] and [Document 3]: ["April 15", "October 15"]"#;
        assert_eq!(parse_structured(raw).unwrap(), json!(["April 15", "October 15"]));
    }

    #[test]
    fn test_json_nested_in_non_json_brackets() {
        let raw = r#"(see [note: {"code": 7}])"#;
        assert_eq!(parse_structured(raw).unwrap(), json!({"code": 7}));
    }

    #[test]
    fn test_candidates_are_yielded_in_order() {
        let raw = r#"[Document 1] then {"a": 1} and [2]"#;
        let candidates: Vec<_> = balanced_json_candidates(raw).collect();
        assert_eq!(candidates, vec!["[Document 1]", r#"{"a": 1}"#, "[2]"]);
        assert_eq!(first_balanced_json(raw), Some("[Document 1]"));
    }

    #[test]
    fn test_unparseable_output_keeps_raw_text() {
        let raw = "I could not produce JSON, sorry.";
        match parse_structured(raw).unwrap_err() {
            GatewayError::MalformedStructuredOutput { raw: kept } => assert_eq!(kept, raw),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unbalanced_output_is_malformed() {
        let err = parse_structured(r#"{"a": [1, 2}"#).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedStructuredOutput { .. }));
    }

    #[test]
    fn test_prompt_decoration() {
        let schema = json!({"type": "object", "properties": {"days": {"type": "integer"}}});
        let prompt = structured_prompt("How long is the deadline?", &schema).unwrap();
        assert!(prompt.starts_with("How long is the deadline?"));
        assert!(prompt.contains("\"integer\""));
        assert!(prompt.contains("structured output only"));

        let system = structured_system_prompt(Some("You are a tax assistant."));
        assert!(system.starts_with("You are a tax assistant."));
        assert!(system.contains("structured output only"));
        assert_eq!(structured_system_prompt(None), OUTPUT_INSTRUCTION);
    }
}
