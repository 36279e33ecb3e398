//! Role-delimited completion family (Meta Llama 3 on hosted inference).
//!
//! The whole conversation is rendered into one prompt string using header
//! tokens per role; the output budget is sent as `max_gen_len`.

use super::{ModelFamily, decode_body, require_text};
use crate::error::Result;
use crate::request::{FinishReason, GenerationParams, ParsedResponse, TokenUsage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
const END_OF_TURN: &str = "<|eot_id|>";

/// Adapter for the role-delimited prompt schema.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoleDelimitedAdapter;

impl RoleDelimitedAdapter {
    /// Renders the role-delimited prompt string.
    pub fn render_prompt(prompt: &str, system_prompt: Option<&str>) -> String {
        let mut rendered = String::from(BEGIN_OF_TEXT);
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            rendered.push_str(&turn("system", system));
        }
        rendered.push_str(&turn("user", prompt));
        rendered.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
        rendered
    }

    pub fn format(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        params: &GenerationParams,
    ) -> Result<Value> {
        let request = CompletionRequest {
            prompt: Self::render_prompt(prompt, system_prompt),
            max_gen_len: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        };

        Ok(serde_json::to_value(request)?)
    }

    pub fn parse(&self, body: &Value) -> Result<ParsedResponse> {
        let response: CompletionResponse = decode_body(ModelFamily::RoleDelimited, body)?;

        let usage = if response.prompt_token_count.is_some()
            || response.generation_token_count.is_some()
        {
            Some(TokenUsage {
                input_tokens: response.prompt_token_count,
                output_tokens: response.generation_token_count,
            })
        } else {
            None
        };

        Ok(ParsedResponse {
            text: require_text(
                ModelFamily::RoleDelimited,
                response.generation.trim().to_string(),
            )?,
            finish_reason: FinishReason::from_backend(response.stop_reason.as_deref()),
            usage,
        })
    }
}

fn turn(role: &str, content: &str) -> String {
    format!("<|start_header_id|>{role}<|end_header_id|>\n\n{content}{END_OF_TURN}")
}

#[derive(Serialize)]
struct CompletionRequest {
    prompt: String,
    max_gen_len: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    generation: String,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    generation_token_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use serde_json::json;

    #[test]
    fn test_prompt_rendering_without_system() {
        let rendered = RoleDelimitedAdapter::render_prompt("What is Rust?", None);
        assert_eq!(
            rendered,
            "<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n\nWhat is Rust?<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>\n\n"
        );
    }

    #[test]
    fn test_prompt_rendering_with_system() {
        let rendered = RoleDelimitedAdapter::render_prompt("Hi", Some("Be terse"));
        let system_at = rendered.find("system<|end_header_id|>\n\nBe terse").unwrap();
        let user_at = rendered.find("user<|end_header_id|>\n\nHi").unwrap();
        assert!(system_at < user_at);
        assert!(rendered.ends_with("assistant<|end_header_id|>\n\n"));
    }

    #[test]
    fn test_request_shape() {
        let body = RoleDelimitedAdapter
            .format("Hi", None, &GenerationParams::new(0.2, 300))
            .unwrap();
        assert_eq!(body["max_gen_len"], 300);
        assert!(body["prompt"].as_str().unwrap().starts_with(BEGIN_OF_TEXT));
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let body = json!({
            "generation": "  Rust is a systems language.\n",
            "prompt_token_count": 20,
            "generation_token_count": 8,
            "stop_reason": "length"
        });

        let parsed = RoleDelimitedAdapter.parse(&body).unwrap();
        assert_eq!(parsed.text, "Rust is a systems language.");
        assert_eq!(parsed.finish_reason, FinishReason::Length);
        assert_eq!(parsed.usage.unwrap().output_tokens, Some(8));
    }

    #[test]
    fn test_response_parsing_missing_generation() {
        let err = RoleDelimitedAdapter
            .parse(&json!({"outputs": []}))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Backend { .. }));
    }
}
