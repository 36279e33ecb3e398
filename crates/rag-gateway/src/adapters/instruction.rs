//! Instruction-bracket family (Mistral on hosted inference).
//!
//! The family has no system role, so the system prompt is folded into the
//! bracketed instruction ahead of the user prompt.

use super::{ModelFamily, decode_body, require_text};
use crate::error::{GatewayError, Result};
use crate::request::{FinishReason, GenerationParams, ParsedResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_TOP_P: f32 = 0.9;
const DEFAULT_TOP_K: u32 = 50;

/// Adapter for the instruction-bracket prompt schema.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstructionAdapter;

impl InstructionAdapter {
    /// Wraps the prompt in instruction brackets.
    pub fn render_prompt(prompt: &str, system_prompt: Option<&str>) -> String {
        match system_prompt.filter(|s| !s.trim().is_empty()) {
            Some(system) => format!("<s>[INST] {system}\n\n{prompt} [/INST]"),
            None => format!("<s>[INST] {prompt} [/INST]"),
        }
    }

    pub fn format(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        params: &GenerationParams,
    ) -> Result<Value> {
        let request = CompletionRequest {
            prompt: Self::render_prompt(prompt, system_prompt),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p.unwrap_or(DEFAULT_TOP_P),
            top_k: params.top_k.unwrap_or(DEFAULT_TOP_K),
        };

        Ok(serde_json::to_value(request)?)
    }

    pub fn parse(&self, body: &Value) -> Result<ParsedResponse> {
        let response: CompletionResponse = decode_body(ModelFamily::InstructionBracket, body)?;

        let output = response.outputs.into_iter().next().ok_or_else(|| {
            GatewayError::backend_message("instruction-bracket response contained no outputs")
        })?;

        Ok(ParsedResponse {
            text: require_text(
                ModelFamily::InstructionBracket,
                output.text.trim().to_string(),
            )?,
            finish_reason: FinishReason::from_backend(output.stop_reason.as_deref()),
            usage: None,
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest {
    prompt: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    outputs: Vec<Output>,
}

#[derive(Deserialize)]
struct Output {
    text: String,
    #[serde(default)]
    stop_reason: Option<String>,
}
