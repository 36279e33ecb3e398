//! Per-call value types for text generation.

use serde::{Deserialize, Serialize};

/// A unified generation request, independent of any backend wire format.
///
/// # Examples
///
/// ```rust
/// use rag_gateway::request::GenerationRequest;
///
/// let request = GenerationRequest::new("Summarise the filing rules.")
///     .with_system_prompt("Answer in two sentences.")
///     .with_temperature(0.2)
///     .with_model("anthropic.claude-3-haiku-20240307-v1:0");
/// assert_eq!(request.max_tokens, None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub temperature: f32,
    /// Output token budget; the client default applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Target model id; the client default applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GenerationRequest {
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: Self::DEFAULT_TEMPERATURE,
            max_tokens: None,
            model: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Sampling parameters handed to a model adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

impl GenerationParams {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
            top_p: None,
            top_k: None,
        }
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the answer or a stop sequence.
    Stop,
    /// The output token budget ran out.
    Length,
    /// The backend did not say.
    Unknown,
    /// A backend-specific reason with no common equivalent.
    Other(String),
}

impl FinishReason {
    /// Normalises a backend stop-reason string.
    pub fn from_backend(reason: Option<&str>) -> Self {
        match reason {
            None => FinishReason::Unknown,
            Some("end_turn" | "stop_sequence" | "stop") => FinishReason::Stop,
            Some("max_tokens" | "length") => FinishReason::Length,
            Some(other) => FinishReason::Other(other.to_string()),
        }
    }
}

/// Token counts reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

impl TokenUsage {
    pub fn total(&self) -> Option<u32> {
        match (self.input_tokens, self.output_tokens) {
            (None, None) => None,
            (input, output) => Some(input.unwrap_or(0).saturating_add(output.unwrap_or(0))),
        }
    }
}

/// What a model adapter extracted from a backend response body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Option<TokenUsage>,
}

/// The outcome of one successful generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Model id the request was sent to.
    pub model: String,
    pub finish_reason: FinishReason,
}

impl GenerationResult {
    pub(crate) fn from_parsed(model: impl Into<String>, parsed: ParsedResponse) -> Self {
        Self {
            text: parsed.text,
            usage: parsed.usage,
            model: model.into(),
            finish_reason: parsed.finish_reason,
        }
    }
}
