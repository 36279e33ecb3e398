//! Chat-message family (Anthropic Claude on hosted inference).
//!
//! Requests carry a message array, a top-level `system` field and a version
//! tag; responses carry a list of typed content blocks.

use super::{ModelFamily, decode_body, require_text};
use crate::error::Result;
use crate::request::{FinishReason, GenerationParams, ParsedResponse, TokenUsage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Adapter for the chat-message request schema.
#[derive(Debug, Clone, PartialEq)]
pub struct MessagesAdapter {
    version: String,
}

impl Default for MessagesAdapter {
    fn default() -> Self {
        Self {
            version: ANTHROPIC_VERSION.to_string(),
        }
    }
}

impl MessagesAdapter {
    /// Overrides the version tag sent with every request.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn format(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        params: &GenerationParams,
    ) -> Result<Value> {
        let request = CreateMessageRequest {
            anthropic_version: self.version.clone(),
            max_tokens: params.max_tokens,
            system: system_prompt
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![ContentBlock::Text {
                    text: prompt.to_string(),
                }],
            }],
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
        };

        Ok(serde_json::to_value(request)?)
    }

    pub fn parse(&self, body: &Value) -> Result<ParsedResponse> {
        let response: CreateMessageResponse = decode_body(ModelFamily::Messages, body)?;

        let text: String = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlockResponse::Text { text } => Some(text),
                ContentBlockResponse::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(ParsedResponse {
            text: require_text(ModelFamily::Messages, text)?,
            finish_reason: FinishReason::from_backend(response.stop_reason.as_deref()),
            usage: response.usage.map(|usage| TokenUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            }),
        })
    }
}

#[derive(Serialize)]
struct CreateMessageRequest {
    anthropic_version: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
}

#[derive(Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlockResponse>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlockResponse {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}
