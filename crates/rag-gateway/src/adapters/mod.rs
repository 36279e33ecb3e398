//! Backend model adapters.
//!
//! Each hosted model family speaks its own request/response schema. An adapter
//! turns a prompt, optional system prompt and [`GenerationParams`] into the
//! family's request body, and pulls the generated text back out of its response
//! body. Adapters are pure and stateless.
//!
//! Families are a closed set selected through a prefix lookup table on the
//! model id. Supporting a new family means adding a [`ModelFamily`] variant, a
//! row in the table and an adapter module; call sites never branch on ids.
//!
//! | Family | Model id prefix | Request shape |
//! |--------|-----------------|---------------|
//! | [`ModelFamily::Messages`] | `anthropic.` | message array, top-level `system`, version tag |
//! | [`ModelFamily::RoleDelimited`] | `meta.` | role-delimited prompt string, `max_gen_len` |
//! | [`ModelFamily::InstructionBracket`] | `mistral.` | `[INST]`-wrapped prompt, `top_k` / `top_p` |
//!
//! # Example
//!
//! ```rust
//! use rag_gateway::adapters::{ModelAdapter, ModelFamily};
//! use rag_gateway::request::GenerationParams;
//!
//! let adapter = ModelAdapter::for_model("us.meta.llama3-8b-instruct-v1:0").unwrap();
//! assert_eq!(adapter.family(), ModelFamily::RoleDelimited);
//!
//! let body = adapter
//!     .format("What is RAG?", None, &GenerationParams::new(0.5, 256))
//!     .unwrap();
//! assert_eq!(body["max_gen_len"], 256);
//! ```

pub mod instruction;
pub mod messages;
pub mod role_delimited;

pub use instruction::InstructionAdapter;
pub use messages::MessagesAdapter;
pub use role_delimited::RoleDelimitedAdapter;

use crate::error::{GatewayError, Result};
use crate::request::{GenerationParams, ParsedResponse};
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

/// Hosted model families with distinct wire schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    /// Chat-message style with a top-level system field.
    Messages,
    /// Single role-delimited prompt string.
    RoleDelimited,
    /// Instruction-bracket wrapped prompt.
    InstructionBracket,
}

/// Model id prefix → family.
const MODEL_FAMILIES: &[(&str, ModelFamily)] = &[
    ("anthropic.", ModelFamily::Messages),
    ("meta.", ModelFamily::RoleDelimited),
    ("mistral.", ModelFamily::InstructionBracket),
];

/// Sampling temperatures accepted by every family.
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=1.0;

// Cross-region inference profiles prefix the model id with a geography.
static REGION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:us|eu|apac|us-gov|global)\.").expect("region prefix pattern is valid")
});

impl ModelFamily {
    /// Resolves the family serving `model_id`.
    pub fn resolve(model_id: &str) -> Result<Self> {
        let normalized = normalize_model_id(model_id);
        MODEL_FAMILIES
            .iter()
            .find(|(prefix, _)| normalized.starts_with(prefix))
            .map(|(_, family)| *family)
            .ok_or_else(|| GatewayError::UnsupportedModel(model_id.to_string()))
    }

    /// Largest output token budget the family accepts.
    pub fn max_output_tokens(&self) -> u32 {
        match self {
            ModelFamily::Messages => 8192,
            ModelFamily::RoleDelimited => 2048,
            ModelFamily::InstructionBracket => 8192,
        }
    }

    /// Checks prompt and sampling parameters against the family's limits.
    pub fn validate(&self, prompt: &str, params: &GenerationParams) -> Result<()> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::Validation("prompt must not be empty".into()));
        }
        let range = TEMPERATURE_RANGE;
        if !range.contains(&params.temperature) {
            return Err(GatewayError::Validation(format!(
                "temperature {} is outside [{}, {}] for {} models",
                params.temperature,
                range.start(),
                range.end(),
                self
            )));
        }
        if params.max_tokens == 0 || params.max_tokens > self.max_output_tokens() {
            return Err(GatewayError::Validation(format!(
                "max_tokens {} is outside [1, {}] for {} models",
                params.max_tokens,
                self.max_output_tokens(),
                self
            )));
        }
        if let Some(top_p) = params.top_p
            && !(0.0..=1.0).contains(&top_p)
        {
            return Err(GatewayError::Validation(format!(
                "top_p {top_p} is outside [0, 1]"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFamily::Messages => "messages",
            ModelFamily::RoleDelimited => "role-delimited",
            ModelFamily::InstructionBracket => "instruction-bracket",
        };
        f.write_str(name)
    }
}

/// Strips a cross-region inference profile prefix from a model id.
pub fn normalize_model_id(model_id: &str) -> &str {
    match REGION_PREFIX.find(model_id) {
        Some(m) => &model_id[m.end()..],
        None => model_id,
    }
}

/// One adapter per model family.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelAdapter {
    Messages(MessagesAdapter),
    RoleDelimited(RoleDelimitedAdapter),
    InstructionBracket(InstructionAdapter),
}

impl ModelAdapter {
    /// Selects the adapter for `model_id`.
    ///
    /// Fails with [`GatewayError::UnsupportedModel`] for ids outside the lookup table.
    pub fn for_model(model_id: &str) -> Result<Self> {
        Ok(Self::for_family(ModelFamily::resolve(model_id)?))
    }

    pub fn for_family(family: ModelFamily) -> Self {
        match family {
            ModelFamily::Messages => ModelAdapter::Messages(MessagesAdapter::default()),
            ModelFamily::RoleDelimited => ModelAdapter::RoleDelimited(RoleDelimitedAdapter),
            ModelFamily::InstructionBracket => {
                ModelAdapter::InstructionBracket(InstructionAdapter)
            }
        }
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            ModelAdapter::Messages(_) => ModelFamily::Messages,
            ModelAdapter::RoleDelimited(_) => ModelFamily::RoleDelimited,
            ModelAdapter::InstructionBracket(_) => ModelFamily::InstructionBracket,
        }
    }

    /// Builds the backend request body after validating the parameters.
    pub fn format(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        params: &GenerationParams,
    ) -> Result<Value> {
        self.family().validate(prompt, params)?;
        match self {
            ModelAdapter::Messages(adapter) => adapter.format(prompt, system_prompt, params),
            ModelAdapter::RoleDelimited(adapter) => adapter.format(prompt, system_prompt, params),
            ModelAdapter::InstructionBracket(adapter) => {
                adapter.format(prompt, system_prompt, params)
            }
        }
    }

    /// Extracts the generated text from a backend response body.
    pub fn parse(&self, body: &Value) -> Result<ParsedResponse> {
        match self {
            ModelAdapter::Messages(adapter) => adapter.parse(body),
            ModelAdapter::RoleDelimited(adapter) => adapter.parse(body),
            ModelAdapter::InstructionBracket(adapter) => adapter.parse(body),
        }
    }
}

/// Formats a request body for `model_id` in one step.
pub fn format_request(
    model_id: &str,
    prompt: &str,
    system_prompt: Option<&str>,
    params: &GenerationParams,
) -> Result<Value> {
    ModelAdapter::for_model(model_id)?.format(prompt, system_prompt, params)
}

/// Parses a response body for `model_id` in one step.
pub fn parse_response(model_id: &str, body: &Value) -> Result<ParsedResponse> {
    ModelAdapter::for_model(model_id)?.parse(body)
}

/// Deserializes a response body, mapping shape mismatches to a backend error.
pub(crate) fn decode_body<T: serde::de::DeserializeOwned>(
    family: ModelFamily,
    body: &Value,
) -> Result<T> {
    serde_json::from_value(body.clone()).map_err(|e| {
        GatewayError::backend_message(format!("unexpected {family} response shape: {e}"))
    })
}

/// Rejects a generation with no text so it surfaces as a retryable backend error.
pub(crate) fn require_text(family: ModelFamily, text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(GatewayError::backend_message(format!(
            "{family} response contained no generated text"
        )));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_families() {
        assert_eq!(
            ModelFamily::resolve("anthropic.claude-3-haiku-20240307-v1:0").unwrap(),
            ModelFamily::Messages
        );
        assert_eq!(
            ModelFamily::resolve("meta.llama3-70b-instruct-v1:0").unwrap(),
            ModelFamily::RoleDelimited
        );
        assert_eq!(
            ModelFamily::resolve("mistral.mistral-large-2402-v1:0").unwrap(),
            ModelFamily::InstructionBracket
        );
    }

    #[test]
    fn test_resolve_strips_region_prefix() {
        assert_eq!(
            normalize_model_id("eu.anthropic.claude-3-5-sonnet-20240620-v1:0"),
            "anthropic.claude-3-5-sonnet-20240620-v1:0"
        );
        assert_eq!(
            ModelFamily::resolve("apac.mistral.mistral-7b-instruct-v0:2").unwrap(),
            ModelFamily::InstructionBracket
        );
        assert_eq!(normalize_model_id("meta.llama3"), "meta.llama3");
    }

    #[test]
    fn test_unknown_model_fails_at_format_and_parse() {
        let params = GenerationParams::new(0.5, 100);
        let format_err = format_request("acme.model-x", "hi", None, &params).unwrap_err();
        let parse_err = parse_response("acme.model-x", &json!({"text": "hi"})).unwrap_err();

        assert!(matches!(format_err, GatewayError::UnsupportedModel(ref id) if id == "acme.model-x"));
        assert!(matches!(parse_err, GatewayError::UnsupportedModel(ref id) if id == "acme.model-x"));
    }

    #[test]
    fn test_validation_rejects_out_of_range_temperature() {
        let adapter = ModelAdapter::for_family(ModelFamily::Messages);
        let err = adapter
            .format("hi", None, &GenerationParams::new(1.5, 100))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn test_validation_rejects_token_budget_over_family_limit() {
        let adapter = ModelAdapter::for_family(ModelFamily::RoleDelimited);
        assert!(adapter.format("hi", None, &GenerationParams::new(0.5, 2048)).is_ok());
        let err = adapter
            .format("hi", None, &GenerationParams::new(0.5, 4096))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn test_validation_rejects_empty_prompt() {
        let adapter = ModelAdapter::for_family(ModelFamily::InstructionBracket);
        let err = adapter
            .format("   ", None, &GenerationParams::new(0.5, 100))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn test_temperature_bounds_are_shared_by_all_families() {
        for family in [
            ModelFamily::Messages,
            ModelFamily::RoleDelimited,
            ModelFamily::InstructionBracket,
        ] {
            let adapter = ModelAdapter::for_family(family);
            assert!(adapter.format("hi", None, &GenerationParams::new(0.0, 100)).is_ok());
            assert!(adapter.format("hi", None, &GenerationParams::new(1.0, 100)).is_ok());
            assert!(adapter.format("hi", None, &GenerationParams::new(-0.1, 100)).is_err());
        }
    }

    #[test]
    fn test_empty_generation_is_retryable_for_every_family() {
        let empty_bodies = [
            (ModelFamily::Messages, json!({"content": [{"type": "text", "text": "  "}]})),
            (ModelFamily::RoleDelimited, json!({"generation": "\n"})),
            (ModelFamily::InstructionBracket, json!({"outputs": [{"text": ""}]})),
        ];

        for (family, body) in empty_bodies {
            let err = ModelAdapter::for_family(family).parse(&body).unwrap_err();
            assert!(matches!(err, GatewayError::Backend { .. }), "{family}: {err:?}");
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_adapter_family_round_trip() {
        for family in [
            ModelFamily::Messages,
            ModelFamily::RoleDelimited,
            ModelFamily::InstructionBracket,
        ] {
            assert_eq!(ModelAdapter::for_family(family).family(), family);
        }
    }
}
