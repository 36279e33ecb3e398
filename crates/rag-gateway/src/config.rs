//! Configuration for the generation client and the retrieval pipeline.
//!
//! Both config types can be built three ways: from `Default` plus `with_*`
//! builders, from environment variables (`from_env`), or from a JSON document
//! (`from_json_str` / `from_json_file`). Missing JSON fields fall back to the
//! defaults below.
//!
//! # Example
//!
//! ```rust
//! use rag_gateway::config::{GatewayConfig, RetrievalConfig};
//!
//! let gateway = GatewayConfig::default()
//!     .with_rate_limit(3, 1)
//!     .with_max_retries(5);
//! assert!(gateway.validate().is_ok());
//!
//! let retrieval = RetrievalConfig::default().with_relevance_threshold(0.3);
//! assert_eq!(retrieval.top_k, 5);
//! ```

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

const ENV_PREFIX: &str = "RAG_GATEWAY_";

const DEFAULT_ENDPOINT: &str = "http://localhost:8080";
const DEFAULT_MODEL: &str = "anthropic.claude-3-5-sonnet-20240620-v1:0";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_REQUESTS: usize = 60;
const DEFAULT_WINDOW_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 1000;
const DEFAULT_STRUCTURED_TEMPERATURE: f32 = 0.1;
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Settings for [`GenerationClient`](crate::client::GenerationClient) and its transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the inference backend.
    pub endpoint: String,
    /// Bearer token sent with every backend request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model used when the caller does not name one.
    pub default_model: String,
    /// Transport connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Transport read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Maximum calls admitted per sliding window.
    pub max_requests: usize,
    /// Length of the sliding window in seconds.
    pub window_secs: u64,
    /// Total attempts made by `generate_with_retry` when the caller gives none.
    pub max_retries: u32,
    /// First backoff delay; doubles after every failed attempt.
    pub base_delay_ms: u64,
    /// Temperature forced onto structured generation.
    pub structured_temperature: f32,
    /// Output token budget when the caller gives none.
    pub default_max_tokens: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            default_model: DEFAULT_MODEL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            max_requests: DEFAULT_MAX_REQUESTS,
            window_secs: DEFAULT_WINDOW_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            structured_temperature: DEFAULT_STRUCTURED_TEMPERATURE,
            default_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Environment variables (all optional):
    /// - `RAG_GATEWAY_ENDPOINT`
    /// - `RAG_GATEWAY_API_KEY`
    /// - `RAG_GATEWAY_MODEL`
    /// - `RAG_GATEWAY_CONNECT_TIMEOUT_SECS`, `RAG_GATEWAY_READ_TIMEOUT_SECS`
    /// - `RAG_GATEWAY_MAX_REQUESTS`, `RAG_GATEWAY_WINDOW_SECS`
    /// - `RAG_GATEWAY_MAX_RETRIES`, `RAG_GATEWAY_BASE_DELAY_MS`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(endpoint) = env_var("ENDPOINT") {
            config.endpoint = endpoint;
        }
        config.api_key = env_var("API_KEY").or(config.api_key);
        if let Some(model) = env_var("MODEL") {
            config.default_model = model;
        }
        if let Some(secs) = env_parse("CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("READ_TIMEOUT_SECS")? {
            config.read_timeout_secs = secs;
        }
        if let Some(max) = env_parse("MAX_REQUESTS")? {
            config.max_requests = max;
        }
        if let Some(secs) = env_parse("WINDOW_SECS")? {
            config.window_secs = secs;
        }
        if let Some(retries) = env_parse("MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(ms) = env_parse("BASE_DELAY_MS")? {
            config.base_delay_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GatewayError::Config(format!("invalid gateway config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&read_config_file(path.as_ref())?)
    }

    /// Sets the backend endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the default model id.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Sets the sliding-window limit.
    pub fn with_rate_limit(mut self, max_requests: usize, window_secs: u64) -> Self {
        self.max_requests = max_requests;
        self.window_secs = window_secs;
        self
    }

    /// Sets the default number of attempts for retried calls.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the first backoff delay in milliseconds.
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Sets both transport timeouts in seconds.
    pub fn with_timeouts(mut self, connect_secs: u64, read_secs: u64) -> Self {
        self.connect_timeout_secs = connect_secs;
        self.read_timeout_secs = read_secs;
        self
    }

    /// Sets the temperature used for structured generation.
    pub fn with_structured_temperature(mut self, temperature: f32) -> Self {
        self.structured_temperature = temperature;
        self
    }

    /// Sets the default output token budget.
    pub fn with_default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Parses the endpoint as a URL.
    pub fn endpoint_url(&self) -> Result<Url> {
        Url::parse(&self.endpoint)
            .map_err(|e| GatewayError::Config(format!("invalid endpoint '{}': {e}", self.endpoint)))
    }

    /// Checks that every limit is usable.
    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;
        if self.default_model.trim().is_empty() {
            return Err(GatewayError::Config("default_model must not be empty".into()));
        }
        if self.max_requests == 0 {
            return Err(GatewayError::Config("max_requests must be at least 1".into()));
        }
        if self.window_secs == 0 {
            return Err(GatewayError::Config("window_secs must be at least 1".into()));
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(GatewayError::Config("timeouts must be at least 1 second".into()));
        }
        if !(0.0..=1.0).contains(&self.structured_temperature) {
            return Err(GatewayError::Config(
                "structured_temperature must be within [0, 1]".into(),
            ));
        }
        if self.default_max_tokens == 0 {
            return Err(GatewayError::Config("default_max_tokens must be at least 1".into()));
        }
        Ok(())
    }
}

/// Settings for the retriever, ranker, context builder and source extractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Capability flag. When false, no retriever is constructed.
    pub enabled: bool,
    /// Documents kept after ranking when the caller gives no count.
    pub top_k: usize,
    /// Candidate multiplier applied when filters or authority boosting are active.
    pub overfetch_factor: usize,
    /// Metadata key holding a document's source provenance.
    pub authority_field: String,
    /// Provenance values that receive the authority boost.
    pub authoritative_sources: Vec<String>,
    /// Score added to authoritative documents (result capped at 1.0).
    pub authority_boost: f32,
    /// Documents scoring below this after boosting are dropped.
    pub relevance_threshold: f32,
    /// Character budget for the packed context.
    pub max_context_length: usize,
    /// Metadata keys copied onto citation records.
    pub citation_metadata_keys: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 5,
            overfetch_factor: 3,
            authority_field: "source_type".to_string(),
            authoritative_sources: vec![
                "government".to_string(),
                "official".to_string(),
                "regulatory".to_string(),
            ],
            authority_boost: 0.1,
            relevance_threshold: 0.0,
            max_context_length: 8000,
            citation_metadata_keys: vec![
                "source_type".to_string(),
                "jurisdiction".to_string(),
                "published_at".to_string(),
            ],
        }
    }
}

impl RetrievalConfig {
    /// Loads configuration from environment variables.
    ///
    /// Environment variables (all optional):
    /// - `RAG_GATEWAY_RETRIEVAL_ENABLED`
    /// - `RAG_GATEWAY_TOP_K`
    /// - `RAG_GATEWAY_AUTHORITATIVE_SOURCES` (comma separated)
    /// - `RAG_GATEWAY_AUTHORITY_BOOST`
    /// - `RAG_GATEWAY_RELEVANCE_THRESHOLD`
    /// - `RAG_GATEWAY_MAX_CONTEXT_LENGTH`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(enabled) = env_parse("RETRIEVAL_ENABLED")? {
            config.enabled = enabled;
        }
        if let Some(top_k) = env_parse("TOP_K")? {
            config.top_k = top_k;
        }
        if let Some(sources) = env_var("AUTHORITATIVE_SOURCES") {
            config.authoritative_sources = sources
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(boost) = env_parse("AUTHORITY_BOOST")? {
            config.authority_boost = boost;
        }
        if let Some(threshold) = env_parse("RELEVANCE_THRESHOLD")? {
            config.relevance_threshold = threshold;
        }
        if let Some(length) = env_parse("MAX_CONTEXT_LENGTH")? {
            config.max_context_length = length;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GatewayError::Config(format!("invalid retrieval config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&read_config_file(path.as_ref())?)
    }

    /// Enables or disables retrieval.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Replaces the authoritative source allow-list.
    pub fn with_authoritative_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authoritative_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_authority_field(mut self, field: impl Into<String>) -> Self {
        self.authority_field = field.into();
        self
    }

    pub fn with_authority_boost(mut self, boost: f32) -> Self {
        self.authority_boost = boost;
        self
    }

    pub fn with_relevance_threshold(mut self, threshold: f32) -> Self {
        self.relevance_threshold = threshold;
        self
    }

    pub fn with_max_context_length(mut self, max_context_length: usize) -> Self {
        self.max_context_length = max_context_length;
        self
    }

    /// Whether the ranker will boost anything under this configuration.
    pub fn boosting_active(&self) -> bool {
        self.authority_boost > 0.0 && !self.authoritative_sources.is_empty()
    }

    /// Checks that every limit is usable.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(GatewayError::Config("top_k must be at least 1".into()));
        }
        if self.overfetch_factor == 0 {
            return Err(GatewayError::Config("overfetch_factor must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.authority_boost) {
            return Err(GatewayError::Config("authority_boost must be within [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(GatewayError::Config(
                "relevance_threshold must be within [0, 1]".into(),
            ));
        }
        if self.max_context_length == 0 {
            return Err(GatewayError::Config("max_context_length must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_var(name) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            GatewayError::Config(format!("{ENV_PREFIX}{name} has an invalid value: {raw}"))
        }),
        None => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        GatewayError::Config(format!("failed to read config file {}: {e}", path.display()))
    })
}
