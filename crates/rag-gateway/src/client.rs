//! The generation client: rate limiting, model adapters, transport and retry.
//!
//! # Example
//!
//! ```rust,no_run
//! use rag_gateway::client::GenerationClient;
//! use rag_gateway::config::GatewayConfig;
//! use rag_gateway::request::GenerationRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GenerationClient::from_config(GatewayConfig::from_env()?)?;
//!
//! let request = GenerationRequest::new("List the quarterly filing deadlines.")
//!     .with_system_prompt("You are a compliance assistant.")
//!     .with_temperature(0.3);
//! let text = client.generate_with_retry(&request, 3).await?;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

use crate::adapters::ModelAdapter;
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::rate_limit::RateLimiter;
use crate::request::{GenerationParams, GenerationRequest, GenerationResult};
use crate::retry::{BackoffExecutor, BackoffPolicy, Traced};
use crate::structured;
use crate::transport::{HttpTransport, Transport};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Where a single generation call is in its lifecycle.
///
/// `Idle → RateChecked → Formatted → Dispatched → Parsed`, or `Failed` from
/// any phase. Both `Parsed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    RateChecked,
    Formatted,
    Dispatched,
    Parsed,
    /// Carries the [`GatewayError::kind`](crate::error::GatewayError::kind) label.
    Failed(&'static str),
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallPhase::Idle => f.write_str("idle"),
            CallPhase::RateChecked => f.write_str("rate_checked"),
            CallPhase::Formatted => f.write_str("formatted"),
            CallPhase::Dispatched => f.write_str("dispatched"),
            CallPhase::Parsed => f.write_str("parsed"),
            CallPhase::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// Client for hosted text-generation backends.
///
/// Owns exactly one [`RateLimiter`]; every call made through the same client
/// shares its window. Wrap the client in an `Arc` to share it between tasks.
pub struct GenerationClient {
    config: GatewayConfig,
    limiter: RateLimiter,
    transport: Arc<dyn Transport>,
    executor: BackoffExecutor,
}

impl GenerationClient {
    /// Creates a client that dispatches through `transport`.
    pub fn new(config: GatewayConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let limiter = RateLimiter::new(config.max_requests, config.window());
        let executor =
            BackoffExecutor::new(BackoffPolicy::new(config.max_retries, config.base_delay()));

        Ok(Self {
            config,
            limiter,
            transport,
            executor,
        })
    }

    /// Creates a client backed by an [`HttpTransport`] built from `config`.
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Self::new(config, Arc::new(transport))
    }

    /// Replaces the backoff schedule used by the retrying calls.
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.executor = BackoffExecutor::new(policy);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Generates text for `request`.
    ///
    /// Rate limiting is checked first and fails fast. The request is never
    /// retried here; see [`generate_with_retry`](Self::generate_with_retry).
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.generate_result(request).await.map(|result| result.text)
    }

    /// Like [`generate`](Self::generate), but returns usage and finish reason too.
    #[tracing::instrument(name = "generate", skip_all, fields(model))]
    pub async fn generate_result(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);
        tracing::Span::current().record("model", model);

        let mut phase = CallPhase::Idle;
        match self.dispatch(request, model, &mut phase).await {
            Ok(result) => {
                tracing::debug!(
                    phase = %CallPhase::Parsed,
                    finish_reason = ?result.finish_reason,
                    chars = result.text.len(),
                    "generation completed"
                );
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(
                    phase = %CallPhase::Failed(e.kind()),
                    after = %phase,
                    error = %e,
                    "generation failed"
                );
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        request: &GenerationRequest,
        model: &str,
        phase: &mut CallPhase,
    ) -> Result<GenerationResult> {
        self.limiter.check()?;
        advance(phase, CallPhase::RateChecked);

        let adapter = ModelAdapter::for_model(model)?;
        let params = GenerationParams::new(
            request.temperature,
            request.max_tokens.unwrap_or(self.config.default_max_tokens),
        );
        let body = adapter.format(&request.prompt, request.system_prompt.as_deref(), &params)?;
        advance(phase, CallPhase::Formatted);

        advance(phase, CallPhase::Dispatched);
        let response = self.transport.invoke(model, &body).await?;

        let parsed = adapter.parse(&response)?;
        Ok(GenerationResult::from_parsed(model, parsed))
    }

    /// Generates text, retrying transient failures with exponential backoff.
    ///
    /// `max_retries` is the total number of attempts. Rate limiting,
    /// authentication and other non-retryable errors abort immediately; after
    /// the last attempt the error is [`GatewayError::RetryExhausted`](crate::error::GatewayError::RetryExhausted).
    pub async fn generate_with_retry(
        &self,
        request: &GenerationRequest,
        max_retries: u32,
    ) -> Result<String> {
        self.generate_with_retry_traced(request, max_retries)
            .await
            .result
    }

    /// Like [`generate_with_retry`](Self::generate_with_retry), but also reports every attempt.
    pub async fn generate_with_retry_traced(
        &self,
        request: &GenerationRequest,
        max_retries: u32,
    ) -> Traced<String> {
        let executor = BackoffExecutor::new(BackoffPolicy {
            max_attempts: max_retries,
            ..self.executor.policy().clone()
        });
        executor.execute_traced(|_| self.generate(request)).await
    }

    /// Generates a JSON value that is expected to conform to `schema`.
    ///
    /// The schema and a structured-output instruction are appended to both
    /// prompts, and the configured structured temperature replaces whatever
    /// temperature the caller would otherwise use.
    pub async fn generate_structured(
        &self,
        prompt: &str,
        schema: &Value,
        system_prompt: Option<&str>,
        model: Option<&str>,
    ) -> Result<Value> {
        let mut request = GenerationRequest::new(structured::structured_prompt(prompt, schema)?)
            .with_system_prompt(structured::structured_system_prompt(system_prompt))
            .with_temperature(self.config.structured_temperature);
        if let Some(model) = model {
            request = request.with_model(model);
        }

        let raw = self.generate(&request).await?;
        structured::parse_structured(&raw)
    }

    /// Typed variant of [`generate_structured`](Self::generate_structured).
    ///
    /// The schema is derived from `T`; a value that parses as JSON but does
    /// not deserialize into `T` is also malformed output.
    #[cfg(feature = "schema")]
    pub async fn generate_structured_as<T>(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        model: Option<&str>,
    ) -> Result<T>
    where
        T: serde::de::DeserializeOwned + schemars::JsonSchema,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))?;
        let value = self
            .generate_structured(prompt, &schema, system_prompt, model)
            .await?;

        serde_json::from_value(value.clone()).map_err(|e| {
            log::debug!("Structured value did not match target type: {}", e);
            crate::error::GatewayError::MalformedStructuredOutput {
                raw: value.to_string(),
            }
        })
    }
}

fn advance(phase: &mut CallPhase, next: CallPhase) {
    tracing::trace!(from = %phase, to = %next, "call phase");
    *phase = next;
}
