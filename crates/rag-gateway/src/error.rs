//! Error types shared by the generation and retrieval halves of the crate.

use thiserror::Error;

/// Errors that can occur while retrieving context or invoking a backend.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad input, rejected before anything is dispatched.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The client's sliding window is full. Never retried automatically.
    #[error("Rate limit exceeded, retry in {wait_seconds:.2}s")]
    RateLimitExceeded {
        /// Seconds until the oldest request in the window expires.
        wait_seconds: f64,
    },

    /// The backend rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No adapter is registered for the requested model id.
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// The backend answered with an error, or with a body the adapter could not read.
    #[error("Backend error{}: {message}", status_suffix(.status_code))]
    Backend {
        /// HTTP status, when the failure came from a response.
        status_code: Option<u16>,
        /// Backend-provided or locally built description.
        message: String,
    },

    /// The backend could not be reached, or the transport timed out.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Structured generation produced text that does not parse.
    #[error("Structured output could not be parsed")]
    MalformedStructuredOutput {
        /// The raw generated text, kept for diagnostics only.
        raw: String,
    },

    /// The embedding service or vector index failed.
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Every attempt of a retried call failed.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error raised by the final attempt.
        last_error: Box<GatewayError>,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn status_suffix(status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

impl GatewayError {
    /// Creates a backend error with an HTTP status code.
    pub fn backend(status_code: u16, message: impl Into<String>) -> Self {
        GatewayError::Backend {
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    /// Creates a backend error that did not come from an HTTP status.
    pub fn backend_message(message: impl Into<String>) -> Self {
        GatewayError::Backend {
            status_code: None,
            message: message.into(),
        }
    }

    /// Check if this error should trigger an automatic retry.
    ///
    /// Returns `true` for failures that are likely transient:
    /// - `Backend`: throttling, overloaded or erroring backend
    /// - `Connection`: network failures and transport timeouts
    /// - `Json`: a truncated or garbled response body
    ///
    /// Returns `false` for fail-fast errors: rate limiting, authentication,
    /// unsupported models, validation, configuration, malformed structured
    /// output, retrieval failures and an already exhausted retry loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Backend { .. } | GatewayError::Connection(_) | GatewayError::Json(_)
        )
    }

    /// Short label for the error kind, used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "validation",
            GatewayError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            GatewayError::Authentication(_) => "authentication",
            GatewayError::UnsupportedModel(_) => "unsupported_model",
            GatewayError::Backend { .. } => "backend",
            GatewayError::Connection(_) => "connection",
            GatewayError::MalformedStructuredOutput { .. } => "malformed_structured_output",
            GatewayError::Retrieval(_) => "retrieval",
            GatewayError::RetryExhausted { .. } => "retry_exhausted",
            GatewayError::Config(_) => "config",
            GatewayError::Json(_) => "json",
        }
    }

    /// Message that is safe to show to an end user.
    ///
    /// Raw backend payloads and unparseable model output are never included.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::RetryExhausted { .. }
            | GatewayError::Connection(_)
            | GatewayError::Backend { .. } => {
                "The service is temporarily unavailable. Please try again later.".to_string()
            }
            GatewayError::RateLimitExceeded { wait_seconds } => format!(
                "Too many requests. Please retry in {} seconds.",
                wait_seconds.ceil().max(1.0) as u64
            ),
            GatewayError::Validation(message) => format!("Invalid request: {message}"),
            GatewayError::Retrieval(_) => {
                "Relevant documents could not be retrieved right now.".to_string()
            }
            GatewayError::MalformedStructuredOutput { .. }
            | GatewayError::Authentication(_)
            | GatewayError::UnsupportedModel(_)
            | GatewayError::Config(_)
            | GatewayError::Json(_) => "An internal error occurred.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_backend_and_connection() {
        assert!(GatewayError::backend(503, "overloaded").is_retryable());
        assert!(GatewayError::backend_message("no text in response").is_retryable());
        assert!(GatewayError::Connection("refused".into()).is_retryable());
    }

    #[test]
    fn test_fail_fast_errors_are_not_retryable() {
        let errors = [
            GatewayError::RateLimitExceeded { wait_seconds: 1.0 },
            GatewayError::Authentication("bad key".into()),
            GatewayError::UnsupportedModel("acme.model".into()),
            GatewayError::Validation("empty prompt".into()),
            GatewayError::MalformedStructuredOutput { raw: "nope".into() },
            GatewayError::Retrieval("index down".into()),
            GatewayError::Config("missing endpoint".into()),
        ];

        for err in errors {
            assert!(!err.is_retryable(), "{} should fail fast", err.kind());
        }
    }

    #[test]
    fn test_retry_exhausted_is_not_retryable() {
        let err = GatewayError::RetryExhausted {
            attempts: 3,
            last_error: Box::new(GatewayError::Connection("timeout".into())),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_user_message_hides_raw_output() {
        let err = GatewayError::MalformedStructuredOutput {
            raw: "secret internal text".into(),
        };
        assert!(!err.user_message().contains("secret"));

        let err = GatewayError::RetryExhausted {
            attempts: 3,
            last_error: Box::new(GatewayError::backend(500, "stack trace")),
        };
        assert!(err.user_message().contains("temporarily unavailable"));
        assert!(!err.user_message().contains("stack trace"));
    }

    #[test]
    fn test_backend_display_includes_status() {
        let err = GatewayError::backend(429, "throttled");
        assert_eq!(err.to_string(), "Backend error (HTTP 429): throttled");

        let err = GatewayError::backend_message("empty body");
        assert_eq!(err.to_string(), "Backend error: empty body");
    }

    #[test]
    fn test_rate_limit_user_message_rounds_up() {
        let err = GatewayError::RateLimitExceeded { wait_seconds: 0.2 };
        assert!(err.user_message().contains("1 seconds"));
    }
}
