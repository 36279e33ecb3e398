//! Transport seam between the generation client and a hosted model backend.
//!
//! [`Transport`] is the boundary a [`GenerationClient`](crate::client::GenerationClient)
//! sends formatted request bodies through. [`HttpTransport`] is the production
//! implementation; tests inject their own.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// Sends one formatted request body to a model and returns the raw response body.
///
/// Implementations map failures onto the crate's error taxonomy: rejected
/// credentials are [`GatewayError::Authentication`], unreachable backends are
/// [`GatewayError::Connection`] and any other backend failure is
/// [`GatewayError::Backend`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(&self, model_id: &str, body: &Value) -> Result<Value>;
}

/// JSON-over-HTTP transport for hosted inference endpoints.
///
/// Requests are `POST {endpoint}/model/{model_id}/invoke` with a bearer token
/// when an API key is configured.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpTransport {
    /// Builds a transport with the timeouts and credentials from `config`.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint_url()?,
            api_key: config.api_key.clone(),
        })
    }

    /// Replaces the underlying HTTP client, e.g. to share a connection pool.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// URL the request for `model_id` is posted to.
    pub fn invoke_url(&self, model_id: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Config(format!("endpoint {} cannot be a base", self.endpoint)))?
            .pop_if_empty()
            .extend(["model", model_id, "invoke"]);
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(&self, model_id: &str, body: &Value) -> Result<Value> {
        let url = self.invoke_url(model_id)?;
        tracing::debug!(target: "rag_gateway::transport", %url, "invoking model");

        let mut request = self.client.post(url).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(map_send_error)?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read backend error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        response.json::<Value>().await.map_err(|err| {
            GatewayError::backend(status.as_u16(), format!("Failed to parse backend response: {err}"))
        })
    }
}

fn map_send_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Connection(format!("request timed out: {err}"))
    } else if err.is_connect() {
        GatewayError::Connection(format!("failed to connect: {err}"))
    } else {
        GatewayError::Connection(err.to_string())
    }
}

/// Maps a non-success HTTP status onto the error taxonomy.
///
/// 401 and 403 are credential failures and fail fast; every other status,
/// including 429 and 5xx, becomes a retryable backend error.
pub(crate) fn map_http_error(status: StatusCode, body: String) -> GatewayError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(ErrorResponse::into_message)
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Authentication(message),
        _ => GatewayError::backend(status.as_u16(), message),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorResponse {
    Nested { error: ErrorBody },
    Flat { message: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl ErrorResponse {
    fn into_message(self) -> String {
        match self {
            ErrorResponse::Nested { error } => error.message,
            ErrorResponse::Flat { message } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(endpoint: &str) -> HttpTransport {
        HttpTransport::new(&GatewayConfig::default().with_endpoint(endpoint)).unwrap()
    }

    #[test]
    fn test_invoke_url() {
        let url = transport("https://inference.example.com")
            .invoke_url("anthropic.claude-3-haiku-20240307-v1:0")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://inference.example.com/model/anthropic.claude-3-haiku-20240307-v1:0/invoke"
        );
    }

    #[test]
    fn test_invoke_url_keeps_base_path() {
        let url = transport("https://gateway.example.com/v1/")
            .invoke_url("meta.llama3-8b-instruct-v1:0")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://gateway.example.com/v1/model/meta.llama3-8b-instruct-v1:0/invoke"
        );
    }

    #[test]
    fn test_auth_statuses_fail_fast() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = map_http_error(status, r#"{"message":"invalid token"}"#.into());
            assert!(matches!(err, GatewayError::Authentication(ref m) if m == "invalid token"));
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_throttling_and_server_errors_are_retryable() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = map_http_error(status, "busy".into());
            assert!(matches!(
                err,
                GatewayError::Backend { status_code: Some(code), .. } if code == status.as_u16()
            ));
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_nested_error_body_message() {
        let err = map_http_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"type":"invalid_request_error","message":"bad field"}}"#.into(),
        );
        assert!(err.to_string().contains("bad field"));
        assert!(err.to_string().contains("HTTP 400"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_connection_error() {
        let config = GatewayConfig::default()
            .with_endpoint("http://127.0.0.1:1")
            .with_timeouts(1, 1);
        let transport = HttpTransport::new(&config).unwrap();

        let err = transport
            .invoke("meta.llama3-8b-instruct-v1:0", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Connection(_)));
    }
}
