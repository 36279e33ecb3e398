//! Integration tests for GenerationClient.
//!
//! A scripted transport stands in for the hosted backend so retries, rate
//! limiting and structured extraction can be observed call by call.

use async_trait::async_trait;
use rag_gateway::client::GenerationClient;
use rag_gateway::config::GatewayConfig;
use rag_gateway::error::{GatewayError, Result};
use rag_gateway::request::GenerationRequest;
use rag_gateway::transport::Transport;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays scripted results, then answers every further call with `fallback`.
struct MockTransport {
    script: Mutex<VecDeque<Result<Value>>>,
    fallback: Value,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockTransport {
    fn replying(text: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: claude_reply(text),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn then(self, result: Result<Value>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn last_body(&self) -> Value {
        self.calls.lock().unwrap().last().map(|(_, body)| body.clone()).unwrap()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn invoke(&self, model_id: &str, body: &Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((model_id.to_string(), body.clone()));
        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }
}

fn claude_reply(text: &str) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 12, "output_tokens": 3}
    })
}

fn client_with(config: GatewayConfig, transport: Arc<MockTransport>) -> GenerationClient {
    GenerationClient::new(config, transport).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_after_two_transient_failures() {
    let transport = Arc::new(
        MockTransport::replying("Recovered answer")
            .then(Err(GatewayError::backend(503, "overloaded")))
            .then(Err(GatewayError::Connection("connection reset".into()))),
    );
    let client = client_with(GatewayConfig::default(), transport.clone());

    let started = tokio::time::Instant::now();
    let traced = client
        .generate_with_retry_traced(&GenerationRequest::new("What changed?"), 3)
        .await;

    assert_eq!(traced.result.unwrap(), "Recovered answer");
    assert_eq!(transport.call_count(), 3);
    assert_eq!(traced.attempts.len(), 3);
    assert_eq!(traced.attempts[0].delay, Duration::from_secs(1));
    assert_eq!(traced.attempts[1].delay, Duration::from_secs(2));
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_authentication_failure_is_attempted_once() {
    let transport = Arc::new(
        MockTransport::replying("unreachable")
            .then(Err(GatewayError::Authentication("token expired".into()))),
    );
    let client = client_with(GatewayConfig::default(), transport.clone());

    let err = client
        .generate_with_retry(&GenerationRequest::new("Hello"), 3)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Authentication(_)));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_last_error() {
    let transport = Arc::new(
        MockTransport::replying("unreachable")
            .then(Err(GatewayError::backend(500, "first")))
            .then(Err(GatewayError::backend(502, "second")))
            .then(Err(GatewayError::backend(503, "third"))),
    );
    let client = client_with(GatewayConfig::default(), transport.clone());

    let err = client
        .generate_with_retry(&GenerationRequest::new("Hello"), 3)
        .await
        .unwrap_err();

    match &err {
        GatewayError::RetryExhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(*attempts, 3);
            assert!(matches!(
                **last_error,
                GatewayError::Backend {
                    status_code: Some(503),
                    ..
                }
            ));
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
    assert!(err.user_message().contains("temporarily unavailable"));
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_window() {
    let transport = Arc::new(MockTransport::replying("ok"));
    let client = client_with(GatewayConfig::default().with_rate_limit(3, 1), transport.clone());
    let request = GenerationRequest::new("ping");

    for _ in 0..3 {
        client.generate(&request).await.unwrap();
    }

    match client.generate(&request).await {
        Err(GatewayError::RateLimitExceeded { wait_seconds }) => {
            assert!(wait_seconds > 0.0 && wait_seconds <= 1.0);
        }
        other => panic!("expected RateLimitExceeded, got {other:?}"),
    }
    assert_eq!(transport.call_count(), 3);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(client.generate(&request).await.unwrap(), "ok");
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_is_never_retried() {
    let transport = Arc::new(MockTransport::replying("ok"));
    let client = client_with(GatewayConfig::default().with_rate_limit(1, 60), transport.clone());
    let request = GenerationRequest::new("ping");

    client.generate(&request).await.unwrap();

    let started = tokio::time::Instant::now();
    let traced = client.generate_with_retry_traced(&request, 5).await;
    assert!(matches!(
        traced.result,
        Err(GatewayError::RateLimitExceeded { .. })
    ));
    assert_eq!(traced.attempts.len(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_window() {
    let transport = Arc::new(MockTransport::replying("ok"));
    let client = Arc::new(client_with(
        GatewayConfig::default().with_rate_limit(5, 60),
        transport.clone(),
    ));

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .generate(&GenerationRequest::new(format!("request {i}")))
                    .await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let admitted = results
        .iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Ok(Err(GatewayError::RateLimitExceeded { .. }))))
        .count();

    assert_eq!(admitted, 5);
    assert_eq!(rejected, 15);
    assert_eq!(transport.call_count(), 5);
    assert_eq!(client.rate_limiter().in_window(), 5);
}

#[tokio::test]
async fn test_structured_output_embedded_in_prose() {
    let transport = Arc::new(MockTransport::replying(
        "Certainly! Based on the documents, here is the result:\n\
         {\"deadline\": \"2024-04-15\", \"extensions\": [\"automatic\", \"disaster\"]}\n\
         Let me know if you need more detail.",
    ));
    let client = client_with(GatewayConfig::default(), transport.clone());

    let schema = json!({
        "type": "object",
        "properties": {
            "deadline": {"type": "string"},
            "extensions": {"type": "array", "items": {"type": "string"}}
        }
    });
    let value = client
        .generate_structured("When is the deadline?", &schema, None, None)
        .await
        .unwrap();

    assert_eq!(
        value,
        json!({"deadline": "2024-04-15", "extensions": ["automatic", "disaster"]})
    );
    assert!(transport.last_body()["system"]
        .as_str()
        .unwrap()
        .contains("structured output only"));
}

#[tokio::test]
async fn test_unparseable_structured_output_is_malformed() {
    let transport = Arc::new(MockTransport::replying("I'm afraid I cannot answer that."));
    let client = client_with(GatewayConfig::default(), transport);

    let err = client
        .generate_structured("Q", &json!({"type": "object"}), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::MalformedStructuredOutput { .. }));
    assert!(!err.user_message().contains("afraid"));
}

#[tokio::test]
async fn test_model_families_are_dispatched_in_their_own_format() {
    let transport = Arc::new(
        MockTransport::replying("unused")
            .then(Ok(json!({"generation": "llama says hi", "stop_reason": "stop"})))
            .then(Ok(json!({"outputs": [{"text": "mistral says hi", "stop_reason": "stop"}]}))),
    );
    let client = client_with(GatewayConfig::default(), transport.clone());

    let llama = GenerationRequest::new("hi")
        .with_system_prompt("be nice")
        .with_model("us.meta.llama3-70b-instruct-v1:0");
    assert_eq!(client.generate(&llama).await.unwrap(), "llama says hi");
    let body = transport.last_body();
    assert!(body["prompt"].as_str().unwrap().contains("<|start_header_id|>system"));
    assert!(body.get("max_gen_len").is_some());

    let mistral = GenerationRequest::new("hi").with_model("mistral.mistral-large-2402-v1:0");
    assert_eq!(client.generate(&mistral).await.unwrap(), "mistral says hi");
    let body = transport.last_body();
    assert_eq!(body["prompt"], "<s>[INST] hi [/INST]");
    assert!(body.get("top_k").is_some());
}

#[tokio::test]
async fn test_validation_errors_fail_before_dispatch() {
    let transport = Arc::new(MockTransport::replying("unused"));
    let client = client_with(GatewayConfig::default(), transport.clone());

    let too_hot = GenerationRequest::new("hi").with_temperature(2.5);
    let err = client.generate_with_retry(&too_hot, 3).await.unwrap_err();

    assert!(matches!(err, GatewayError::Validation(_)));
    assert_eq!(transport.call_count(), 0);
}
