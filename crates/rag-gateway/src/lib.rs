//! 'rag-gateway' - Resilient invocation of hosted text-generation backends,
//! fed by a deterministic retrieval and ranking pipeline.
//!
//! The generation half gives callers either a validated answer or a typed
//! failure within a bounded number of attempts, no matter which hosted model
//! family sits behind the endpoint. The retrieval half turns an unordered set
//! of similarity-search candidates into an authority-aware, budget-constrained
//! context block plus citations.
//!
//! # Generation
//!
//! [`GenerationClient`] composes a per-instance [`RateLimiter`], a
//! [`ModelAdapter`] picked from the model id, a [`Transport`] and a
//! [`BackoffExecutor`]:
//!
//! - [`GenerationClient::generate`] makes one rate-limited call.
//! - [`GenerationClient::generate_with_retry`] retries transient failures with
//!   exponential backoff (1s, 2s, 4s, ...). Rate limiting and authentication
//!   errors are never retried.
//! - [`GenerationClient::generate_structured`] asks for JSON and extracts it
//!   even when the model wraps it in prose.
//!
//! # Retrieval
//!
//! [`Retriever`] embeds the query and searches a [`VectorIndex`]; [`Ranker`]
//! boosts authoritative sources and applies the relevance threshold;
//! [`ContextBuilder`] packs the result into the prompt; [`SourceExtractor`]
//! reports what was used. [`RagPipeline`] wires all of it together.
//!
//! # Errors
//!
//! Every fallible operation returns [`GatewayError`]. Use
//! [`GatewayError::user_message`] for anything shown to end users.

pub mod adapters;
pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod rate_limit;
pub mod request;
pub mod retrieval;
pub mod retry;
pub mod structured;
pub mod transport;

pub use adapters::{ModelAdapter, ModelFamily};
pub use client::{CallPhase, GenerationClient};
pub use config::{GatewayConfig, RetrievalConfig};
pub use error::{GatewayError, Result};
pub use pipeline::{RagAnswer, RagPipeline};
pub use rate_limit::RateLimiter;
pub use request::{FinishReason, GenerationRequest, GenerationResult, TokenUsage};
pub use retrieval::{
    Citation, ContextBuilder, EmbeddingService, HttpEmbeddingService, InMemoryVectorIndex,
    IndexStats, Ranker, RetrievedDocument, Retriever, SearchFilters, SourceExtractor, VectorIndex,
};
pub use retry::{BackoffExecutor, BackoffPolicy, RetryAttempt, Traced};
pub use transport::{HttpTransport, Transport};

#[cfg(feature = "schema")]
pub use schemars::JsonSchema;
