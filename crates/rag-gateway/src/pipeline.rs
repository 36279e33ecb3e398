//! End-to-end question answering over retrieved context.
//!
//! # Example
//!
//! ```rust,no_run
//! use rag_gateway::client::GenerationClient;
//! use rag_gateway::config::{GatewayConfig, RetrievalConfig};
//! use rag_gateway::pipeline::RagPipeline;
//! use rag_gateway::retrieval::{HttpEmbeddingService, InMemoryVectorIndex, SearchFilters};
//! use rag_gateway::transport::HttpTransport;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env()?;
//! let transport = Arc::new(HttpTransport::new(&config)?);
//! let client = Arc::new(GenerationClient::new(config, transport.clone())?);
//!
//! let pipeline = RagPipeline::new(
//!     client,
//!     Arc::new(HttpEmbeddingService::new(transport)),
//!     Arc::new(InMemoryVectorIndex::new()),
//!     RetrievalConfig::from_env()?,
//! )?;
//!
//! let filters = SearchFilters::new().with("jurisdiction", "CA");
//! let answer = pipeline.answer("When are estimated taxes due?", Some(&filters)).await?;
//! for source in &answer.sources {
//!     println!("{}: {}", source.id, source.title);
//! }
//! # Ok(())
//! # }
//! ```

use crate::client::GenerationClient;
use crate::config::RetrievalConfig;
use crate::error::{GatewayError, Result};
use crate::request::GenerationRequest;
use crate::retrieval::{
    Citation, ContextBuilder, EmbeddingService, RetrievedDocument, Retriever, SearchFilters,
    SourceExtractor, VectorIndex,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A generated answer and the citations for the context it was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<Citation>,
}

/// Retriever → ranker → context builder → generation client → source extractor.
pub struct RagPipeline {
    client: Arc<GenerationClient>,
    retriever: Option<Retriever>,
    context_builder: ContextBuilder,
    source_extractor: SourceExtractor,
    top_k: usize,
    system_prompt: Option<String>,
    model: Option<String>,
    temperature: f32,
}

impl RagPipeline {
    /// Builds a pipeline from its collaborators.
    ///
    /// When retrieval is disabled in `config` no retriever is constructed and
    /// every question is answered without context.
    pub fn new(
        client: Arc<GenerationClient>,
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;

        let retriever = if config.enabled {
            Some(Retriever::new(embedder, index, &config))
        } else {
            tracing::info!("retrieval disabled, answering without context");
            None
        };

        Ok(Self {
            client,
            retriever,
            context_builder: ContextBuilder::from_config(&config),
            source_extractor: SourceExtractor::from_config(&config),
            top_k: config.top_k,
            system_prompt: None,
            model: None,
            temperature: GenerationRequest::DEFAULT_TEMPERATURE,
        })
    }

    pub fn with_context_builder(mut self, context_builder: ContextBuilder) -> Self {
        self.context_builder = context_builder;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn retrieval_enabled(&self) -> bool {
        self.retriever.is_some()
    }

    /// Answers `question` from retrieved context.
    ///
    /// Generation goes through the client's retrying path with its configured
    /// attempt budget. Finding no documents is not an error.
    #[tracing::instrument(name = "answer", skip_all, fields(question_chars = question.len()))]
    pub async fn answer(
        &self,
        question: &str,
        filters: Option<&SearchFilters>,
    ) -> Result<RagAnswer> {
        if question.trim().is_empty() {
            return Err(GatewayError::Validation("question must not be empty".into()));
        }

        let documents: Vec<RetrievedDocument> = match &self.retriever {
            Some(retriever) => retriever.retrieve(question, self.top_k, filters).await?,
            None => Vec::new(),
        };

        let built = self.context_builder.build(question, &documents)?;
        tracing::debug!(
            retrieved = documents.len(),
            used = built.used.len(),
            truncated = built.truncated,
            prompt_chars = built.prompt.len(),
            "context ready"
        );

        let mut request = GenerationRequest::new(built.prompt).with_temperature(self.temperature);
        if let Some(system_prompt) = &self.system_prompt {
            request = request.with_system_prompt(system_prompt.clone());
        }
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }

        let answer = self
            .client
            .generate_with_retry(&request, self.client.config().max_retries)
            .await?;

        Ok(RagAnswer {
            answer,
            sources: self.source_extractor.extract_sources(&built.used),
        })
    }
}
