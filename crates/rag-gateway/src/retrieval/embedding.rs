//! Embedding collaborator backed by a hosted embedding model.

use super::retriever::EmbeddingService;
use crate::error::{GatewayError, Result};
use crate::transport::Transport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_EMBEDDING_MODEL: &str = "amazon.titan-embed-text-v2:0";

#[derive(Serialize)]
struct EmbedRequest<'a> {
    #[serde(rename = "inputText")]
    input_text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Embeds text by invoking an embedding model through a [`Transport`].
///
/// Shares the transport (and so the endpoint, credentials and timeouts) with
/// generation. Documents are embedded one request at a time.
#[derive(Clone)]
pub struct HttpEmbeddingService {
    transport: Arc<dyn Transport>,
    model_id: String,
}

impl HttpEmbeddingService {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            model_id: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(GatewayError::Validation("cannot embed empty text".into()));
        }

        let body = serde_json::to_value(EmbedRequest { input_text: text })?;
        let response = self.transport.invoke(&self.model_id, &body).await?;
        let parsed: EmbedResponse = serde_json::from_value(response).map_err(|e| {
            GatewayError::Retrieval(format!("unexpected embedding response shape: {e}"))
        })?;

        if parsed.embedding.is_empty() {
            return Err(GatewayError::Retrieval(
                "embedding model returned an empty vector".into(),
            ));
        }
        Ok(parsed.embedding)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_query(text).await?);
        }
        tracing::debug!(count = embeddings.len(), model = %self.model_id, "embedded documents");
        Ok(embeddings)
    }
}
