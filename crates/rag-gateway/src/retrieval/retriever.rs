use super::document::{RetrievedDocument, SearchFilters};
use super::ranker::Ranker;
use crate::config::RetrievalConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Turns text into embedding vectors.
///
/// Implementations reject empty text with [`GatewayError::Validation`].
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Similarity search over stored document embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns up to `top_k` documents, pre-scored by similarity, best first.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<RetrievedDocument>>;

    async fn get_stats(&self) -> Result<IndexStats>;
}

/// Size information reported by a [`VectorIndex`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub document_count: usize,
    /// Embedding dimension, unknown while the index is empty.
    pub dimension: Option<usize>,
}

/// Embeds a query, searches the index and ranks the candidates.
///
/// Holds no mutable state; one retriever can serve concurrent callers.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    ranker: Ranker,
    overfetch_factor: usize,
    boosting_active: bool,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            ranker: Ranker::new(config),
            overfetch_factor: config.overfetch_factor.max(1),
            boosting_active: config.boosting_active(),
        }
    }

    pub fn ranker(&self) -> &Ranker {
        &self.ranker
    }

    /// Number of candidates requested from the index for a final `top_k`.
    ///
    /// Filtering and authority boosting can both push candidates out of the
    /// final list, so either one triggers over-fetching.
    pub fn fetch_size(&self, top_k: usize, filters: Option<&SearchFilters>) -> usize {
        let filtered = filters.is_some_and(|f| !f.is_empty());
        if filtered || self.boosting_active {
            top_k.saturating_mul(self.overfetch_factor)
        } else {
            top_k
        }
    }

    /// Retrieves up to `top_k` ranked documents for `query`.
    ///
    /// A blank query returns no documents without calling the embedding
    /// service. Embedding and index failures surface as
    /// [`GatewayError::Retrieval`].
    #[tracing::instrument(name = "retrieve", skip(self, query, filters), fields(query_chars = query.len()))]
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<RetrievedDocument>> {
        if query.trim().is_empty() {
            tracing::debug!("blank query, skipping retrieval");
            return Ok(Vec::new());
        }

        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| as_retrieval_error("embedding failed", e))?;

        let fetch = self.fetch_size(top_k, filters);
        let candidates = self
            .index
            .search(&embedding, fetch, filters)
            .await
            .map_err(|e| as_retrieval_error("vector search failed", e))?;

        tracing::debug!(requested = fetch, returned = candidates.len(), "vector search completed");
        Ok(self.ranker.rank(candidates, top_k))
    }

    pub async fn index_stats(&self) -> Result<IndexStats> {
        self.index
            .get_stats()
            .await
            .map_err(|e| as_retrieval_error("index stats unavailable", e))
    }
}

fn as_retrieval_error(context: &str, err: GatewayError) -> GatewayError {
    match err {
        GatewayError::Retrieval(_) => err,
        other => GatewayError::Retrieval(format!("{context}: {other}")),
    }
}
