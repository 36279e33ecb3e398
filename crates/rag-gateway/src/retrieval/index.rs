//! Brute-force in-memory vector index.

use super::document::{RetrievedDocument, SearchFilters};
use super::retriever::{EmbeddingService, IndexStats, VectorIndex};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::sync::RwLock;

/// Cosine-similarity index over documents held in memory.
///
/// Scores are cosine similarities clamped to `[0, 1]`. Every stored document
/// carries an embedding of the same dimension.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    documents: RwLock<Vec<RetrievedDocument>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document that already carries an embedding.
    pub fn insert(&self, document: RetrievedDocument) -> Result<()> {
        let Some(embedding) = document.embedding.as_ref() else {
            return Err(GatewayError::Validation(format!(
                "document {} has no embedding",
                document.id
            )));
        };
        if embedding.is_empty() {
            return Err(GatewayError::Validation(format!(
                "document {} has an empty embedding",
                document.id
            )));
        }

        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(dimension) = documents.first().and_then(|d| d.embedding.as_ref()).map(Vec::len)
            && dimension != embedding.len()
        {
            return Err(GatewayError::Validation(format!(
                "document {} has dimension {}, index has {}",
                document.id,
                embedding.len(),
                dimension
            )));
        }

        documents.push(document);
        Ok(())
    }

    /// Embeds `documents` with `embedder` and stores them. Returns how many were added.
    pub async fn ingest(
        &self,
        embedder: &dyn EmbeddingService,
        documents: Vec<RetrievedDocument>,
    ) -> Result<usize> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = embedder.embed_documents(&texts).await?;
        if embeddings.len() != documents.len() {
            return Err(GatewayError::Retrieval(format!(
                "embedding service returned {} vectors for {} documents",
                embeddings.len(),
                documents.len()
            )));
        }

        let count = documents.len();
        for (document, embedding) in documents.into_iter().zip(embeddings) {
            self.insert(document.with_embedding(embedding))?;
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<RetrievedDocument>> {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut hits = Vec::new();
        for document in documents.iter() {
            if filters.is_some_and(|f| !f.matches(document)) {
                continue;
            }
            let Some(embedding) = document.embedding.as_ref() else {
                continue;
            };
            if embedding.len() != query.len() {
                return Err(GatewayError::Retrieval(format!(
                    "query dimension {} does not match index dimension {}",
                    query.len(),
                    embedding.len()
                )));
            }
            let score = cosine_similarity(query, embedding).clamp(0.0, 1.0);
            hits.push(document.clone().with_score(score));
        }

        hits.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .total_cmp(&a.score.unwrap_or(0.0))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn get_stats(&self) -> Result<IndexStats> {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(IndexStats {
            document_count: documents.len(),
            dimension: documents
                .first()
                .and_then(|d| d.embedding.as_ref())
                .map(Vec::len),
        })
    }
}

/// Cosine similarity of two equal-length vectors; zero when either has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
