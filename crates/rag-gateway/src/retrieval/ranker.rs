use super::document::RetrievedDocument;
use crate::config::RetrievalConfig;

/// Authority-aware reordering and filtering of retrieved documents.
///
/// Documents whose authority field names an authoritative source get a fixed
/// boost, capped at 1.0. The sort is stable, so equal scores keep retrieval
/// order and the same input always produces the same output order.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranker {
    authority_field: String,
    authoritative_sources: Vec<String>,
    authority_boost: f32,
    relevance_threshold: f32,
}

impl Ranker {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            authority_field: config.authority_field.clone(),
            authoritative_sources: config.authoritative_sources.clone(),
            authority_boost: config.authority_boost,
            relevance_threshold: config.relevance_threshold,
        }
    }

    /// Whether `document` comes from an authoritative source.
    pub fn is_authoritative(&self, document: &RetrievedDocument) -> bool {
        document
            .metadata_str(&self.authority_field)
            .is_some_and(|source| {
                self.authoritative_sources
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(source))
            })
    }

    /// Boosts, sorts, drops documents below the threshold and keeps `top_k`.
    pub fn rank(&self, documents: Vec<RetrievedDocument>, top_k: usize) -> Vec<RetrievedDocument> {
        let candidates = documents.len();

        let mut ranked: Vec<RetrievedDocument> = documents
            .into_iter()
            .map(|mut document| {
                let mut score = document.score.unwrap_or(0.0);
                if self.is_authoritative(&document) {
                    score = (score + self.authority_boost).min(1.0);
                }
                document.score = Some(score.clamp(0.0, 1.0));
                document
            })
            .collect();

        ranked.sort_by(|a, b| score_of(b).total_cmp(&score_of(a)));
        ranked.retain(|document| score_of(document) >= self.relevance_threshold);
        ranked.truncate(top_k);

        tracing::debug!(
            candidates,
            kept = ranked.len(),
            threshold = self.relevance_threshold,
            "ranked documents"
        );
        ranked
    }
}

fn score_of(document: &RetrievedDocument) -> f32 {
    document.score.unwrap_or(0.0)
}
