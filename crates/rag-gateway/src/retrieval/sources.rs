use super::document::RetrievedDocument;
use crate::config::RetrievalConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const EXCERPT_CHARS: usize = 200;

/// A caller-facing reference to a document used as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Builds citations for the documents that went into a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceExtractor {
    metadata_keys: Vec<String>,
}

impl SourceExtractor {
    pub fn new<I, S>(metadata_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metadata_keys: metadata_keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.citation_metadata_keys.iter().cloned())
    }

    /// One citation per document, in the same order.
    ///
    /// Pass only the documents that were actually packed into the context.
    pub fn extract_sources(&self, used: &[RetrievedDocument]) -> Vec<Citation> {
        used.iter().map(|document| self.citation(document)).collect()
    }

    fn citation(&self, document: &RetrievedDocument) -> Citation {
        let metadata = self
            .metadata_keys
            .iter()
            .filter_map(|key| {
                document
                    .metadata
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect();

        Citation {
            id: document.id.clone(),
            title: document.title().to_string(),
            excerpt: excerpt(&document.content),
            relevance_score: document.score,
            locator: document.locator(),
            metadata,
        }
    }
}

impl Default for SourceExtractor {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// First [`EXCERPT_CHARS`] characters of the trimmed content, with an ellipsis when cut.
pub fn excerpt(content: &str) -> String {
    let content = content.trim();
    match content.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_gives_no_citations() {
        assert!(SourceExtractor::default().extract_sources(&[]).is_empty());
    }

    #[test]
    fn test_citation_fields() {
        let document = RetrievedDocument::new("irs-101", "Short body.")
            .with_score(0.82)
            .with_metadata("title", "Filing Basics")
            .with_metadata("url", "https://example.gov/101")
            .with_metadata("source_type", "government")
            .with_metadata("internal_note", "do not expose");

        let citations = SourceExtractor::default().extract_sources(&[document]);
        let citation = &citations[0];
        assert_eq!(citation.id, "irs-101");
        assert_eq!(citation.title, "Filing Basics");
        assert_eq!(citation.excerpt, "Short body.");
        assert_eq!(citation.relevance_score, Some(0.82));
        assert_eq!(citation.locator.as_deref(), Some("https://example.gov/101"));
        assert_eq!(citation.metadata.len(), 1);
        assert_eq!(citation.metadata["source_type"], "government");
    }

    #[test]
    fn test_order_and_title_fallback() {
        let docs = vec![
            RetrievedDocument::new("b", "second"),
            RetrievedDocument::new("a", "first"),
        ];
        let citations = SourceExtractor::new(Vec::<String>::new()).extract_sources(&docs);
        let titles: Vec<_> = citations.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a"]);
        assert!(citations.iter().all(|c| c.metadata.is_empty()));
    }

    #[test]
    fn test_excerpt_length() {
        assert_eq!(excerpt(&"a".repeat(200)), "a".repeat(200));

        let long = excerpt(&"é".repeat(250));
        assert!(long.ends_with("..."));
        assert_eq!(long.chars().count(), EXCERPT_CHARS + 3);
    }
}
