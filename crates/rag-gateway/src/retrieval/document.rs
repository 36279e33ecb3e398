use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A candidate document returned by a similarity search.
///
/// `score` is unset until the index or ranker fills it in, and lies in
/// `[0, 1]` once ranked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl RetrievedDocument {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Map::new(),
            embedding: None,
            score: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// String value of a metadata field.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// The `title` metadata field, falling back to the id.
    pub fn title(&self) -> &str {
        self.metadata_str("title")
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(&self.id)
    }

    /// Where the document can be found: its `url`, else its `path`, else its `page`.
    pub fn locator(&self) -> Option<String> {
        if let Some(url) = self.metadata_str("url").or_else(|| self.metadata_str("path")) {
            return Some(url.to_string());
        }
        match self.metadata.get("page")? {
            Value::Number(page) => Some(format!("page {page}")),
            Value::String(page) => Some(format!("page {page}")),
            _ => None,
        }
    }
}

/// Metadata equality filters for a similarity search.
///
/// A document matches when every filter key is present in its metadata with
/// an equal value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    equals: BTreeMap<String, Value>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.equals.iter()
    }

    pub fn matches(&self, document: &RetrievedDocument) -> bool {
        self.equals
            .iter()
            .all(|(key, expected)| document.metadata.get(key) == Some(expected))
    }
}
