//! Retrieval side of the gateway.
//!
//! A query flows through [`Retriever`] (embedding plus similarity search,
//! with [`Ranker`] applied to the candidates), then [`ContextBuilder`] packs
//! the ranked documents into a character budget, and [`SourceExtractor`]
//! turns the documents that were packed into citations.
//!
//! None of these types hold mutable state; they can be shared freely across
//! tasks working on independent document lists.

pub mod context;
pub mod document;
pub mod embedding;
pub mod index;
pub mod ranker;
pub mod retriever;
pub mod sources;

pub use context::{BuiltContext, ContextBuilder};
pub use document::{RetrievedDocument, SearchFilters};
pub use embedding::HttpEmbeddingService;
pub use index::InMemoryVectorIndex;
pub use ranker::Ranker;
pub use retriever::{EmbeddingService, IndexStats, Retriever, VectorIndex};
pub use sources::{Citation, SourceExtractor};
