//! Core data models used throughout docket.
//!
//! These types represent the chunks, retrieval hits, and generation results
//! that flow through the indexing and answering pipeline.

use serde::Serialize;

/// A contiguous span of a document's text; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Deterministic id: `"{source}_{position}"`.
    pub id: String,
    /// File name of the document this chunk belongs to.
    pub source: String,
    /// Position within the document, contiguous from 0.
    pub position: i64,
    /// 1-based page the chunk was cut from.
    pub page: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// One record as written into a collection.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A chunk returned by a nearest-neighbor query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// Cosine distance to the query (`1 - cosine similarity`); lower is closer.
    pub distance: f32,
}

/// Token counts reported by the language model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Raw output of one language-model call.
#[derive(Debug, Clone)]
pub struct Generation {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// Summary of a collection held by the index store.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub id: String,
    pub source: String,
    pub model: String,
    pub dims: usize,
    pub records: i64,
    pub created_at: i64,
}
