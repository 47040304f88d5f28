//! Retrieval-augmented generation over the course materials.
//!
//! The retriever turns a question into ranked course chunks; the synthesizer
//! turns gathered evidence into a grounded answer.

pub mod context;
mod retriever;
mod synthesizer;

pub use retriever::Retriever;
pub use synthesizer::{Answer, AnswerKind, Synthesizer, INSUFFICIENT_INFORMATION};

use crate::vector_store::SearchResult;
use serde::{Deserialize, Serialize};

/// A course-material chunk returned by the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Text content.
    pub text: String,
    /// Source document identifier.
    pub source: String,
    /// Similarity score (higher is more relevant).
    pub score: f32,
    /// Character offset of the chunk within its source.
    pub chunk_offset: i64,
}

impl From<SearchResult> for RetrievedChunk {
    fn from(result: SearchResult) -> Self {
        Self {
            text: result.document.content,
            source: result.document.source,
            score: result.score,
            chunk_offset: result.document.chunk_offset,
        }
    }
}
