//! Query embedding plus nearest-neighbour search.

use super::RetrievedChunk;
use crate::embedding::Embedder;
use crate::error::{CourseMateError, Result};
use crate::vector_store::VectorStore;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Retrieves the most similar course chunks for a query.
pub struct Retriever {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    min_score: f32,
}

impl Retriever {
    /// Create a new retriever.
    pub fn new(vector_store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            vector_store,
            embedder,
            min_score: 0.3,
        }
    }

    /// Set the minimum similarity score threshold.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Return up to `k` chunks ordered by descending similarity.
    ///
    /// An empty index is not an error: the result is simply empty.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Err(CourseMateError::InvalidInput(
                "k must be a positive integer".to_string(),
            ));
        }
        if query.trim().is_empty() {
            return Err(CourseMateError::InvalidInput("query is empty".to_string()));
        }

        if self.vector_store.document_count().await? == 0 {
            warn!("Course index is empty");
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;

        let results = self
            .vector_store
            .search_with_threshold(&query_embedding, k, self.min_score)
            .await?;

        debug!("Retrieved {} chunks", results.len());
        Ok(results.into_iter().map(RetrievedChunk::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::{Document, MemoryVectorStore};
    use async_trait::async_trait;

    /// Embeds text as keyword hits over a tiny fixed vocabulary.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let text = text.to_lowercase();
            Ok(["tf-idf", "pagerank", "bm25"]
                .iter()
                .map(|w| if text.contains(w) { 1.0 } else { 0.0 })
                .collect())
        }

        fn model(&self) -> &str {
            "keyword"
        }
    }

    async fn seeded_store() -> Arc<MemoryVectorStore> {
        let store = Arc::new(MemoryVectorStore::new());
        store
            .upsert_batch(&[
                Document::new("ir-03.pdf".into(), "TF-IDF weighting".into(), 0, vec![1.0, 0.0, 0.0]),
                Document::new("ir-05.pdf".into(), "PageRank".into(), 0, vec![0.0, 1.0, 0.0]),
                Document::new("ir-04.pdf".into(), "BM25 and TF-IDF".into(), 400, vec![0.7, 0.0, 0.7]),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_orders_by_score() {
        let retriever = Retriever::new(seeded_store().await, Arc::new(KeywordEmbedder));

        let chunks = retriever.search("What is TF-IDF?", 5).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source, "ir-03.pdf");
        assert!(chunks[0].score >= chunks[1].score);
    }

    #[tokio::test]
    async fn test_search_is_repeatable() {
        let retriever = Retriever::new(seeded_store().await, Arc::new(KeywordEmbedder));

        let first = retriever.search("tf-idf and bm25", 3).await.unwrap();
        let second = retriever.search("tf-idf and bm25", 3).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_search_respects_k() {
        let retriever =
            Retriever::new(seeded_store().await, Arc::new(KeywordEmbedder)).with_min_score(0.0);

        let chunks = retriever.search("tf-idf", 1).await.unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_k_is_rejected() {
        let retriever = Retriever::new(seeded_store().await, Arc::new(KeywordEmbedder));
        let err = retriever.search("tf-idf", 0).await.unwrap_err();
        assert!(matches!(err, CourseMateError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let retriever = Retriever::new(Arc::new(MemoryVectorStore::new()), Arc::new(KeywordEmbedder));
        assert!(retriever.search("tf-idf", 3).await.unwrap().is_empty());
    }
}
