//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::OpenAIEmbedder;
use crate::rag::Retriever;
use crate::vector_store::SqliteVectorStore;
use anyhow::Result;
use std::sync::Arc;

/// Run the search command.
pub async fn run_search(
    query: &str,
    limit: usize,
    min_score: Option<f32>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Search, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let embedder = Arc::new(
        OpenAIEmbedder::from_settings(&settings.embedding)?
            .with_retries(settings.policy.model_retries),
    );
    let store = Arc::new(SqliteVectorStore::open_read_only(&settings.sqlite_path())?);
    let retriever = Retriever::new(store, embedder)
        .with_min_score(min_score.unwrap_or(settings.retrieval.min_score));

    let spinner = Output::spinner("Searching...");
    let results = retriever.search(query, limit).await;
    spinner.finish_and_clear();

    match results {
        Ok(chunks) => {
            if chunks.is_empty() {
                Output::warning("No course material matched your query.");
            } else {
                Output::success(&format!("Found {} results", chunks.len()));
                for chunk in &chunks {
                    Output::search_result(&chunk.source, chunk.chunk_offset, chunk.score, &chunk.text);
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
