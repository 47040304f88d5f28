//! Course material search over the local index.

use super::ToolOutput;
use crate::error::ToolError;
use crate::rag::Retriever;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Default number of chunks per search.
pub const DEFAULT_K: usize = 5;

/// Most chunks a single search may ask for.
pub const MAX_K: usize = 20;

fn default_k() -> usize {
    DEFAULT_K
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseSearchInput {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

impl CourseSearchInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: DEFAULT_K,
        }
    }

    pub fn validate(&self) -> Result<(), ToolError> {
        if self.query.trim().is_empty() {
            return Err(ToolError::InvalidInput("search query is empty".to_string()));
        }
        if self.k == 0 || self.k > MAX_K {
            return Err(ToolError::InvalidInput(format!(
                "k must be between 1 and {}, got {}",
                MAX_K, self.k
            )));
        }
        Ok(())
    }
}

/// Adapter exposing the retriever as a tool.
#[derive(Clone)]
pub struct CourseSearchTool {
    retriever: Arc<Retriever>,
}

impl CourseSearchTool {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }

    pub async fn invoke(&self, input: &CourseSearchInput) -> Result<ToolOutput, ToolError> {
        let chunks = self.retriever.search(&input.query, input.k).await?;
        if chunks.is_empty() {
            return Ok(ToolOutput::not_found(format!(
                "No course material matched \"{}\"",
                input.query
            )));
        }
        Ok(ToolOutput::Chunks { chunks })
    }
}

pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "What to look for in the course materials"
            },
            "k": {
                "type": "integer",
                "description": "Number of chunks to return",
                "minimum": 1,
                "maximum": MAX_K,
                "default": DEFAULT_K
            }
        },
        "required": ["query"]
    })
}

pub fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "chunks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "text": {"type": "string"},
                        "source": {"type": "string"},
                        "score": {"type": "number"},
                        "chunk_offset": {"type": "integer"}
                    }
                }
            }
        }
    })
}
