//! Text generation (prompt in, completion out).

mod openai;

pub use openai::OpenAIGenerator;

use crate::error::Result;
use async_trait::async_trait;

/// Trait for completion generation.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for a system prompt and a user prompt.
    async fn generate(&self, system: &str, user: &str) -> Result<String>;
}
