//! Pre-flight checks before answering questions.
//!
//! Catches a missing course index or API key up front instead of failing
//! halfway through the first turn.

use crate::config::Settings;
use crate::error::{CourseMateError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Answering questions (ask, chat, serve) needs the index and model access.
    Ask,
    /// Search needs the index and the embedding endpoint.
    Search,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    check_index(settings)?;
    check_api_key(&settings.embedding.api_base)?;
    if let Operation::Ask = operation {
        if settings.generation.enabled {
            check_api_key(&settings.generation.api_base)?;
        }
    }
    Ok(())
}

/// Check that the course index file exists.
fn check_index(settings: &Settings) -> Result<()> {
    let path = settings.sqlite_path();
    if path.is_file() {
        Ok(())
    } else {
        Err(CourseMateError::IndexUnavailable(format!(
            "no course index at {}. Set vector_store.sqlite_path in the config file",
            path.display()
        )))
    }
}

/// Hosted endpoints need `OPENAI_API_KEY`; local servers do not.
fn check_api_key(api_base: &str) -> Result<()> {
    if !api_base.contains("api.openai.com") {
        return Ok(());
    }
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(CourseMateError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(CourseMateError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}
