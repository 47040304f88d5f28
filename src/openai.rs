//! Client construction for OpenAI-compatible model endpoints.

use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

use crate::error::{CourseMateError, Result};

/// Default timeout for model API requests (5 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Placeholder key for local servers (Ollama ignores it, but the client requires one).
const LOCAL_API_KEY: &str = "ollama";

/// Create a client for the given API base with the default timeout.
pub fn create_client(api_base: &str) -> Result<Client<OpenAIConfig>> {
    create_client_with_timeout(api_base, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create a client for the given API base with a custom timeout.
///
/// The key is read from `OPENAI_API_KEY` when set.
pub fn create_client_with_timeout(api_base: &str, timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CourseMateError::Config(format!("Failed to create HTTP client: {}", e)))?;

    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_else(|_| LOCAL_API_KEY.to_string());
    let config = OpenAIConfig::new()
        .with_api_base(api_base.trim_end_matches('/'))
        .with_api_key(api_key);

    Ok(Client::with_config(config).with_http_client(http_client))
}
