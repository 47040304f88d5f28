//! Configuration settings for CourseMate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub vector_store: VectorStoreSettings,
    pub retrieval: RetrievalSettings,
    pub policy: PolicySettings,
    pub weather: WeatherSettings,
    pub holiday: HolidaySettings,
    pub calendar: CalendarSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.coursemate".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Base URL of an OpenAI-compatible API (Ollama serves one under /v1).
    pub api_base: String,
    /// Embedding model to use.
    pub model: String,
    /// Requested embedding dimensions, if the model supports truncation.
    pub dimensions: Option<u32>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:11434/v1".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: None,
        }
    }
}

/// Text generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Enable model-written course explanations. When disabled, answers
    /// quote the retrieved material directly.
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    /// Chat model used for explanations.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "http://localhost:11434/v1".to_string(),
            model: "llama3.1:8b".to_string(),
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Path to the SQLite course index.
    pub sqlite_path: String,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.coursemate/course_index.db".to_string(),
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of chunks requested per course search.
    pub top_k: usize,
    /// Relevance floor: chunks scoring below it are discarded.
    pub min_score: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.3,
        }
    }
}

/// Routing policy constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Attempts allowed per tool within one turn.
    pub max_attempts_per_tool: usize,
    /// Consecutive failed invocations after which the turn fails.
    pub max_consecutive_failures: usize,
    /// Days ahead of today for which weather forecasts are requested.
    pub forecast_horizon_days: i64,
    /// Timeout for a single tool call, in seconds.
    pub tool_timeout_secs: u64,
    /// Deadline for a whole turn, in seconds.
    pub turn_deadline_secs: u64,
    /// Retries for transient embedding/generation failures.
    pub model_retries: usize,
    /// Issue independent tool calls concurrently.
    pub concurrent_tools: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            max_attempts_per_tool: 3,
            max_consecutive_failures: 3,
            forecast_horizon_days: 15,
            tool_timeout_secs: 15,
            turn_deadline_secs: 90,
            model_retries: 1,
            concurrent_tools: false,
        }
    }
}

impl PolicySettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn turn_deadline(&self) -> Duration {
        Duration::from_secs(self.turn_deadline_secs)
    }
}

/// Weather service settings (Open-Meteo, no key required).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherSettings {
    pub geocode_url: String,
    pub forecast_url: String,
    /// Location used when the question names none.
    pub default_location: String,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            geocode_url: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            default_location: "Haifa, Israel".to_string(),
        }
    }
}

/// Holiday service settings (Hebcal, no key required).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HolidaySettings {
    pub base_url: String,
    /// Locale used when the question names none.
    pub default_locale: String,
    pub user_agent: String,
}

impl Default for HolidaySettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.hebcal.com/hebcal".to_string(),
            default_locale: "IL".to_string(),
            user_agent: concat!("coursemate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    /// JSON file holding calendar events.
    pub path: String,
    /// Window used for "upcoming" questions, in days.
    pub upcoming_days: i64,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            path: "~/.coursemate/calendar_events.json".to_string(),
            upcoming_days: 7,
        }
    }
}

/// HTTP API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Idle sessions are dropped after this many seconds.
    pub session_timeout_secs: u64,
    /// Upper bound on live sessions; the least recently used one goes first.
    pub max_sessions: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            session_timeout_secs: 3600,
            max_sessions: 1000,
        }
    }
}

impl ServerSettings {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::CourseMateError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("coursemate")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite index path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.vector_store.sqlite_path)
    }

    /// Get the expanded calendar file path.
    pub fn calendar_path(&self) -> PathBuf {
        Self::expand_path(&self.calendar.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [policy]
            max_attempts_per_tool = 2

            [weather]
            default_location = "Tel Aviv, Israel"
            "#,
        )
        .unwrap();

        assert_eq!(settings.policy.max_attempts_per_tool, 2);
        assert_eq!(settings.policy.max_consecutive_failures, 3);
        assert_eq!(settings.weather.default_location, "Tel Aviv, Israel");
        assert_eq!(settings.retrieval.top_k, 5);
        assert_eq!(settings.server.max_sessions, 1000);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.generation.model = "qwen2.5:7b".to_string();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.generation.model, "qwen2.5:7b");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = PathBuf::from("/nonexistent/coursemate/config.toml");
        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.holiday.default_locale, "IL");
    }
}
