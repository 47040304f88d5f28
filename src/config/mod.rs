//! Configuration module for CourseMate.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{ExplanationPrompts, Prompts};
pub use settings::{
    CalendarSettings, EmbeddingSettings, GeneralSettings, GenerationSettings, HolidaySettings,
    PolicySettings, PromptSettings, RetrievalSettings, ServerSettings, Settings,
    VectorStoreSettings, WeatherSettings,
};
