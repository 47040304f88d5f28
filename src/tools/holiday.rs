//! Public holiday adapter backed by the Hebcal calendar API.

use super::{DateRange, ToolOutput};
use crate::config::HolidaySettings;
use crate::error::{CourseMateError, Result as CourseMateResult, ToolError};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// Locales the holiday source can answer for.
pub const SUPPORTED_LOCALES: &[&str] = &["IL"];

fn default_locale() -> String {
    "IL".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HolidayInput {
    pub range: DateRange,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Keep only the first `limit` holidays in the range.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl HolidayInput {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            locale: default_locale(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<(), ToolError> {
        self.range.validate()?;
        if !SUPPORTED_LOCALES
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&self.locale))
        {
            return Err(ToolError::InvalidInput(format!(
                "unsupported locale {} (supported: {})",
                self.locale,
                SUPPORTED_LOCALES.join(", ")
            )));
        }
        if self.limit == Some(0) {
            return Err(ToolError::InvalidInput("limit must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub name: String,
    pub date: NaiveDate,
}

/// Source of holidays, one calendar year at a time.
#[async_trait]
pub trait HolidayProvider: Send + Sync {
    /// All holidays of `year`; empty when the source has no data for it.
    async fn holidays_in_year(&self, year: i32, locale: &str) -> Result<Vec<Holiday>, ToolError>;
}

pub async fn invoke(provider: &dyn HolidayProvider, input: &HolidayInput) -> Result<ToolOutput, ToolError> {
    let locale = input.locale.to_uppercase();
    let mut holidays = Vec::new();
    for year in input.range.years() {
        holidays.extend(
            provider
                .holidays_in_year(year, &locale)
                .await?
                .into_iter()
                .filter(|h| input.range.contains(h.date)),
        );
    }

    holidays.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name.cmp(&b.name)));
    holidays.dedup();
    if let Some(limit) = input.limit {
        holidays.truncate(limit);
    }

    if holidays.is_empty() {
        return Ok(ToolOutput::not_found(format!(
            "No {} holidays between {} and {}",
            locale, input.range.start, input.range.end
        )));
    }
    Ok(ToolOutput::Holidays { locale, holidays })
}

pub(crate) fn render(locale: &str, holidays: &[Holiday]) -> String {
    let mut lines = vec![format!("Holidays ({}):", locale)];
    lines.extend(
        holidays
            .iter()
            .map(|h| format!("- {} ({})", h.name, h.date.format("%A, %Y-%m-%d"))),
    );
    lines.join("\n")
}

#[derive(Debug, Deserialize)]
struct HebcalResponse {
    #[serde(default)]
    items: Vec<HebcalItem>,
}

#[derive(Debug, Deserialize)]
struct HebcalItem {
    title: String,
    date: String,
    #[serde(default)]
    category: String,
}

impl HebcalItem {
    /// Dates are either plain days or full timestamps; keep the day.
    fn day(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.get(..10)?, "%Y-%m-%d").ok()
    }
}

/// Hebcal REST client.
pub struct Hebcal {
    client: reqwest::Client,
    base_url: String,
}

impl Hebcal {
    pub fn from_settings(settings: &HolidaySettings, timeout: Duration) -> CourseMateResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| CourseMateError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
        })
    }
}

#[async_trait]
impl HolidayProvider for Hebcal {
    #[instrument(skip(self))]
    async fn holidays_in_year(&self, year: i32, locale: &str) -> Result<Vec<Holiday>, ToolError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("v", "1".to_string()),
                ("cfg", "json".to_string()),
                ("year", year.to_string()),
                ("maj", "on".to_string()),
                ("min", "off".to_string()),
                ("mod", "off".to_string()),
                ("nx", "off".to_string()),
                ("ss", "off".to_string()),
                ("mf", "off".to_string()),
                ("c", "off".to_string()),
                ("i", if locale == "IL" { "on" } else { "off" }.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            // Hebcal rejects years outside its supported span.
            debug!("No holiday data for {}", year);
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(ToolError::Upstream(format!("hebcal returned {}", status)));
        }

        let body: HebcalResponse = response.json().await?;
        Ok(parse_items(body.items))
    }
}

fn parse_items(items: Vec<HebcalItem>) -> Vec<Holiday> {
    items
        .into_iter()
        .filter(|item| item.category == "holiday")
        .filter_map(|item| {
            let date = item.day()?;
            Some(Holiday {
                name: item.title,
                date,
            })
        })
        .collect()
}

pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "range": {
                "type": "object",
                "properties": {
                    "start": {"type": "string", "format": "date"},
                    "end": {"type": "string", "format": "date"}
                },
                "required": ["start", "end"]
            },
            "locale": {
                "type": "string",
                "enum": SUPPORTED_LOCALES,
                "default": "IL"
            },
            "limit": {"type": "integer", "minimum": 1}
        },
        "required": ["range"]
    })
}

pub fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "locale": {"type": "string"},
            "holidays": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "date": {"type": "string", "format": "date"}
                    }
                }
            }
        }
    })
}
