//! Tool adapters: course search, weather, holidays and calendar.
//!
//! The set of tools is closed. Every call goes through [`ToolKit::invoke`],
//! which validates the typed input, dispatches on the variant and bounds the
//! call with a timeout.

pub mod calendar;
pub mod course_search;
pub mod holiday;
pub mod weather;

pub use calendar::{CalendarEvent, CalendarInput, CalendarProvider, CalendarStore, EventKind};
pub use course_search::{CourseSearchInput, CourseSearchTool};
pub use holiday::{Hebcal, Holiday, HolidayInput, HolidayProvider};
pub use weather::{
    OpenMeteo, WeatherInput, WeatherLookup, WeatherProvider, WeatherReport,
};

use crate::error::ToolError;
use crate::rag::RetrievedChunk;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// The available tools, declared in routing priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    CourseSearch,
    Weather,
    Holiday,
    Calendar,
}

impl ToolName {
    /// All tools, highest priority first.
    pub const ALL: [ToolName; 4] = [
        ToolName::CourseSearch,
        ToolName::Weather,
        ToolName::Holiday,
        ToolName::Calendar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::CourseSearch => "course_search",
            ToolName::Weather => "weather",
            ToolName::Holiday => "holiday",
            ToolName::Calendar => "calendar",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::CourseSearch => {
                "Search the Information Retrieval course materials for passages relevant to a question."
            }
            ToolName::Weather => {
                "Current weather for a city, or the daily forecast for a specific date (YYYY-MM-DD)."
            }
            ToolName::Holiday => "Public holidays within a date range for a locale.",
            ToolName::Calendar => "Events from the student's calendar (exams, deadlines, classes, meetings).",
        }
    }

    /// JSON schema of the tool's input.
    pub fn input_schema(&self) -> serde_json::Value {
        match self {
            ToolName::CourseSearch => course_search::input_schema(),
            ToolName::Weather => weather::input_schema(),
            ToolName::Holiday => holiday::input_schema(),
            ToolName::Calendar => calendar::input_schema(),
        }
    }

    /// JSON schema of the tool's output.
    pub fn output_schema(&self) -> serde_json::Value {
        match self {
            ToolName::CourseSearch => course_search::output_schema(),
            ToolName::Weather => weather::output_schema(),
            ToolName::Holiday => holiday::output_schema(),
            ToolName::Calendar => calendar::output_schema(),
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "course_search" | "search" | "rag" => Ok(ToolName::CourseSearch),
            "weather" => Ok(ToolName::Weather),
            "holiday" | "holidays" => Ok(ToolName::Holiday),
            "calendar" => Ok(ToolName::Calendar),
            _ => Err(ToolError::InvalidInput(format!("Unknown tool: {}", s))),
        }
    }
}

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Longest range a single call may cover.
    pub const MAX_DAYS: i64 = 731;

    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    /// The whole calendar year.
    pub fn year(year: i32) -> Option<Self> {
        Some(Self {
            start: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year, 12, 31)?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Calendar years touched by the range, in order.
    pub fn years(&self) -> Vec<i32> {
        (self.start.year()..=self.end.year()).collect()
    }

    pub fn validate(&self) -> Result<(), ToolError> {
        if self.end < self.start {
            return Err(ToolError::InvalidInput(format!(
                "date range ends ({}) before it starts ({})",
                self.end, self.start
            )));
        }
        if (self.end - self.start).num_days() > Self::MAX_DAYS {
            return Err(ToolError::InvalidInput(format!(
                "date range {} spans more than {} days",
                self,
                Self::MAX_DAYS
            )));
        }
        Ok(())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{} to {}", self.start, self.end)
        }
    }
}

/// Typed input for one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "input", rename_all = "snake_case")]
pub enum ToolInput {
    CourseSearch(CourseSearchInput),
    Weather(WeatherInput),
    Holiday(HolidayInput),
    Calendar(CalendarInput),
}

impl ToolInput {
    /// The tool this input is addressed to.
    pub fn tool(&self) -> ToolName {
        match self {
            ToolInput::CourseSearch(_) => ToolName::CourseSearch,
            ToolInput::Weather(_) => ToolName::Weather,
            ToolInput::Holiday(_) => ToolName::Holiday,
            ToolInput::Calendar(_) => ToolName::Calendar,
        }
    }

    /// Check the input against its tool's schema constraints.
    pub fn validate(&self) -> Result<(), ToolError> {
        match self {
            ToolInput::CourseSearch(input) => input.validate(),
            ToolInput::Weather(input) => input.validate(),
            ToolInput::Holiday(input) => input.validate(),
            ToolInput::Calendar(input) => input.validate(),
        }
    }

    /// Build a validated input from raw JSON arguments.
    ///
    /// A weather lookup without a location uses `default_location`.
    pub fn parse(tool: ToolName, args: serde_json::Value, default_location: &str) -> Result<Self, ToolError> {
        let invalid = |e: serde_json::Error| ToolError::InvalidInput(format!("{}: {}", tool, e));
        let input = match tool {
            ToolName::CourseSearch => ToolInput::CourseSearch(serde_json::from_value(args).map_err(invalid)?),
            ToolName::Weather => {
                let mut input: WeatherInput = serde_json::from_value(args).map_err(invalid)?;
                if input.location.trim().is_empty() {
                    input.location = default_location.to_string();
                }
                ToolInput::Weather(input)
            }
            ToolName::Holiday => ToolInput::Holiday(serde_json::from_value(args).map_err(invalid)?),
            ToolName::Calendar => ToolInput::Calendar(serde_json::from_value(args).map_err(invalid)?),
        };
        input.validate()?;
        Ok(input)
    }
}

impl fmt::Display for ToolInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolInput::CourseSearch(i) => write!(f, "course_search(\"{}\", k={})", i.query, i.k),
            ToolInput::Weather(i) => match i.date {
                Some(date) => write!(f, "weather(\"{}\", {})", i.location, date),
                None => write!(f, "weather(\"{}\", now)", i.location),
            },
            ToolInput::Holiday(i) => write!(f, "holiday({}, {})", i.range, i.locale),
            ToolInput::Calendar(i) => match i.kind {
                Some(kind) => write!(f, "calendar({}, {})", i.range, kind),
                None => write!(f, "calendar({})", i.range),
            },
        }
    }
}

/// Successful result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutput {
    Chunks { chunks: Vec<RetrievedChunk> },
    Weather { report: WeatherReport },
    Holidays { locale: String, holidays: Vec<Holiday> },
    Events { events: Vec<CalendarEvent> },
    /// The service answered, but has nothing for this input.
    NotFound { reason: String },
}

impl ToolOutput {
    pub fn not_found(reason: impl Into<String>) -> Self {
        ToolOutput::NotFound {
            reason: reason.into(),
        }
    }

    /// True when the output records the absence of data.
    pub fn is_absence(&self) -> bool {
        matches!(self, ToolOutput::NotFound { .. })
    }

    /// Human-readable rendering used in answers.
    pub fn render(&self) -> String {
        match self {
            ToolOutput::Chunks { chunks } => crate::rag::context::format_context_for_display(chunks),
            ToolOutput::Weather { report } => report.render(),
            ToolOutput::Holidays { locale, holidays } => holiday::render(locale, holidays),
            ToolOutput::Events { events } => calendar::render(events),
            ToolOutput::NotFound { reason } => reason.clone(),
        }
    }
}

/// Owns the four adapters and dispatches calls to them.
pub struct ToolKit {
    course: CourseSearchTool,
    weather: Arc<dyn WeatherProvider>,
    holidays: Arc<dyn HolidayProvider>,
    calendar: Arc<dyn CalendarProvider>,
    timeout: Duration,
    forecast_horizon_days: i64,
}

impl ToolKit {
    pub fn new(
        course: CourseSearchTool,
        weather: Arc<dyn WeatherProvider>,
        holidays: Arc<dyn HolidayProvider>,
        calendar: Arc<dyn CalendarProvider>,
    ) -> Self {
        Self {
            course,
            weather,
            holidays,
            calendar,
            timeout: Duration::from_secs(15),
            forecast_horizon_days: 15,
        }
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how many days ahead forecasts are available.
    pub fn with_forecast_horizon(mut self, days: i64) -> Self {
        self.forecast_horizon_days = days;
        self
    }

    /// Validate and run one tool call.
    ///
    /// `today` anchors date policies such as the forecast horizon.
    #[instrument(skip(self), fields(tool = %input.tool()))]
    pub async fn invoke(&self, input: &ToolInput, today: NaiveDate) -> Result<ToolOutput, ToolError> {
        input.validate()?;
        info!("Invoking {}", input);

        let call = async {
            match input {
                ToolInput::CourseSearch(i) => self.course.invoke(i).await,
                ToolInput::Weather(i) => {
                    weather::invoke(self.weather.as_ref(), i, today, self.forecast_horizon_days).await
                }
                ToolInput::Holiday(i) => holiday::invoke(self.holidays.as_ref(), i).await,
                ToolInput::Calendar(i) => calendar::invoke(self.calendar.as_ref(), i).await,
            }
        };

        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(self.timeout)),
        };

        match &result {
            Ok(output) if output.is_absence() => debug!("{} found nothing", input.tool()),
            Ok(_) => debug!("{} succeeded", input.tool()),
            Err(e) => warn!("{} failed: {}", input.tool(), e),
        }
        result
    }
}
