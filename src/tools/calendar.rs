//! Student calendar kept in a local JSON file.
//!
//! The file is created with a few sample events on first use. A file that
//! cannot be parsed is replaced by the samples rather than failing the app.

use super::{DateRange, ToolOutput};
use crate::error::{CourseMateError, Result, ToolError};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Exam,
    Deadline,
    Class,
    Meeting,
    #[serde(other)]
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Exam => "exam",
            EventKind::Deadline => "deadline",
            EventKind::Class => "class",
            EventKind::Meeting => "meeting",
            EventKind::Other => "other",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = CourseMateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "exam" | "exams" => Ok(EventKind::Exam),
            "deadline" | "deadlines" => Ok(EventKind::Deadline),
            "class" | "lecture" => Ok(EventKind::Class),
            "meeting" => Ok(EventKind::Meeting),
            "other" => Ok(EventKind::Other),
            other => Err(CourseMateError::InvalidInput(format!("unknown event type: {}", other))),
        }
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub title: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    #[serde(rename = "type")]
    pub kind: EventKind,
}

impl CalendarEvent {
    /// Build an event from user-entered strings.
    pub fn parse(title: &str, date: &str, time: &str, kind: &str) -> Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(CourseMateError::InvalidInput("event title is empty".to_string()));
        }
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
            CourseMateError::InvalidInput(format!("invalid date {:?}, use YYYY-MM-DD", date))
        })?;
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|_| {
            CourseMateError::InvalidInput(format!("invalid time {:?}, use HH:MM", time))
        })?;

        Ok(Self {
            title: title.to_string(),
            date,
            time,
            kind: kind.parse()?,
        })
    }

    fn same_as(&self, other: &CalendarEvent) -> bool {
        self.title.eq_ignore_ascii_case(&other.title)
            && self.date == other.date
            && self.time == other.time
            && self.kind == other.kind
    }
}

fn sample_events() -> Vec<CalendarEvent> {
    let event = |title: &str, date: &str, time: &str, kind| CalendarEvent {
        title: title.to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap_or_default(),
        time: NaiveTime::parse_from_str(time, "%H:%M").unwrap_or_default(),
        kind,
    };
    let mut events = vec![
        event("Information Retrieval Final Project", "2026-02-15", "23:59", EventKind::Deadline),
        event("IR Lecture - Advanced Ranking", "2026-02-03", "10:00", EventKind::Class),
        event("Machine Learning Exam", "2026-02-10", "09:00", EventKind::Exam),
        event("Study Group - RAG Systems", "2026-02-05", "14:00", EventKind::Meeting),
    ];
    sort_events(&mut events);
    events
}

fn sort_events(events: &mut [CalendarEvent]) {
    events.sort_by(|a, b| (a.date, a.time, &a.title).cmp(&(b.date, b.time, &b.title)));
}

/// Result of adding an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Duplicate,
}

/// JSON-file backed calendar.
pub struct CalendarStore {
    path: PathBuf,
    events: RwLock<Vec<CalendarEvent>>,
}

impl CalendarStore {
    /// Open the calendar at `path`, creating it with sample events if missing.
    #[instrument]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            path: path.to_path_buf(),
            events: RwLock::new(Vec::new()),
        };

        let events = if path.exists() {
            match Self::read_events(path) {
                Ok(events) => events,
                Err(e) => {
                    warn!("Failed to load calendar {:?}: {}. Restoring sample events.", path, e);
                    let events = sample_events();
                    store.write_events(&events)?;
                    events
                }
            }
        } else {
            info!("Creating calendar at {:?}", path);
            let events = sample_events();
            store.write_events(&events)?;
            events
        };

        *store.events.write().map_err(poisoned)? = events;
        Ok(store)
    }

    /// Parse the file, dropping entries that fail validation.
    fn read_events(path: &Path) -> Result<Vec<CalendarEvent>> {
        let content = std::fs::read_to_string(path)?;
        let raw: Vec<Value> = serde_json::from_str(&content)?;
        let total = raw.len();
        let mut events: Vec<CalendarEvent> = raw
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .filter(|e: &CalendarEvent| !e.title.trim().is_empty())
            .collect();
        if events.len() < total {
            warn!("Skipped {} invalid calendar entries", total - events.len());
        }
        sort_events(&mut events);
        Ok(events)
    }

    fn write_events(&self, events: &[CalendarEvent]) -> Result<()> {
        let json = serde_json::to_string_pretty(events)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All events ordered by date and time.
    pub fn list(&self) -> Result<Vec<CalendarEvent>> {
        Ok(self.events.read().map_err(poisoned)?.clone())
    }

    /// Add an event and persist the calendar. Exact duplicates are ignored.
    pub fn add(&self, event: CalendarEvent) -> Result<AddOutcome> {
        let mut events = self.events.write().map_err(poisoned)?;
        if events.iter().any(|e| e.same_as(&event)) {
            return Ok(AddOutcome::Duplicate);
        }
        info!("Adding calendar event {:?}", event.title);
        events.push(event);
        sort_events(&mut events);
        self.write_events(&events)?;
        Ok(AddOutcome::Added)
    }

    /// Remove every event whose title matches, ignoring case. Returns the count removed.
    pub fn remove(&self, title: &str) -> Result<usize> {
        let wanted = title.trim().to_lowercase();
        if wanted.is_empty() {
            return Err(CourseMateError::InvalidInput("provide a title to remove".to_string()));
        }

        let mut events = self.events.write().map_err(poisoned)?;
        let before = events.len();
        events.retain(|e| e.title.trim().to_lowercase() != wanted);
        let removed = before - events.len();
        if removed > 0 {
            self.write_events(&events)?;
        }
        Ok(removed)
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> CourseMateError {
    CourseMateError::Calendar(format!("Failed to acquire lock: {}", e))
}

/// Read access to calendar events, as used by the tool adapter.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn events(&self) -> std::result::Result<Vec<CalendarEvent>, ToolError>;
}

#[async_trait]
impl CalendarProvider for CalendarStore {
    async fn events(&self) -> std::result::Result<Vec<CalendarEvent>, ToolError> {
        Ok(self.list()?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarInput {
    pub range: DateRange,
    /// Only events of this type.
    #[serde(default)]
    pub kind: Option<EventKind>,
    /// Only events whose title contains this text.
    #[serde(default)]
    pub query: Option<String>,
    /// Keep only the first `limit` events.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CalendarInput {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            kind: None,
            query: None,
            limit: None,
        }
    }

    pub fn of_kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ToolError> {
        self.range.validate()?;
        if self.limit == Some(0) {
            return Err(ToolError::InvalidInput("limit must be positive".to_string()));
        }
        Ok(())
    }

    fn matches(&self, event: &CalendarEvent) -> bool {
        self.range.contains(event.date)
            && self.kind.map_or(true, |k| k == event.kind)
            && self
                .query
                .as_deref()
                .map_or(true, |q| event.title.to_lowercase().contains(&q.trim().to_lowercase()))
    }
}

pub async fn invoke(
    provider: &dyn CalendarProvider,
    input: &CalendarInput,
) -> std::result::Result<ToolOutput, ToolError> {
    let mut events: Vec<CalendarEvent> = provider
        .events()
        .await?
        .into_iter()
        .filter(|e| input.matches(e))
        .collect();
    sort_events(&mut events);
    if let Some(limit) = input.limit {
        events.truncate(limit);
    }

    if events.is_empty() {
        let what = input.kind.map(|k| format!("{} events", k)).unwrap_or_else(|| "events".to_string());
        return Ok(ToolOutput::not_found(format!(
            "No {} scheduled between {} and {}",
            what, input.range.start, input.range.end
        )));
    }
    Ok(ToolOutput::Events { events })
}

pub(crate) fn render(events: &[CalendarEvent]) -> String {
    events
        .iter()
        .map(|e| {
            format!(
                "- {} ({}) on {} at {}",
                e.title,
                e.kind,
                e.date.format("%A, %Y-%m-%d"),
                e.time.format("%H:%M")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
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
            "kind": {"type": "string", "enum": ["exam", "deadline", "class", "meeting", "other"]},
            "query": {"type": "string", "description": "Text the event title must contain"},
            "limit": {"type": "integer", "minimum": 1}
        },
        "required": ["range"]
    })
}

pub fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "events": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "date": {"type": "string", "format": "date"},
                        "time": {"type": "string", "pattern": "^\\d{2}:\\d{2}$"},
                        "type": {"type": "string"}
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::date;

    fn store_in(dir: &tempfile::TempDir) -> CalendarStore {
        CalendarStore::open(&dir.path().join("calendar_events.json")).unwrap()
    }

    #[test]
    fn test_first_open_writes_samples() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.list().unwrap().len(), 4);

        let written = std::fs::read_to_string(store.path()).unwrap();
        assert!(written.contains("\"time\": \"09:00\""));
        assert!(written.contains("\"type\": \"exam\""));
    }

    #[test]
    fn test_corrupted_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar_events.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = CalendarStore::open(&path).unwrap();
        assert_eq!(store.list().unwrap(), sample_events());
    }

    #[test]
    fn test_invalid_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar_events.json");
        std::fs::write(
            &path,
            r#"[
                {"title": "Quiz", "date": "2026-03-01", "time": "08:30", "type": "exam"},
                {"title": "Broken", "date": "01/03/2026", "time": "08:30", "type": "exam"},
                {"title": "Party", "date": "2026-03-02", "time": "20:00", "type": "social"}
            ]"#,
        )
        .unwrap();

        let events = CalendarStore::open(&path).unwrap().list().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, EventKind::Other);
    }

    #[test]
    fn test_add_persists_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let event = CalendarEvent::parse("IR Exam", "2026-02-20", "09:00", "exam").unwrap();

        assert_eq!(store.add(event.clone()).unwrap(), AddOutcome::Added);
        let mut shouted = event.clone();
        shouted.title = "ir exam".into();
        assert_eq!(store.add(shouted).unwrap(), AddOutcome::Duplicate);

        let reopened = store_in(&dir);
        assert!(reopened.list().unwrap().contains(&event));
    }

    #[test]
    fn test_remove_matches_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.remove("machine learning exam").unwrap(), 1);
        assert_eq!(store.remove("Machine Learning Exam").unwrap(), 0);
        assert_eq!(store_in(&dir).list().unwrap().len(), 3);
    }

    #[test]
    fn test_parse_validates_fields() {
        assert!(CalendarEvent::parse("", "2026-02-20", "09:00", "exam").is_err());
        assert!(CalendarEvent::parse("X", "2026-2-30", "09:00", "exam").is_err());
        assert!(CalendarEvent::parse("X", "2026-02-20", "9am", "exam").is_err());
        assert!(CalendarEvent::parse("X", "2026-02-20", "09:00", "party").is_err());
    }

    #[tokio::test]
    async fn test_next_exam_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let input = CalendarInput::new(DateRange::new(date("2026-02-01"), date("2027-01-31")))
            .of_kind(EventKind::Exam)
            .with_limit(1);

        let output = invoke(&store, &input).await.unwrap();
        let ToolOutput::Events { events } = output else {
            panic!("expected events");
        };
        assert_eq!(events[0].title, "Machine Learning Exam");
        assert_eq!(events[0].date, date("2026-02-10"));
    }

    #[tokio::test]
    async fn test_empty_window_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let input = CalendarInput::new(DateRange::new(date("2026-06-01"), date("2026-06-07")));
        let output = invoke(&store_in(&dir), &input).await.unwrap();
        assert!(output.is_absence());
    }
}
