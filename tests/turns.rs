//! End-to-end turns through the orchestrator with in-process providers.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use coursemate::config::{PolicySettings, Prompts};
use coursemate::embedding::Embedder;
use coursemate::orchestrator::{
    ConversationState, Orchestrator, RoutingPolicy, RuleRouter, Session, TurnPhase,
};
use coursemate::rag::{AnswerKind, Retriever, Synthesizer, INSUFFICIENT_INFORMATION};
use coursemate::tools::weather::DailyForecast;
use coursemate::tools::{
    CalendarEvent, CalendarProvider, CourseSearchTool, EventKind, Holiday, HolidayProvider,
    ToolInput, ToolKit, ToolName, WeatherInput, WeatherLookup, WeatherProvider, WeatherReport,
};
use coursemate::vector_store::{Document, MemoryVectorStore, VectorStore};
use coursemate::ToolError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const VOCABULARY: [&str; 4] = ["tf-idf", "bm25", "pagerank", "precision"];

/// One dimension per vocabulary term, counting occurrences.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> coursemate::Result<Vec<f32>> {
        let lower = text.to_lowercase();
        Ok(VOCABULARY
            .iter()
            .map(|term| lower.matches(term).count() as f32)
            .collect())
    }

    fn model(&self) -> &str {
        "keywords"
    }
}

#[derive(Default)]
struct FakeWeather {
    calls: Mutex<Vec<WeatherInput>>,
    delay: Option<Duration>,
    failure: Option<ToolError>,
}

impl FakeWeather {
    fn hanging(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn failing(error: ToolError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<WeatherInput> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WeatherProvider for FakeWeather {
    async fn lookup(&self, input: &WeatherInput) -> Result<WeatherLookup, ToolError> {
        self.calls.lock().unwrap().push(input.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let date = input.date.unwrap_or_else(|| date("2026-02-01"));
        Ok(WeatherLookup::Found(WeatherReport::Daily(DailyForecast {
            location: input.location.clone(),
            date,
            temperature_min_c: Some(9.0),
            temperature_max_c: Some(15.0),
            precipitation_probability: Some(80.0),
            wind_max_kmh: Some(30.0),
            conditions: "Moderate rain".to_string(),
        })))
    }
}

#[derive(Default)]
struct FakeHolidays {
    holidays: Vec<Holiday>,
    calls: AtomicUsize,
}

#[async_trait]
impl HolidayProvider for FakeHolidays {
    async fn holidays_in_year(&self, year: i32, _locale: &str) -> Result<Vec<Holiday>, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .holidays
            .iter()
            .filter(|h| chrono::Datelike::year(&h.date) == year)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct FakeCalendar {
    events: Vec<CalendarEvent>,
    calls: AtomicUsize,
}

#[async_trait]
impl CalendarProvider for FakeCalendar {
    async fn events(&self) -> Result<Vec<CalendarEvent>, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.events.clone())
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// A Sunday, nine days before the exam.
fn today() -> NaiveDate {
    date("2026-02-01")
}

fn exam() -> CalendarEvent {
    CalendarEvent {
        title: "Machine Learning Exam".to_string(),
        date: date("2026-02-10"),
        time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        kind: EventKind::Exam,
    }
}

struct Harness {
    weather: Arc<FakeWeather>,
    holidays: Arc<FakeHolidays>,
    calendar: Arc<FakeCalendar>,
    policy: PolicySettings,
    tool_timeout: Duration,
}

impl Harness {
    fn new() -> Self {
        Self {
            weather: Arc::new(FakeWeather::default()),
            holidays: Arc::new(FakeHolidays::default()),
            calendar: Arc::new(FakeCalendar {
                events: vec![exam()],
                ..FakeCalendar::default()
            }),
            policy: PolicySettings::default(),
            tool_timeout: Duration::from_secs(5),
        }
    }

    fn with_weather(mut self, weather: FakeWeather) -> Self {
        self.weather = Arc::new(weather);
        self
    }

    fn with_holidays(mut self, holidays: Vec<Holiday>) -> Self {
        self.holidays = Arc::new(FakeHolidays {
            holidays,
            ..FakeHolidays::default()
        });
        self
    }

    async fn build(&self) -> Orchestrator {
        let store = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(KeywordEmbedder);
        let docs = [
            ("lecture02.pdf", "TF-IDF weighs a term by its frequency in the document and its rarity across the collection."),
            ("lecture04.pdf", "BM25 saturates term frequency and normalizes by document length."),
            ("lecture07.pdf", "PageRank scores pages by the stationary distribution of a random surfer."),
        ];
        let mut batch = Vec::new();
        for (i, (source, text)) in docs.iter().enumerate() {
            let embedding = embedder.embed(text).await.unwrap();
            batch.push(Document::new(source.to_string(), text.to_string(), i as i64 * 1000, embedding));
        }
        store.upsert_batch(&batch).await.unwrap();

        let retriever = Retriever::new(store, embedder).with_min_score(0.3);
        let toolkit = ToolKit::new(
            CourseSearchTool::new(Arc::new(retriever)),
            self.weather.clone(),
            self.holidays.clone(),
            self.calendar.clone(),
        )
        .with_timeout(self.tool_timeout)
        .with_forecast_horizon(self.policy.forecast_horizon_days);

        let routing = RoutingPolicy {
            max_attempts_per_tool: self.policy.max_attempts_per_tool,
            max_consecutive_failures: self.policy.max_consecutive_failures,
            ..RoutingPolicy::default()
        };

        Orchestrator::with_components(
            toolkit,
            Arc::new(RuleRouter::new(routing)),
            Synthesizer::new(Prompts::default()),
            self.policy.clone(),
        )
    }
}

fn tools_called(state: &ConversationState) -> Vec<ToolName> {
    state
        .current()
        .unwrap()
        .invocations()
        .iter()
        .map(|inv| inv.tool())
        .collect()
}

#[tokio::test]
async fn course_question_cites_retrieved_chunk() {
    let harness = Harness::new();
    let orchestrator = harness.build().await;

    let (state, answer) = tokio_test::assert_ok!(
        orchestrator
            .run_turn(ConversationState::new(), "What is TF-IDF?", today())
            .await
    );

    assert_eq!(tools_called(&state), vec![ToolName::CourseSearch]);
    assert_eq!(state.current().unwrap().phase(), TurnPhase::Responding);
    assert_eq!(answer.kind, AnswerKind::Grounded);
    assert!(answer.text.contains("[#1.1]"));
    assert!(answer.text.contains("rarity across the collection"));
    assert!(answer.citations.iter().any(|r| r.invocation == 0 && r.item == Some(0)));
}

#[tokio::test]
async fn umbrella_on_exam_day_chains_calendar_into_weather() {
    let harness = Harness::new();
    let orchestrator = harness.build().await;

    let (state, answer) = orchestrator
        .run_turn(
            ConversationState::new(),
            "Will I need an umbrella on my exam day?",
            today(),
        )
        .await
        .unwrap();

    assert_eq!(tools_called(&state), vec![ToolName::Calendar, ToolName::Weather]);
    let weather_calls = harness.weather.calls();
    assert_eq!(weather_calls.len(), 1);
    assert_eq!(weather_calls[0].date, Some(date("2026-02-10")));

    assert_eq!(answer.kind, AnswerKind::Grounded);
    assert!(answer.text.contains("precipitation"));
    assert!(answer.text.contains("Machine Learning Exam"));
    assert_eq!(harness.holidays.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repeated_weather_timeouts_fail_with_apology() {
    let mut harness = Harness::new().with_weather(FakeWeather::hanging(Duration::from_millis(500)));
    harness.tool_timeout = Duration::from_millis(20);
    let orchestrator = harness.build().await;

    let (state, answer) = orchestrator
        .run_turn(
            ConversationState::new(),
            "What's the weather in Haifa tomorrow?",
            today(),
        )
        .await
        .unwrap();

    let turn = state.current().unwrap();
    assert_eq!(turn.phase(), TurnPhase::Failed);
    assert_eq!(turn.invocations().len(), 3);
    assert!(turn
        .invocations()
        .iter()
        .all(|inv| matches!(inv.outcome, Err(ToolError::Timeout(_)))));
    assert_eq!(answer.kind, AnswerKind::Apology);
    assert!(answer.text.starts_with("Sorry"));
}

#[tokio::test]
async fn holiday_out_of_range_is_a_caveat_not_a_retry() {
    let harness = Harness::new().with_holidays(vec![Holiday {
        name: "Purim".to_string(),
        date: date("2026-03-03"),
    }]);
    let orchestrator = harness.build().await;

    let (state, answer) = orchestrator
        .run_turn(ConversationState::new(), "Are there any holidays in 2150?", today())
        .await
        .unwrap();

    assert_eq!(tools_called(&state), vec![ToolName::Holiday]);
    assert_eq!(harness.holidays.calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.current().unwrap().phase(), TurnPhase::Responding);
    assert_eq!(answer.kind, AnswerKind::InsufficientInformation);
    assert!(answer.text.starts_with(INSUFFICIENT_INFORMATION));
    assert_eq!(answer.caveats.len(), 1);
    assert!(answer.caveats[0].contains("2150"));
}

#[tokio::test]
async fn course_questions_never_touch_date_tools() {
    let harness = Harness::new();
    let orchestrator = harness.build().await;

    for query in [
        "What is TF-IDF?",
        "How does BM25 normalize document length?",
        "Explain PageRank",
        "Compare precision and recall",
    ] {
        let (state, _) = orchestrator
            .run_turn(ConversationState::new(), query, today())
            .await
            .unwrap();
        assert_eq!(tools_called(&state), vec![ToolName::CourseSearch], "{}", query);
    }

    assert!(harness.weather.calls().is_empty());
    assert_eq!(harness.holidays.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.calendar.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn weather_vocabulary_in_course_questions_stays_in_course_search() {
    let harness = Harness::new();
    let orchestrator = harness.build().await;

    for query in [
        "How does PageRank use the in-degrees of pages?",
        "What does the temperature parameter control in language models?",
    ] {
        let (state, _) = orchestrator
            .run_turn(ConversationState::new(), query, today())
            .await
            .unwrap();
        assert_eq!(tools_called(&state), vec![ToolName::CourseSearch], "{}", query);
    }

    assert!(harness.weather.calls().is_empty());
}

#[tokio::test]
async fn invocations_stay_within_attempt_budget() {
    let mut harness = Harness::new().with_weather(FakeWeather::failing(ToolError::Transport(
        "connection refused".to_string(),
    )));
    // Never give up early on consecutive failures; only the per-tool budget applies.
    harness.policy.max_consecutive_failures = 100;
    let orchestrator = harness.build().await;

    let (state, _) = orchestrator
        .run_turn(
            ConversationState::new(),
            "Explain BM25, and will it rain on my exam day? Any holidays that day?",
            today(),
        )
        .await
        .unwrap();

    let turn = state.current().unwrap();
    let bound = ToolName::ALL.len() * harness.policy.max_attempts_per_tool;
    assert!(turn.invocations().len() <= bound);
    assert_eq!(turn.attempts(ToolName::Weather), harness.policy.max_attempts_per_tool);
    assert!(turn.phase().is_terminal());
}

#[tokio::test]
async fn no_evidence_yields_marker() {
    let harness = Harness::new();
    let orchestrator = harness.build().await;

    let (_, answer) = orchestrator
        .run_turn(ConversationState::new(), "Tell me about the cafeteria menu", today())
        .await
        .unwrap();

    assert_eq!(answer.kind, AnswerKind::InsufficientInformation);
    assert!(answer.text.starts_with(INSUFFICIENT_INFORMATION));
}

#[tokio::test]
async fn session_keeps_turns_until_cleared() {
    let harness = Harness::new();
    let mut session = Session::new(Arc::new(harness.build().await));

    session.ask("What is TF-IDF?", today()).await.unwrap();
    session.ask("And BM25?", today()).await.unwrap();
    assert_eq!(session.state().turns().len(), 2);
    assert!(session.state().turns().iter().all(|t| t.phase().is_terminal()));

    assert!(session.ask("   ", today()).await.is_err());
    assert_eq!(session.state().turns().len(), 2);

    session.clear();
    assert!(session.state().is_empty());
}

#[tokio::test]
async fn concurrent_calls_are_recorded_in_priority_order() {
    let mut harness = Harness::new();
    harness.policy.concurrent_tools = true;
    let orchestrator = harness.build().await;

    let (state, answer) = orchestrator
        .run_turn(
            ConversationState::new(),
            "What's my schedule and the weather in Haifa tomorrow?",
            today(),
        )
        .await
        .unwrap();

    let turn = state.current().unwrap();
    assert_eq!(tools_called(&state), vec![ToolName::Weather, ToolName::Calendar]);
    // One step for the batch, one to respond.
    assert_eq!(turn.steps(), 2);
    assert_eq!(answer.kind, AnswerKind::Grounded);
}

#[tokio::test]
async fn turn_deadline_forces_a_response() {
    let mut harness = Harness::new().with_weather(FakeWeather::hanging(Duration::from_secs(10)));
    harness.policy.turn_deadline_secs = 1;
    let orchestrator = harness.build().await;

    let (state, answer) = orchestrator
        .run_turn(
            ConversationState::new(),
            "What's the weather in Haifa tomorrow?",
            today(),
        )
        .await
        .unwrap();

    let turn = state.current().unwrap();
    assert!(turn.deadline_exceeded());
    assert_eq!(turn.phase(), TurnPhase::Responding);
    assert!(turn.invocations().is_empty());
    assert_eq!(answer.kind, AnswerKind::InsufficientInformation);
}

#[tokio::test]
async fn direct_tool_calls_validate_input() {
    let harness = Harness::new();
    let orchestrator = harness.build().await;

    let parsed = ToolInput::parse(
        ToolName::Weather,
        serde_json::json!({ "location": "my location" }),
        "Haifa, Israel",
    );
    assert!(matches!(parsed, Err(ToolError::InvalidInput(_))));

    let input = ToolInput::Weather(WeatherInput::current("my location"));
    let result = orchestrator.toolkit().invoke(&input, today()).await;

    assert!(matches!(result, Err(ToolError::InvalidInput(_))));
    assert!(harness.weather.calls().is_empty());
}
