//! Routing decisions: which tool to call next, or when to stop.

use super::intent::{IntentAnalyzer, QueryIntent};
use super::state::{ConversationState, Turn};
use crate::config::Settings;
use crate::error::ToolError;
use crate::evidence::EvidenceRef;
use crate::tools::course_search::DEFAULT_K;
use crate::tools::{
    CalendarInput, CourseSearchInput, DateRange, HolidayInput, ToolInput, ToolName, ToolOutput,
    WeatherInput,
};
use chrono::{Duration, NaiveDate};
use regex::Regex;
use tracing::debug;

/// What the orchestrator should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterDecision {
    Invoke(ToolInput),
    Respond { evidence: Vec<EvidenceRef> },
    Fail { reason: String, evidence: Vec<EvidenceRef> },
}

/// Chooses the next step of a turn from the accumulated state.
pub trait Router: Send + Sync {
    /// Decide for the current turn of `state`.
    fn decide(&self, state: &ConversationState) -> RouterDecision;

    /// Every invocation that could run now, highest priority first.
    ///
    /// The first entry is what [`Router::decide`] would invoke. Used when
    /// independent calls are issued together.
    fn eligible(&self, state: &ConversationState) -> Vec<ToolInput>;
}

/// Thresholds and defaults the rule router works with.
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    pub max_attempts_per_tool: usize,
    pub max_consecutive_failures: usize,
    pub default_location: String,
    pub default_locale: String,
    pub upcoming_days: i64,
    pub course_k: usize,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_tool: 3,
            max_consecutive_failures: 3,
            default_location: "Haifa, Israel".to_string(),
            default_locale: "IL".to_string(),
            upcoming_days: 7,
            course_k: DEFAULT_K,
        }
    }
}

impl RoutingPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts_per_tool: settings.policy.max_attempts_per_tool,
            max_consecutive_failures: settings.policy.max_consecutive_failures,
            default_location: settings.weather.default_location.clone(),
            default_locale: settings.holiday.default_locale.clone(),
            upcoming_days: settings.calendar.upcoming_days,
            course_k: settings.retrieval.top_k,
        }
    }
}

/// Where a need stands for the current turn.
enum Plan {
    Ready(ToolInput),
    /// Waiting for another tool's result.
    Blocked,
    /// Satisfied, exhausted, or impossible.
    Done,
}

/// Deterministic router driven by keyword and date analysis of the query.
pub struct RuleRouter {
    analyzer: IntentAnalyzer,
    policy: RoutingPolicy,
    iso_date: Regex,
}

impl RuleRouter {
    pub fn new(policy: RoutingPolicy) -> Self {
        Self {
            analyzer: IntentAnalyzer::new(),
            policy,
            iso_date: Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("Invalid regex"),
        }
    }

    fn plans(&self, turn: &Turn) -> Vec<Plan> {
        let intent = self.analyzer.analyze(turn.query(), turn.issued_on());
        debug!(?intent, "Analyzed query");

        ToolName::ALL
            .iter()
            .map(|tool| self.plan(*tool, turn, &intent))
            .collect()
    }

    fn plan(&self, tool: ToolName, turn: &Turn, intent: &QueryIntent) -> Plan {
        let wanted = match tool {
            ToolName::CourseSearch => intent.course,
            ToolName::Weather => intent.weather,
            ToolName::Holiday => intent.holiday,
            ToolName::Calendar => intent.calendar,
        };
        if !wanted || turn.answered(tool) || turn.attempts(tool) >= self.policy.max_attempts_per_tool {
            return Plan::Done;
        }

        let input = match tool {
            ToolName::CourseSearch => Some(ToolInput::CourseSearch(CourseSearchInput {
                query: turn.query().to_string(),
                k: self.policy.course_k,
            })),
            ToolName::Weather => match self.target_date(turn, intent) {
                Target::Pending => return Plan::Blocked,
                Target::Unresolved => None,
                Target::Date(date) => Some(ToolInput::Weather(self.weather_input(turn, intent, date))),
            },
            ToolName::Holiday => match self.target_date(turn, intent) {
                Target::Pending => return Plan::Blocked,
                Target::Unresolved => None,
                Target::Date(date) => Some(ToolInput::Holiday(self.holiday_input(turn, intent, date))),
            },
            ToolName::Calendar => Some(ToolInput::Calendar(self.calendar_input(turn, intent))),
        };

        match input {
            Some(input) if !turn.has_output_for(&input) => Plan::Ready(input),
            _ => Plan::Done,
        }
    }

    /// Resolve the date a weather or holiday lookup is about.
    ///
    /// Explicit and relative dates in the query come first. An event reference
    /// takes the date of the first event the calendar returned, falling back to
    /// an ISO date quoted in the course material.
    fn target_date(&self, turn: &Turn, intent: &QueryIntent) -> Target {
        if intent.date.is_some() || !intent.event_reference {
            return Target::Date(intent.date);
        }

        let from_calendar = turn.outputs_of(ToolName::Calendar).find_map(|output| match output {
            ToolOutput::Events { events } => events.first().map(|e| e.date),
            _ => None,
        });
        if let Some(date) = from_calendar {
            return Target::Date(Some(date));
        }

        let calendar_pending = intent.calendar
            && !turn.answered(ToolName::Calendar)
            && turn.attempts(ToolName::Calendar) < self.policy.max_attempts_per_tool;
        if calendar_pending {
            return Target::Pending;
        }

        let from_course = turn.outputs_of(ToolName::CourseSearch).find_map(|output| match output {
            ToolOutput::Chunks { chunks } => chunks.iter().find_map(|c| {
                self.iso_date
                    .find(&c.text)
                    .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
            }),
            _ => None,
        });
        match from_course {
            Some(date) => Target::Date(Some(date)),
            None => Target::Unresolved,
        }
    }

    fn weather_input(&self, turn: &Turn, intent: &QueryIntent, date: Option<NaiveDate>) -> WeatherInput {
        // Once the weather service rejects a location, the rest of the turn uses the default.
        let rejected = turn
            .errors_of(ToolName::Weather)
            .any(|e| matches!(e, ToolError::InvalidInput(_)));
        let location = match &intent.location {
            Some(location) if !rejected => location.clone(),
            _ => self.policy.default_location.clone(),
        };
        WeatherInput { location, date }
    }

    fn holiday_input(&self, turn: &Turn, intent: &QueryIntent, date: Option<NaiveDate>) -> HolidayInput {
        let today = turn.issued_on();
        let (range, limit) = match (date, intent.year) {
            (Some(date), _) => (DateRange::single(date), None),
            (None, Some(year)) => (DateRange::year(year).unwrap_or_else(|| DateRange::single(today)), None),
            (None, None) if intent.wants_next => (DateRange::new(today, today + Duration::days(365)), Some(1)),
            (None, None) => (DateRange::year(chrono::Datelike::year(&today)).unwrap_or_else(|| DateRange::single(today)), None),
        };
        HolidayInput {
            range,
            locale: self.policy.default_locale.clone(),
            limit,
        }
    }

    fn calendar_input(&self, turn: &Turn, intent: &QueryIntent) -> CalendarInput {
        let today = turn.issued_on();
        let year_ahead = DateRange::new(today, today + Duration::days(365));
        let (range, limit) = if let Some(date) = intent.date {
            (DateRange::single(date), None)
        } else if intent.event_reference || (intent.wants_next && intent.event_kind.is_some()) {
            (year_ahead, Some(1))
        } else if intent.event_kind.is_some() {
            (year_ahead, None)
        } else {
            (DateRange::new(today, today + Duration::days(self.policy.upcoming_days)), None)
        };

        CalendarInput {
            range,
            kind: intent.event_kind,
            query: None,
            limit,
        }
    }
}

enum Target {
    /// `None` asks for current conditions (weather) or the default range (holiday).
    Date(Option<NaiveDate>),
    Pending,
    Unresolved,
}

impl Router for RuleRouter {
    fn decide(&self, state: &ConversationState) -> RouterDecision {
        let Some(turn) = state.current() else {
            return RouterDecision::Fail {
                reason: "there is no question to answer".to_string(),
                evidence: Vec::new(),
            };
        };

        let consecutive = turn.consecutive_failures();
        if consecutive >= self.policy.max_consecutive_failures {
            return RouterDecision::Fail {
                reason: format!("{} tool calls failed in a row", consecutive),
                evidence: turn.evidence_refs(),
            };
        }

        if let Some(ToolError::IndexUnavailable(msg)) = turn.last_error(ToolName::CourseSearch) {
            return RouterDecision::Fail {
                reason: format!("the course index is unavailable ({})", msg),
                evidence: turn.evidence_refs(),
            };
        }

        match self.eligible(state).into_iter().next() {
            Some(input) => RouterDecision::Invoke(input),
            None => RouterDecision::Respond {
                evidence: turn.evidence_refs(),
            },
        }
    }

    fn eligible(&self, state: &ConversationState) -> Vec<ToolInput> {
        let Some(turn) = state.current() else {
            return Vec::new();
        };
        self.plans(turn)
            .into_iter()
            .filter_map(|plan| match plan {
                Plan::Ready(input) => Some(input),
                Plan::Blocked | Plan::Done => None,
            })
            .collect()
    }
}
