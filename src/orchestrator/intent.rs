//! Keyword and date extraction from user queries.

use crate::tools::EventKind;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;

/// What a query asks for, as far as routing is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryIntent {
    /// Needs the course materials.
    pub course: bool,
    pub weather: bool,
    pub holiday: bool,
    /// Needs the student's calendar.
    pub calendar: bool,
    pub event_kind: Option<EventKind>,
    /// Refers to the day of a calendar event ("on my exam day").
    pub event_reference: bool,
    /// Asks for the next occurrence of something.
    pub wants_next: bool,
    /// Explicit or relative date.
    pub date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub location: Option<String>,
}

const WEATHER_WORDS: &[&str] = &[
    "weather", "forecast", "rain", "raining", "rainy", "umbrella", "temperature", "sunny",
    "snow", "wind", "windy", "degrees", "humid", "jacket", "storm",
];

/// Weather words that stay weather words inside a course question.
const WEATHER_CUES: &[&str] = &[
    "weather", "forecast", "rain", "raining", "rainy", "umbrella",
];

const HOLIDAY_WORDS: &[&str] = &[
    "holiday", "holidays", "passover", "pesach", "hanukkah", "chanukah", "purim", "sukkot",
    "shavuot", "rosh hashana", "yom kippur", "day off",
];

const SCHEDULE_WORDS: &[&str] = &[
    "when", "schedule", "calendar", "upcoming", "next", "due", "agenda", "this week", "my exam",
    "my exams", "my deadline", "my class", "my lecture", "my meeting",
];

const CALENDAR_WORDS: &[&str] = &["calendar", "schedule", "agenda"];

const MONTHS_AND_DAYS: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday",
    "Saturday", "Sunday", "I",
];

/// Compiled patterns for [`QueryIntent`] extraction.
pub struct IntentAnalyzer {
    course_terms: Regex,
    event_kind: Regex,
    event_reference: Regex,
    iso_date: Regex,
    year: Regex,
    weekday: Regex,
    location: Regex,
    next: Regex,
}

impl Default for IntentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentAnalyzer {
    pub fn new() -> Self {
        let course_terms = Regex::new(
            r"(?ix)\b(?:
                tf-?idf | idf | bm25 | page-?rank | hits | vector\s+space | cosine
                | inverted\s+index | posting\s+lists? | precision | recall | f1 | ndcg | mrr
                | mean\s+average\s+precision | ranking | retrieval | query\s+expansion
                | relevance\s+feedback | rocchio | stemming | lemmati[sz]ation | tokeni[sz]ation
                | stop\s*words? | embeddings? | rag | language\s+models? | boolean\s+model
                | probabilistic\s+model | lsi | lsa | word2vec | bert | transformers?
                | clustering | k-?means | crawl(?:er|ing) | index(?:ing)? | search\s+engines?
                | dense\s+retrieval | re-?ranking | evaluation\s+metrics?
            )\b",
        )
        .expect("Invalid regex");

        let event_kind = Regex::new(
            r"(?i)\b(exams?|tests?|midterms?|finals?|quiz|deadlines?|due|submission|lectures?|class(?:es)?|meetings?|study\s+group)\b",
        )
        .expect("Invalid regex");

        let event_reference = Regex::new(
            r"(?ix)
            \b(?:exam|test|midterm|final|quiz|deadline|lecture|class|meeting)\s+day\b
            | \bthat\s+day\b
            | \bday\s+of\s+(?:my|the)\s+\w+
            | \bon\s+(?:my|the)\s+(?:next\s+)?(?:exam|test|midterm|final|quiz|deadline|lecture|class|meeting)\b
            | \bwhen\s+i\s+have\s+(?:my|an?|the)\s+\w+",
        )
        .expect("Invalid regex");

        let iso_date = Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("Invalid regex");
        let year = Regex::new(r"\b(1\d{3}|2\d{3})\b").expect("Invalid regex");
        let weekday = Regex::new(
            r"(?i)\b(?:(next|this|on)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
        )
        .expect("Invalid regex");
        let location = Regex::new(
            r"\b(?:in|at|for)\s+([A-Z][A-Za-z]+(?:[ -][A-Z][A-Za-z]+)*(?:,\s*[A-Z][A-Za-z]+(?: [A-Z][A-Za-z]+)*)?)",
        )
        .expect("Invalid regex");
        let next = Regex::new(r"(?i)\b(?:next|upcoming|coming)\b").expect("Invalid regex");

        Self {
            course_terms,
            event_kind,
            event_reference,
            iso_date,
            year,
            weekday,
            location,
            next,
        }
    }

    /// Analyze `query` with relative dates anchored at `today`.
    pub fn analyze(&self, query: &str, today: NaiveDate) -> QueryIntent {
        let lower = query.to_lowercase();
        let has_any = |words: &[&str]| words.iter().any(|w| contains_word(&lower, w));

        let course_terms = self.course_terms.is_match(query);
        let date = self.date(query, &lower, today);
        let place = self.location(query);

        // "temperature" or "degrees" next to a course term is course vocabulary.
        let weather = has_any(WEATHER_WORDS)
            && (!course_terms || has_any(WEATHER_CUES) || date.is_some() || place.is_some());
        let holiday = has_any(HOLIDAY_WORDS);
        let event_kind = self.event_kind(query);
        let event_reference = event_kind.is_some() && self.event_reference.is_match(query);
        let wants_next = self.next.is_match(query);

        let calendar = has_any(CALENDAR_WORDS)
            || (event_kind.is_some() && (event_reference || has_any(SCHEDULE_WORDS) || date.is_some()));

        let course = course_terms || !(weather || holiday || calendar);

        let without_dates = self.iso_date.replace_all(query, "");
        let year = self
            .year
            .captures(&without_dates)
            .and_then(|c| c[1].parse().ok());

        let location = if weather { place } else { None };

        QueryIntent {
            course,
            weather,
            holiday,
            calendar,
            event_kind,
            event_reference,
            wants_next,
            date,
            year,
            location,
        }
    }

    fn event_kind(&self, query: &str) -> Option<EventKind> {
        let word = self.event_kind.captures(query)?[1].to_lowercase();
        let kind = match word.as_str() {
            w if w.starts_with("exam")
                || w.starts_with("test")
                || w.starts_with("midterm")
                || w.starts_with("final")
                || w == "quiz" =>
            {
                EventKind::Exam
            }
            w if w.starts_with("deadline") || w == "due" || w == "submission" => EventKind::Deadline,
            w if w.starts_with("lecture") || w.starts_with("class") => EventKind::Class,
            _ => EventKind::Meeting,
        };
        Some(kind)
    }

    fn date(&self, query: &str, lower: &str, today: NaiveDate) -> Option<NaiveDate> {
        if let Some(caps) = self.iso_date.captures(query) {
            if let Ok(date) = NaiveDate::parse_from_str(&caps[0], "%Y-%m-%d") {
                return Some(date);
            }
        }
        if lower.contains("day after tomorrow") {
            return Some(today + Duration::days(2));
        }
        if contains_word(lower, "tomorrow") {
            return Some(today + Duration::days(1));
        }
        if contains_word(lower, "today") || contains_word(lower, "tonight") {
            return Some(today);
        }
        let caps = self.weekday.captures(query)?;
        let weekday: Weekday = caps[2].parse().ok()?;
        let strictly_after = caps
            .get(1)
            .is_some_and(|m| m.as_str().eq_ignore_ascii_case("next"));
        Some(next_weekday(today, weekday, strictly_after))
    }

    fn location(&self, query: &str) -> Option<String> {
        self.location
            .captures_iter(query)
            .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
            .find(|candidate| {
                let first = candidate.split([' ', ',']).next().unwrap_or_default();
                !MONTHS_AND_DAYS.contains(&first) && !self.course_terms.is_match(candidate)
            })
    }
}

/// Whole-word (or whole-phrase) containment on lowercase text.
fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(start, _)| {
        let end = start + word.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

/// The next `weekday` on or after `today` (strictly after when `strictly_after`).
fn next_weekday(today: NaiveDate, weekday: Weekday, strictly_after: bool) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut delta = (target - current).rem_euclid(7);
    if delta == 0 && strictly_after {
        delta = 7;
    }
    today + Duration::days(delta)
}
