//! Conversation state threaded through the orchestration graph.

use crate::error::{CourseMateError, Result, ToolError};
use crate::evidence::{Evidence, EvidenceItem, EvidenceRef};
use crate::rag::Answer;
use crate::tools::{ToolInput, ToolName, ToolOutput};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Where a turn is in the routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Routing,
    Invoking,
    Responding,
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnPhase::Responding | TurnPhase::Failed)
    }

    /// Allowed edges. `Invoking -> Responding` is taken when the turn deadline
    /// expires during a call.
    pub fn can_transition_to(&self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        matches!(
            (self, next),
            (Routing, Invoking)
                | (Routing, Responding)
                | (Routing, Failed)
                | (Invoking, Routing)
                | (Invoking, Responding)
        )
    }
}

/// One recorded tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub input: ToolInput,
    pub outcome: std::result::Result<ToolOutput, ToolError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ToolInvocation {
    pub fn tool(&self) -> ToolName {
        self.input.tool()
    }

    pub fn failed(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn output(&self) -> Option<&ToolOutput> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ToolError> {
        self.outcome.as_ref().err()
    }
}

/// A query and everything done to answer it.
#[derive(Debug, Clone)]
pub struct Turn {
    query: String,
    issued_on: NaiveDate,
    invocations: Vec<ToolInvocation>,
    phase: TurnPhase,
    answer: Option<Answer>,
    steps: usize,
    deadline_exceeded: bool,
}

impl Turn {
    pub fn new(query: impl Into<String>, issued_on: NaiveDate) -> Self {
        Self {
            query: query.into(),
            issued_on,
            invocations: Vec::new(),
            phase: TurnPhase::Routing,
            answer: None,
            steps: 0,
            deadline_exceeded: false,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// The date relative expressions in the query resolve against.
    pub fn issued_on(&self) -> NaiveDate {
        self.issued_on
    }

    pub fn invocations(&self) -> &[ToolInvocation] {
        &self.invocations
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn answer(&self) -> Option<&Answer> {
        self.answer.as_ref()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline_exceeded
    }

    fn ensure_open(&self) -> Result<()> {
        if self.phase.is_terminal() {
            return Err(CourseMateError::Conversation(format!(
                "turn \"{}\" is already finished",
                self.query
            )));
        }
        Ok(())
    }

    pub(crate) fn begin_step(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.steps += 1;
        Ok(())
    }

    pub(crate) fn set_phase(&mut self, next: TurnPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(CourseMateError::Conversation(format!(
                "invalid phase change {:?} -> {:?}",
                self.phase, next
            )));
        }
        self.phase = next;
        Ok(())
    }

    pub(crate) fn record(&mut self, invocation: ToolInvocation) -> Result<()> {
        self.ensure_open()?;
        self.invocations.push(invocation);
        Ok(())
    }

    pub(crate) fn mark_deadline_exceeded(&mut self) {
        self.deadline_exceeded = true;
    }

    /// Store the answer and move to a terminal phase. The turn is frozen afterwards.
    pub(crate) fn finish(&mut self, answer: Answer, phase: TurnPhase) -> Result<()> {
        self.set_phase(phase)?;
        self.answer = Some(answer);
        Ok(())
    }

    pub fn attempts(&self, tool: ToolName) -> usize {
        self.invocations.iter().filter(|i| i.tool() == tool).count()
    }

    /// Errors returned by `tool`, in call order.
    pub fn errors_of(&self, tool: ToolName) -> impl Iterator<Item = &ToolError> {
        self.invocations
            .iter()
            .filter(move |i| i.tool() == tool)
            .filter_map(|i| i.error())
    }

    /// Failed invocations at the end of the turn, uninterrupted by a success.
    pub fn consecutive_failures(&self) -> usize {
        self.invocations
            .iter()
            .rev()
            .take_while(|i| i.failed())
            .count()
    }

    /// Outputs produced by `tool`, in call order.
    pub fn outputs_of(&self, tool: ToolName) -> impl Iterator<Item = &ToolOutput> {
        self.invocations
            .iter()
            .filter(move |i| i.tool() == tool)
            .filter_map(|i| i.output())
    }

    /// True when `tool` has produced an output (found or not) this turn.
    pub fn answered(&self, tool: ToolName) -> bool {
        self.outputs_of(tool).next().is_some()
    }

    /// True when this exact input already produced an output.
    pub fn has_output_for(&self, input: &ToolInput) -> bool {
        self.invocations
            .iter()
            .any(|i| &i.input == input && i.output().is_some())
    }

    /// Last error of `tool`, if its most recent call failed.
    pub fn last_error(&self, tool: ToolName) -> Option<&ToolError> {
        self.invocations
            .iter()
            .rev()
            .find(|i| i.tool() == tool)
            .and_then(|i| i.error())
    }

    /// Every successful output, course chunks split into their own entries.
    pub fn evidence(&self) -> Vec<Evidence> {
        let mut evidence = Vec::new();
        for (idx, invocation) in self.invocations.iter().enumerate() {
            let Some(output) = invocation.output() else {
                continue;
            };
            match output {
                ToolOutput::Chunks { chunks } => {
                    evidence.extend(chunks.iter().enumerate().map(|(j, chunk)| Evidence {
                        reference: EvidenceRef::chunk(idx, j),
                        item: EvidenceItem::Chunk {
                            chunk: chunk.clone(),
                        },
                    }));
                }
                other => evidence.push(Evidence {
                    reference: EvidenceRef::invocation(idx),
                    item: EvidenceItem::Tool {
                        tool: invocation.tool(),
                        output: other.clone(),
                    },
                }),
            }
        }
        evidence
    }

    pub fn evidence_refs(&self) -> Vec<EvidenceRef> {
        self.evidence().into_iter().map(|e| e.reference).collect()
    }

    /// Resolve references against this turn. Unknown references are dropped.
    pub fn resolve(&self, refs: &[EvidenceRef]) -> Vec<Evidence> {
        self.evidence()
            .into_iter()
            .filter(|e| refs.contains(&e.reference))
            .collect()
    }
}

/// All turns of one session.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new turn. The previous turn must be finished.
    pub fn begin_turn(&mut self, query: impl Into<String>, issued_on: NaiveDate) -> Result<()> {
        if self.turns.last().is_some_and(|t| !t.phase.is_terminal()) {
            return Err(CourseMateError::Conversation(
                "previous turn is still in progress".to_string(),
            ));
        }
        let query = query.into();
        if query.trim().is_empty() {
            return Err(CourseMateError::InvalidInput("query is empty".to_string()));
        }
        self.turns.push(Turn::new(query, issued_on));
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn current(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut Turn> {
        self.turns.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::{AnswerKind, RetrievedChunk};
    use crate::tools::{CourseSearchInput, WeatherInput};
    use std::time::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()
    }

    fn invocation(input: ToolInput, outcome: std::result::Result<ToolOutput, ToolError>) -> ToolInvocation {
        let now = Utc::now();
        ToolInvocation {
            input,
            outcome,
            started_at: now,
            finished_at: now,
        }
    }

    fn answer() -> Answer {
        Answer {
            text: "done".into(),
            kind: AnswerKind::Grounded,
            citations: vec![],
            caveats: vec![],
        }
    }

    #[test]
    fn test_phase_edges() {
        assert!(TurnPhase::Routing.can_transition_to(TurnPhase::Invoking));
        assert!(TurnPhase::Invoking.can_transition_to(TurnPhase::Routing));
        assert!(!TurnPhase::Invoking.can_transition_to(TurnPhase::Failed));
        assert!(!TurnPhase::Responding.can_transition_to(TurnPhase::Routing));
        assert!(!TurnPhase::Failed.can_transition_to(TurnPhase::Invoking));
    }

    #[test]
    fn test_finished_turn_is_frozen() {
        let mut turn = Turn::new("What is BM25?", today());
        turn.finish(answer(), TurnPhase::Responding).unwrap();

        let weather = ToolInput::Weather(WeatherInput::current("Haifa"));
        assert!(turn.record(invocation(weather, Err(ToolError::Timeout(Duration::from_secs(1))))).is_err());
        assert!(turn.begin_step().is_err());
    }

    #[test]
    fn test_next_turn_requires_finished_previous() {
        let mut state = ConversationState::new();
        state.begin_turn("first", today()).unwrap();
        assert!(state.begin_turn("second", today()).is_err());

        state
            .current_mut()
            .unwrap()
            .finish(answer(), TurnPhase::Responding)
            .unwrap();
        state.begin_turn("second", today()).unwrap();
        assert_eq!(state.turns().len(), 2);
    }

    #[test]
    fn test_consecutive_failures_reset_by_success() {
        let mut turn = Turn::new("weather", today());
        let input = ToolInput::Weather(WeatherInput::current("Haifa"));
        let timeout = || Err(ToolError::Timeout(Duration::from_secs(15)));

        turn.record(invocation(input.clone(), timeout())).unwrap();
        turn.record(invocation(input.clone(), Ok(ToolOutput::not_found("x")))).unwrap();
        turn.record(invocation(input.clone(), timeout())).unwrap();
        turn.record(invocation(input.clone(), timeout())).unwrap();

        assert_eq!(turn.consecutive_failures(), 2);
        assert_eq!(turn.errors_of(ToolName::Weather).count(), 3);
        assert_eq!(turn.attempts(ToolName::Weather), 4);
        assert!(turn.has_output_for(&input));
    }

    #[test]
    fn test_evidence_splits_chunks() {
        let mut turn = Turn::new("What is TF-IDF?", today());
        let chunk = |offset| RetrievedChunk {
            text: "tf-idf".into(),
            source: "lecture03.pdf".into(),
            score: 0.8,
            chunk_offset: offset,
        };
        turn.record(invocation(
            ToolInput::CourseSearch(CourseSearchInput::new("tf-idf")),
            Ok(ToolOutput::Chunks {
                chunks: vec![chunk(0), chunk(500)],
            }),
        ))
        .unwrap();
        turn.record(invocation(
            ToolInput::Weather(WeatherInput::current("Haifa")),
            Err(ToolError::Transport("down".into())),
        ))
        .unwrap();

        let refs = turn.evidence_refs();
        assert_eq!(refs, vec![EvidenceRef::chunk(0, 0), EvidenceRef::chunk(0, 1)]);

        let resolved = turn.resolve(&[EvidenceRef::chunk(0, 1), EvidenceRef::invocation(1)]);
        assert_eq!(resolved.len(), 1);
    }
}
