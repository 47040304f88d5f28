//! Orchestration graph for CourseMate.
//!
//! A turn starts in `routing`. Each step asks the router for a decision,
//! runs the chosen tool (`invoking`, then back to `routing`), and ends when
//! the router decides to respond or fail. The conversation state is passed
//! into every step and handed back out.

mod intent;
mod router;
mod state;

pub use intent::{IntentAnalyzer, QueryIntent};
pub use router::{Router, RouterDecision, RoutingPolicy, RuleRouter};
pub use state::{ConversationState, ToolInvocation, Turn, TurnPhase};

use crate::config::{PolicySettings, Prompts, Settings};
use crate::embedding::OpenAIEmbedder;
use crate::error::{CourseMateError, Result};
use crate::evidence::EvidenceRef;
use crate::generation::OpenAIGenerator;
use crate::rag::{Answer, Retriever, Synthesizer};
use crate::tools::{
    CalendarStore, CourseSearchTool, Hebcal, OpenMeteo, ToolInput, ToolKit, ToolName,
};
use crate::vector_store::SqliteVectorStore;
use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Result of a single graph step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// This many tool calls were recorded; the turn is back in `routing`.
    Invoked(usize),
    Responded,
    Failed,
}

impl StepOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepOutcome::Invoked(_))
    }
}

/// Drives turns through the routing graph.
pub struct Orchestrator {
    toolkit: ToolKit,
    router: Arc<dyn Router>,
    synthesizer: Synthesizer,
    policy: PolicySettings,
}

impl Orchestrator {
    /// Build every component from settings.
    ///
    /// Fails with `IndexUnavailable` when the course index cannot be opened.
    pub fn new(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let policy = settings.policy.clone();

        let embedder = Arc::new(
            OpenAIEmbedder::from_settings(&settings.embedding)?.with_retries(policy.model_retries),
        );
        let vector_store = Arc::new(SqliteVectorStore::open_read_only(&settings.sqlite_path())?);
        let retriever = Retriever::new(vector_store, embedder).with_min_score(settings.retrieval.min_score);

        let weather = OpenMeteo::from_settings(&settings.weather, policy.tool_timeout())?
            .with_forecast_days(policy.forecast_horizon_days + 1);
        let holidays = Hebcal::from_settings(&settings.holiday, policy.tool_timeout())?;
        let calendar = CalendarStore::open(&settings.calendar_path())?;

        let toolkit = ToolKit::new(
            CourseSearchTool::new(Arc::new(retriever)),
            Arc::new(weather),
            Arc::new(holidays),
            Arc::new(calendar),
        )
        .with_timeout(policy.tool_timeout())
        .with_forecast_horizon(policy.forecast_horizon_days);

        let mut synthesizer = Synthesizer::new(prompts);
        if settings.generation.enabled {
            info!("Course explanations by {}", settings.generation.model);
            let generator = OpenAIGenerator::from_settings(&settings.generation)?
                .with_retries(policy.model_retries);
            synthesizer = synthesizer.with_generator(Arc::new(generator));
        }

        let router = Arc::new(RuleRouter::new(RoutingPolicy::from_settings(settings)));

        Ok(Self::with_components(toolkit, router, synthesizer, policy))
    }

    /// Assemble an orchestrator from existing components.
    pub fn with_components(
        toolkit: ToolKit,
        router: Arc<dyn Router>,
        synthesizer: Synthesizer,
        policy: PolicySettings,
    ) -> Self {
        Self {
            toolkit,
            router,
            synthesizer,
            policy,
        }
    }

    pub fn toolkit(&self) -> &ToolKit {
        &self.toolkit
    }

    /// Steps allowed per turn before a response is forced.
    pub fn step_budget(&self) -> usize {
        ToolName::ALL.len() * self.policy.max_attempts_per_tool + 1
    }

    /// Answer one query, appending a finished turn to `state`.
    #[instrument(skip(self, state), fields(query = %query))]
    pub async fn run_turn(
        &self,
        mut state: ConversationState,
        query: &str,
        today: NaiveDate,
    ) -> Result<(ConversationState, Answer)> {
        state.begin_turn(query, today)?;
        let deadline = Instant::now() + self.policy.turn_deadline();

        loop {
            let (next, outcome) = self.step(state, deadline).await?;
            state = next;
            debug!(?outcome, "Step finished");
            if outcome.is_terminal() {
                break;
            }
        }

        let turn = current(&state)?;
        let answer = turn
            .answer()
            .cloned()
            .ok_or_else(|| CourseMateError::Conversation("turn ended without an answer".to_string()))?;
        info!(
            "Turn finished in {:?} after {} step(s) and {} tool call(s)",
            turn.phase(),
            turn.steps(),
            turn.invocations().len()
        );
        Ok((state, answer))
    }

    /// Advance the current turn by one routing decision.
    pub async fn step(
        &self,
        mut state: ConversationState,
        deadline: Instant,
    ) -> Result<(ConversationState, StepOutcome)> {
        let budget = self.step_budget();
        let turn = current_mut(&mut state)?;
        turn.begin_step()?;

        if turn.steps() > budget {
            warn!("Step budget of {} exhausted; responding with what we have", budget);
            self.respond(turn, None).await?;
            return Ok((state, StepOutcome::Responded));
        }
        if Instant::now() >= deadline {
            warn!("Turn deadline passed; responding with what we have");
            turn.mark_deadline_exceeded();
            self.respond(turn, None).await?;
            return Ok((state, StepOutcome::Responded));
        }

        let decision = self.router.decide(&state);
        debug!(?decision, "Router decision");

        match decision {
            RouterDecision::Invoke(first) => {
                let batch = self.batch(&state, first);
                let turn = current_mut(&mut state)?;
                let today = turn.issued_on();
                turn.set_phase(TurnPhase::Invoking)?;

                let calls = join_all(batch.iter().map(|input| self.invoke(input, today)));
                match tokio::time::timeout_at(deadline, calls).await {
                    Ok(invocations) => {
                        let count = invocations.len();
                        for invocation in invocations {
                            turn.record(invocation)?;
                        }
                        turn.set_phase(TurnPhase::Routing)?;
                        Ok((state, StepOutcome::Invoked(count)))
                    }
                    Err(_) => {
                        warn!("Turn deadline passed; abandoning {} in-flight call(s)", batch.len());
                        turn.mark_deadline_exceeded();
                        self.respond(turn, None).await?;
                        Ok((state, StepOutcome::Responded))
                    }
                }
            }
            RouterDecision::Respond { evidence } => {
                let turn = current_mut(&mut state)?;
                self.respond(turn, Some(&evidence)).await?;
                Ok((state, StepOutcome::Responded))
            }
            RouterDecision::Fail { reason, evidence } => {
                let turn = current_mut(&mut state)?;
                warn!("Turn failed: {}", reason);
                let answer = self.synthesizer.apologize(&reason, &turn.resolve(&evidence));
                turn.finish(answer, TurnPhase::Failed)?;
                Ok((state, StepOutcome::Failed))
            }
        }
    }

    /// Calls to issue this step: just the decided one, or every eligible
    /// call when concurrency is enabled.
    fn batch(&self, state: &ConversationState, first: ToolInput) -> Vec<ToolInput> {
        if !self.policy.concurrent_tools {
            return vec![first];
        }
        let eligible = self.router.eligible(state);
        if eligible.first() == Some(&first) {
            eligible
        } else {
            vec![first]
        }
    }

    async fn invoke(&self, input: &ToolInput, today: NaiveDate) -> ToolInvocation {
        let started_at = Utc::now();
        let outcome = self.toolkit.invoke(input, today).await;
        ToolInvocation {
            input: input.clone(),
            outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Synthesize the answer and close the turn. `None` uses all evidence.
    async fn respond(&self, turn: &mut Turn, refs: Option<&[EvidenceRef]>) -> Result<()> {
        let evidence = match refs {
            Some(refs) => turn.resolve(refs),
            None => turn.evidence(),
        };
        let answer = self
            .synthesizer
            .synthesize(turn.query(), &evidence, turn.issued_on())
            .await;
        turn.finish(answer, TurnPhase::Responding)
    }
}

fn current(state: &ConversationState) -> Result<&Turn> {
    state
        .current()
        .ok_or_else(|| CourseMateError::Conversation("no turn in progress".to_string()))
}

fn current_mut(state: &mut ConversationState) -> Result<&mut Turn> {
    state
        .current_mut()
        .ok_or_else(|| CourseMateError::Conversation("no turn in progress".to_string()))
}

/// A conversation bound to an orchestrator, as used by `chat` and `serve`.
pub struct Session {
    orchestrator: Arc<Orchestrator>,
    state: ConversationState,
}

impl Session {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            state: ConversationState::new(),
        }
    }

    pub async fn ask(&mut self, query: &str, today: NaiveDate) -> Result<Answer> {
        if query.trim().is_empty() {
            return Err(CourseMateError::InvalidInput("query is empty".to_string()));
        }
        // The stored conversation only changes once the turn completes, so a
        // dropped or failed turn leaves earlier turns intact.
        let (state, answer) = self
            .orchestrator
            .run_turn(self.state.clone(), query, today)
            .await?;
        self.state = state;
        Ok(answer)
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Forget all previous turns.
    pub fn clear(&mut self) {
        self.state.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::tools::testing::{date, FixedCalendar, FixedHolidays, ScriptedWeather};
    use crate::vector_store::MemoryVectorStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct ZeroEmbedder;

    #[async_trait]
    impl Embedder for ZeroEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 4])
        }

        fn model(&self) -> &str {
            "zero"
        }
    }

    fn orchestrator(policy: PolicySettings) -> Orchestrator {
        let retriever = Retriever::new(Arc::new(MemoryVectorStore::new()), Arc::new(ZeroEmbedder));
        let toolkit = ToolKit::new(
            CourseSearchTool::new(Arc::new(retriever)),
            Arc::new(ScriptedWeather::hanging(Duration::from_secs(1))),
            Arc::new(FixedHolidays::new(Vec::new())),
            Arc::new(FixedCalendar(Vec::new())),
        );
        Orchestrator::with_components(
            toolkit,
            Arc::new(RuleRouter::new(RoutingPolicy::default())),
            Synthesizer::new(Prompts::default()),
            policy,
        )
    }

    #[test]
    fn test_step_budget_covers_every_attempt() {
        let orchestrator = orchestrator(PolicySettings::default());
        assert_eq!(orchestrator.step_budget(), 13);
    }

    #[tokio::test]
    async fn test_step_without_turn_is_an_error() {
        let orchestrator = orchestrator(PolicySettings::default());
        let result = orchestrator
            .step(ConversationState::new(), Instant::now() + Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(CourseMateError::Conversation(_))));
    }

    #[tokio::test]
    async fn test_passed_deadline_responds_without_routing() {
        let orchestrator = orchestrator(PolicySettings::default());
        let mut state = ConversationState::new();
        state.begin_turn("What is TF-IDF?", date("2026-02-01")).unwrap();

        let (state, outcome) = orchestrator.step(state, Instant::now()).await.unwrap();

        assert_eq!(outcome, StepOutcome::Responded);
        let turn = state.current().unwrap();
        assert!(turn.deadline_exceeded());
        assert!(turn.invocations().is_empty());
        assert_eq!(turn.phase(), TurnPhase::Responding);
    }

    #[tokio::test]
    async fn test_finished_turn_allows_next_query() {
        let orchestrator = orchestrator(PolicySettings::default());
        let (state, _) = orchestrator
            .run_turn(ConversationState::new(), "What is TF-IDF?", date("2026-02-01"))
            .await
            .unwrap();
        let (state, _) = orchestrator
            .run_turn(state, "And BM25?", date("2026-02-01"))
            .await
            .unwrap();
        assert_eq!(state.turns().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_ask_keeps_earlier_turns() {
        let mut session = Session::new(Arc::new(orchestrator(PolicySettings::default())));
        session.ask("What is TF-IDF?", date("2026-02-01")).await.unwrap();
        assert_eq!(session.state().turns().len(), 1);

        // The weather provider hangs, so the second turn is dropped mid-call.
        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            session.ask("What's the weather in Haifa?", date("2026-02-01")),
        )
        .await;
        assert!(cancelled.is_err());

        assert_eq!(session.state().turns().len(), 1);
        assert_eq!(session.state().turns()[0].query(), "What is TF-IDF?");

        session.ask("And BM25?", date("2026-02-01")).await.unwrap();
        assert_eq!(session.state().turns().len(), 2);
    }
}
