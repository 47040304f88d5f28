//! Answer synthesis from gathered evidence.

use super::context::{excerpt, format_context_for_prompt};
use super::RetrievedChunk;
use crate::config::Prompts;
use crate::evidence::{Evidence, EvidenceItem, EvidenceRef};
use crate::generation::Generator;
use crate::tools::{ToolName, ToolOutput};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Marker that opens every answer produced without usable evidence.
pub const INSUFFICIENT_INFORMATION: &str = "[insufficient information]";

const FALLBACK_EXCERPT_CHARS: usize = 400;
const EVIDENCE_EXCERPT_CHARS: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Built from at least one successful tool result.
    Grounded,
    /// No usable evidence; the text starts with [`INSUFFICIENT_INFORMATION`].
    InsufficientInformation,
    /// The turn failed; partial evidence may follow the apology.
    Apology,
}

/// Final answer of a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub kind: AnswerKind,
    pub citations: Vec<EvidenceRef>,
    /// Things that were looked up but not found.
    pub caveats: Vec<String>,
}

impl Answer {
    pub fn grounded(&self) -> bool {
        self.kind == AnswerKind::Grounded
    }
}

/// Turns evidence into a sectioned, cited answer.
pub struct Synthesizer {
    generator: Option<Arc<dyn Generator>>,
    prompts: Prompts,
}

impl Synthesizer {
    /// A synthesizer that explains course material with excerpts only.
    pub fn new(prompts: Prompts) -> Self {
        Self {
            generator: None,
            prompts,
        }
    }

    /// Use a model to write the course explanation.
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[instrument(skip(self, evidence), fields(evidence = evidence.len()))]
    pub async fn synthesize(&self, query: &str, evidence: &[Evidence], today: NaiveDate) -> Answer {
        let sections = Sections::collect(evidence);

        if sections.is_empty() {
            info!("No usable evidence; answering with insufficient information");
            let mut text = format!(
                "{}\nI don't have enough information to answer that.",
                INSUFFICIENT_INFORMATION
            );
            if !sections.caveats.is_empty() {
                text.push_str("\n\n");
                text.push_str(&render_caveats(&sections.caveats));
            }
            return Answer {
                text,
                kind: AnswerKind::InsufficientInformation,
                citations: sections.citations(),
                caveats: sections.caveat_texts(),
            };
        }

        let explanation = if sections.chunks.is_empty() {
            None
        } else {
            Some(self.explain(query, &sections.chunks, today).await)
        };

        Answer {
            text: sections.render(explanation.as_deref()),
            kind: AnswerKind::Grounded,
            citations: sections.citations(),
            caveats: sections.caveat_texts(),
        }
    }

    /// Apologize for a failed turn, keeping whatever was found.
    pub fn apologize(&self, reason: &str, evidence: &[Evidence]) -> Answer {
        let sections = Sections::collect(evidence);
        let mut text = format!("Sorry, I couldn't complete your request: {}.", reason);
        if !sections.is_empty() || !sections.caveats.is_empty() {
            text.push_str("\n\nHere is what I found before stopping:\n\n");
            text.push_str(&sections.render(None));
        }

        Answer {
            text,
            kind: AnswerKind::Apology,
            citations: sections.citations(),
            caveats: sections.caveat_texts(),
        }
    }

    /// Course explanation for the chunks, from the generator when it works.
    async fn explain(&self, query: &str, chunks: &[(EvidenceRef, RetrievedChunk)], today: NaiveDate) -> String {
        let fallback = || {
            let (reference, top) = &chunks[0];
            format!(
                "From the course materials [{}]: {}",
                reference,
                excerpt(&top.text, FALLBACK_EXCERPT_CHARS)
            )
        };

        let Some(generator) = &self.generator else {
            return fallback();
        };

        let context: Vec<RetrievedChunk> = chunks.iter().map(|(_, c)| c.clone()).collect();
        let mut vars = HashMap::new();
        vars.insert("today".to_string(), today.to_string());
        vars.insert("question".to_string(), query.to_string());
        vars.insert("context".to_string(), format_context_for_prompt(&context));

        let system = self.prompts.render_with_custom(&self.prompts.explanation.system, &vars);
        let user = self.prompts.render_with_custom(&self.prompts.explanation.user, &vars);

        match generator.generate(&system, &user).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!("Generated course explanation");
                text.trim().to_string()
            }
            Ok(_) => {
                warn!("Generator returned an empty explanation");
                fallback()
            }
            Err(e) => {
                warn!("Course explanation failed, using excerpt: {}", e);
                fallback()
            }
        }
    }
}

/// Evidence grouped by the answer section it belongs to.
#[derive(Default)]
struct Sections {
    weather: Vec<(EvidenceRef, String)>,
    schedule: Vec<(EvidenceRef, String)>,
    holidays: Vec<(EvidenceRef, String)>,
    chunks: Vec<(EvidenceRef, RetrievedChunk)>,
    caveats: Vec<(EvidenceRef, String)>,
}

impl Sections {
    fn collect(evidence: &[Evidence]) -> Self {
        let mut sections = Sections::default();
        for e in evidence {
            match &e.item {
                EvidenceItem::Chunk { chunk } => sections.chunks.push((e.reference, chunk.clone())),
                EvidenceItem::Tool { output, .. } if output.is_absence() => {
                    sections.caveats.push((e.reference, output.render()))
                }
                // Chunk outputs arrive as individual chunk evidence.
                EvidenceItem::Tool {
                    output: ToolOutput::Chunks { .. },
                    ..
                } => {}
                EvidenceItem::Tool { tool, output } => {
                    let entry = (e.reference, output.render());
                    match tool {
                        ToolName::Weather => sections.weather.push(entry),
                        ToolName::Calendar => sections.schedule.push(entry),
                        ToolName::Holiday => sections.holidays.push(entry),
                        ToolName::CourseSearch => {}
                    }
                }
            }
        }
        sections
    }

    /// True when nothing but absences was gathered.
    fn is_empty(&self) -> bool {
        self.weather.is_empty() && self.schedule.is_empty() && self.holidays.is_empty() && self.chunks.is_empty()
    }

    fn citations(&self) -> Vec<EvidenceRef> {
        let mut refs: Vec<EvidenceRef> = self
            .weather
            .iter()
            .chain(&self.schedule)
            .chain(&self.holidays)
            .chain(&self.caveats)
            .map(|(r, _)| *r)
            .chain(self.chunks.iter().map(|(r, _)| *r))
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }

    fn caveat_texts(&self) -> Vec<String> {
        self.caveats.iter().map(|(_, text)| text.clone()).collect()
    }

    fn render(&self, explanation: Option<&str>) -> String {
        let mut parts = Vec::new();

        let cited = |entries: &[(EvidenceRef, String)]| {
            entries
                .iter()
                .map(|(r, text)| format!("{} [{}]", text, r))
                .collect::<Vec<_>>()
                .join("\n")
        };

        if !self.weather.is_empty() {
            parts.push(format!("**Weather**\n{}", cited(&self.weather)));
        }
        if !self.schedule.is_empty() {
            parts.push(format!("**Schedule / Exams**\n{}", cited(&self.schedule)));
        }
        if !self.holidays.is_empty() {
            parts.push(format!("**Holidays**\n{}", cited(&self.holidays)));
        }
        if let Some(explanation) = explanation {
            parts.push(format!("**Course explanation**\n{}", explanation));
        }
        if !self.chunks.is_empty() {
            let listed = self
                .chunks
                .iter()
                .map(|(r, c)| {
                    format!(
                        "[{}] {} @ {} (score {:.2}): {}",
                        r,
                        c.source,
                        c.chunk_offset,
                        c.score,
                        excerpt(&c.text, EVIDENCE_EXCERPT_CHARS)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("**Evidence (retrieved chunks)**\n{}", listed));
        }
        if !self.caveats.is_empty() {
            parts.push(render_caveats(&self.caveats));
        }

        parts.join("\n\n")
    }
}

fn render_caveats(caveats: &[(EvidenceRef, String)]) -> String {
    let lines = caveats
        .iter()
        .map(|(r, text)| format!("- {} [{}]", text, r))
        .collect::<Vec<_>>()
        .join("\n");
    format!("**Not available**\n{}", lines)
}
