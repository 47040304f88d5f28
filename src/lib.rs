//! CourseMate - an agentic course assistant
//!
//! Answers student questions about an Information Retrieval course by
//! combining retrieval over indexed course material with a few live tools.
//!
//! # Overview
//!
//! For every question a router decides which tools to call, one step at a
//! time, until it has enough evidence to answer:
//! - `course_search` retrieves chunks from the course index
//! - `weather` looks up current conditions or a daily forecast
//! - `holiday` lists public holidays in a date range
//! - `calendar` reads the student's exams, deadlines and classes
//!
//! Answers cite the evidence they were built from, and say so plainly when
//! nothing relevant was found.
//!
//! # Architecture
//!
//! - `config` - Settings file and prompt templates
//! - `embedding` / `generation` - OpenAI-compatible model clients
//! - `vector_store` - Course index abstraction (SQLite, in-memory)
//! - `rag` - Retriever and answer synthesizer
//! - `tools` - Tool adapters with typed inputs and outputs
//! - `evidence` - References from answers back to tool results
//! - `orchestrator` - Conversation state, router and the turn loop
//!
//! # Example
//!
//! ```rust,no_run
//! use coursemate::config::Settings;
//! use coursemate::orchestrator::{ConversationState, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(&settings)?;
//!
//!     let today = chrono::Local::now().date_naive();
//!     let (_state, answer) = orchestrator
//!         .run_turn(ConversationState::new(), "What is TF-IDF?", today)
//!         .await?;
//!     println!("{}", answer.text);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod evidence;
pub mod generation;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod tools;
pub mod vector_store;

pub use error::{CourseMateError, Result, ToolError};
