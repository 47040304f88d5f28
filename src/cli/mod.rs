//! CLI module for CourseMate.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// CourseMate - course assistant for Information Retrieval
///
/// Answers questions from the course materials, and checks the weather,
/// holidays and your calendar when a question needs them.
#[derive(Parser, Debug)]
#[command(name = "coursemate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "COURSEMATE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the course index, calendar and configuration
    Doctor,

    /// Ask a single question
    Ask {
        /// The question to ask
        question: String,

        /// Answer as if today were this date (YYYY-MM-DD)
        #[arg(long)]
        today: Option<String>,

        /// Print the tool calls made for the answer
        #[arg(long)]
        trace: bool,
    },

    /// Start an interactive chat session
    Chat,

    /// Search the course materials
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long, default_value = "5")]
        limit: usize,

        /// Minimum similarity score (0.0-1.0)
        #[arg(short, long)]
        min_score: Option<f32>,
    },

    /// Manage calendar events
    Calendar {
        #[command(subcommand)]
        action: CalendarAction,
    },

    /// Call one tool directly with JSON input
    Tool {
        /// Tool name (course_search, weather, holiday, calendar)
        name: String,

        /// Input as JSON, e.g. '{"location": "Haifa"}'
        #[arg(default_value = "{}")]
        input: String,

        /// Print the tool's input and output schemas instead
        #[arg(long)]
        schema: bool,
    },

    /// Start HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CalendarAction {
    /// List events
    List {
        /// Only events in the next N days
        #[arg(long)]
        upcoming: Option<i64>,
    },

    /// Add an event
    Add {
        /// Event title
        title: String,
        /// Date (YYYY-MM-DD)
        date: String,
        /// Time (HH:MM)
        time: String,
        /// Event type (exam, deadline, class, meeting, other)
        #[arg(short = 't', long = "type", default_value = "other")]
        kind: String,
    },

    /// Remove every event with this title (case-insensitive)
    Remove {
        title: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the current configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_calendar_add() {
        let cli = Cli::parse_from([
            "coursemate", "calendar", "add", "IR Exam", "2026-02-20", "09:00", "--type", "exam",
        ]);
        match cli.command {
            Commands::Calendar {
                action: CalendarAction::Add { title, kind, .. },
            } => {
                assert_eq!(title, "IR Exam");
                assert_eq!(kind, "exam");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
