//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{ConversationState, Orchestrator};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use console::style;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    today: Option<&str>,
    trace: bool,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'coursemate doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let today = match today {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("--today must be YYYY-MM-DD, got {:?}", s))?,
        None => chrono::Local::now().date_naive(),
    };

    let orchestrator = Orchestrator::new(&settings)?;

    let spinner = Output::spinner("Thinking...");
    let result = orchestrator
        .run_turn(ConversationState::new(), question, today)
        .await;
    spinner.finish_and_clear();

    let (state, answer) = match result {
        Ok(done) => done,
        Err(e) => {
            Output::error(&format!("Failed to answer: {}", e));
            return Err(e.into());
        }
    };

    Output::answer(&answer);

    if trace {
        if let Some(turn) = state.current() {
            Output::header("Tool calls");
            for (i, invocation) in turn.invocations().iter().enumerate() {
                let status = match &invocation.outcome {
                    Ok(output) if output.is_absence() => style("not found".to_string()).yellow(),
                    Ok(_) => style("ok".to_string()).green(),
                    Err(e) => style(e.to_string()).red(),
                };
                println!("  #{} {} -> {}", i + 1, invocation.input, status);
            }
            Output::kv("Phase", &format!("{:?}", turn.phase()));
        }
    }

    Ok(())
}
