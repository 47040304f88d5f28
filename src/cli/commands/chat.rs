//! Interactive chat command.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{Orchestrator, Session};
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Inputs that end the session.
const EXIT_WORDS: [&str; 3] = ["quit", "exit", "bye"];

/// Run the interactive chat command.
pub async fn run_chat(settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'coursemate doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Arc::new(Orchestrator::new(&settings)?);
    let mut session = Session::new(orchestrator);

    println!("\n{}", style("CourseMate Chat").bold().cyan());
    println!(
        "{}\n",
        style("Ask about the course, the weather, holidays or your schedule. Type 'quit' to leave, 'clear' to start over.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if EXIT_WORDS.iter().any(|w| input.eq_ignore_ascii_case(w)) {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            session.clear();
            Output::info("Conversation history cleared.");
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let result = session.ask(input, chrono::Local::now().date_naive()).await;
        spinner.finish_and_clear();

        match result {
            Ok(answer) => Output::answer(&answer),
            Err(e) => Output::error(&format!("Error: {}", e)),
        }
    }

    Ok(())
}
