//! CLI output formatting utilities.

use crate::rag::{Answer, AnswerKind};
use crate::tools::CalendarEvent;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print a final answer.
    pub fn answer(answer: &Answer) {
        let label = match answer.kind {
            AnswerKind::Grounded => style("CourseMate:").cyan().bold(),
            AnswerKind::InsufficientInformation => style("CourseMate:").yellow().bold(),
            AnswerKind::Apology => style("CourseMate:").red().bold(),
        };
        println!("\n{}\n{}\n", label, answer.text);
    }

    /// Print a course search result.
    pub fn search_result(source: &str, offset: i64, score: f32, content: &str) {
        println!(
            "\n{} {} @ {} (score: {:.2})",
            style(">>").green(),
            style(source).bold(),
            style(offset).cyan(),
            score
        );
        println!("   {}", content_preview(content, 200));
    }

    /// Print a calendar event.
    pub fn event(event: &CalendarEvent) {
        println!(
            "  {} {} {} {} ({})",
            style("*").cyan(),
            style(event.date).bold(),
            event.time.format("%H:%M"),
            event.title,
            style(event.kind).dim()
        );
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Flatten and truncate content with ellipsis.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
