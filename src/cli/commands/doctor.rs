//! Doctor command - verify the course index and configuration.

use crate::cli::Output;
use crate::config::Settings;
use crate::tools::CalendarStore;
use crate::vector_store::{SqliteVectorStore, VectorStore};
use console::style;
use std::path::Path;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings, config_path: &Path) -> anyhow::Result<()> {
    Output::header("CourseMate Doctor");
    println!();
    println!("Checking course index, calendar and configuration...\n");

    let mut checks = Vec::new();

    println!("{}", style("Course Material").bold());
    let index_check = check_index(settings).await;
    index_check.print();
    checks.push(index_check);

    println!();

    println!("{}", style("Calendar").bold());
    let calendar_check = check_calendar(settings);
    calendar_check.print();
    checks.push(calendar_check);

    println!();

    println!("{}", style("Model Endpoints").bold());
    let mut endpoint_checks = vec![check_endpoint("Embeddings", &settings.embedding.api_base, &settings.embedding.model)];
    if settings.generation.enabled {
        endpoint_checks.push(check_endpoint("Generation", &settings.generation.api_base, &settings.generation.model));
    } else {
        endpoint_checks.push(CheckResult::ok("Generation", "disabled, answers quote the course material"));
    }
    for check in &endpoint_checks {
        check.print();
    }
    checks.extend(endpoint_checks);

    println!();

    println!("{}", style("Configuration").bold());
    let config_check = check_config_file(config_path);
    config_check.print();
    checks.push(config_check);

    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using CourseMate.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!(
            "All checks passed with {} warning(s).",
            warnings
        ));
    } else {
        Output::success("All checks passed! CourseMate is ready to use.");
    }

    Ok(())
}

/// Open the course index read-only and count its chunks.
async fn check_index(settings: &Settings) -> CheckResult {
    let db_path = settings.sqlite_path();
    let hint = "Point vector_store.sqlite_path at an indexed course database";
    let store = match SqliteVectorStore::open_read_only(&db_path) {
        Ok(store) => store,
        Err(e) => return CheckResult::error("Course index", &e.to_string(), hint),
    };

    let size = std::fs::metadata(&db_path)
        .map(|m| format_size(m.len()))
        .unwrap_or_else(|_| "unknown size".to_string());

    match store.document_count().await {
        Ok(0) => CheckResult::warning(
            "Course index",
            &format!("{} is empty", db_path.display()),
            "Every course question will come back as insufficient information",
        ),
        Ok(n) => CheckResult::ok(
            "Course index",
            &format!("{} ({} chunks, {})", db_path.display(), n, size),
        ),
        Err(e) => CheckResult::error("Course index", &e.to_string(), hint),
    }
}

fn check_calendar(settings: &Settings) -> CheckResult {
    let path = settings.calendar_path();
    if !path.exists() {
        return CheckResult::warning(
            "Calendar",
            &format!("{} (not created yet)", path.display()),
            "Created with sample events on first use",
        );
    }
    match CalendarStore::open(&path).and_then(|store| store.list()) {
        Ok(events) => CheckResult::ok(
            "Calendar",
            &format!("{} ({} events)", path.display(), events.len()),
        ),
        Err(e) => CheckResult::error("Calendar", &e.to_string(), "Check the file permissions"),
    }
}

/// Hosted endpoints need a key; local ones are assumed reachable.
fn check_endpoint(name: &str, api_base: &str, model: &str) -> CheckResult {
    if !api_base.contains("api.openai.com") {
        return CheckResult::ok(name, &format!("{} at {}", model, api_base));
    }
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if key.starts_with("sk-") && key.len() > 20 => {
            let masked = format!("{}...{}", &key[..7], &key[key.len() - 4..]);
            CheckResult::ok(name, &format!("{} (key {})", model, masked))
        }
        Ok(key) if key.is_empty() => CheckResult::error(
            name,
            "OPENAI_API_KEY is empty",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
        Ok(_) => CheckResult::warning(
            name,
            "OPENAI_API_KEY format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        Err(_) => CheckResult::error(
            name,
            "OPENAI_API_KEY not set",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
    }
}

fn check_config_file(config_path: &Path) -> CheckResult {
    if !config_path.exists() {
        return CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: coursemate config init",
        );
    }
    match Settings::load_from(Some(&config_path.to_path_buf())) {
        Ok(_) => CheckResult::ok("Config file", &format!("{}", config_path.display())),
        Err(e) => CheckResult::error("Config file", &e.to_string(), "Fix with: coursemate config edit"),
    }
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
