//! Direct tool invocation, useful for checking a single adapter.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::tools::{ToolInput, ToolName};
use anyhow::{Context, Result};

/// Run the tool command.
pub async fn run_tool(name: &str, input: &str, schema: bool, settings: Settings) -> Result<()> {
    let tool: ToolName = name.parse()?;

    if schema {
        Output::header(&format!("{} input", tool));
        println!("{}", serde_json::to_string_pretty(&tool.input_schema())?);
        Output::header(&format!("{} output", tool));
        println!("{}", serde_json::to_string_pretty(&tool.output_schema())?);
        return Ok(());
    }

    let args: serde_json::Value =
        serde_json::from_str(input).context("tool input must be a JSON object")?;
    let input = ToolInput::parse(tool, args, &settings.weather.default_location)?;

    let orchestrator = Orchestrator::new(&settings)?;
    let today = chrono::Local::now().date_naive();

    Output::info(&format!("Calling {}", input));
    match orchestrator.toolkit().invoke(&input, today).await {
        Ok(output) => {
            println!("\n{}\n", output.render());
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("{} failed ({}): {}", tool, e.kind(), e));
            Err(e.into())
        }
    }
}
