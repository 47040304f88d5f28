//! Prompt templates for CourseMate.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub explanation: ExplanationPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Prompts for the grounded course explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplanationPrompts {
    pub system: String,
    pub user: String,
}

impl Default for ExplanationPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an expert Information Retrieval tutor.

Task: answer ONLY the course/theory part of the student's question.
Use the provided excerpts as grounding. If they are weak, stay general rather than inventing details.

Output format:
1) Main explanation (2-4 sentences)
2) Example or formula if relevant (1-3 lines)
3) Practical connection (1-2 sentences)

Do not mention tools. Do not paste the excerpts."#
                .to_string(),

            user: r#"Today's date: {{today}}

Question: {{question}}

Relevant excerpts from the course materials:

{{context}}

Answer the course part of the question based on the excerpts above."#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let explanation_path = custom_path.join("explanation.toml");
            if explanation_path.exists() {
                let content = std::fs::read_to_string(&explanation_path)?;
                prompts.explanation = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(!prompts.explanation.system.is_empty());
        assert!(prompts.explanation.user.contains("{{context}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} exams.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Noa".to_string());
        vars.insert("count".to_string(), "2".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Noa, you have 2 exams.");
    }

    #[test]
    fn test_provided_vars_override_custom() {
        let mut prompts = Prompts::default();
        prompts.variables.insert("course".to_string(), "IR".to_string());
        prompts.variables.insert("question".to_string(), "stale".to_string());

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "What is BM25?".to_string());

        let rendered = prompts.render_with_custom("{{course}}: {{question}}", &vars);
        assert_eq!(rendered, "IR: What is BM25?");
    }

    #[test]
    fn test_load_custom_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("explanation.toml"),
            "system = \"Be brief.\"\nuser = \"{{question}}\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.explanation.system, "Be brief.");
    }
}
