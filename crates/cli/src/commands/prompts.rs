//! Prompts command handler.
//!
//! Lists the prompt overrides under `.medbot/prompts/` and marks the one the
//! pipeline would use.

use clap::Args;
use medbot_core::{config::AppConfig, AppResult};
use medbot_prompt::{find_prompt, list_prompts, load_prompt, PromptAssembler, DEFAULT_PROMPT_ID};
use std::path::Path;

/// List prompt overrides in the workspace
#[derive(Args, Debug)]
pub struct PromptsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PromptsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing prompts command");

        let ids = list_prompts(&config.workspace)?;
        let configured = config.pipeline.prompt_id.as_deref();
        let active = active_prompt_id(
            &config.workspace,
            configured,
            config.pipeline.max_context_chars,
        );

        let entries: Vec<_> = ids
            .iter()
            .map(|id| match load_prompt(&config.workspace, id) {
                Ok(prompt) => serde_json::json!({
                    "id": id,
                    "title": prompt.title,
                    "valid": true,
                }),
                Err(e) => serde_json::json!({
                    "id": id,
                    "valid": false,
                    "error": e.to_string(),
                }),
            })
            .collect();

        if self.json {
            let output = serde_json::json!({
                "active": active,
                "configured": configured,
                "builtin": DEFAULT_PROMPT_ID,
                "overrides": entries,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        let marker = |id: &str| if active.as_deref() == Some(id) { "*" } else { " " };
        println!("{} {} (built-in)", marker(DEFAULT_PROMPT_ID), DEFAULT_PROMPT_ID);
        for entry in &entries {
            let id = entry["id"].as_str().unwrap_or_default();
            match entry["title"].as_str() {
                Some(title) => println!("{} {} - {}", marker(id), id, title),
                None => println!(
                    "  {} (invalid: {})",
                    id,
                    entry["error"].as_str().unwrap_or_default()
                ),
            }
        }

        if active.is_none() {
            println!();
            println!(
                "Configured prompt '{}' is invalid; the pipeline will refuse to start.",
                configured.unwrap_or_default()
            );
        }

        Ok(())
    }
}

/// The prompt the pipeline would run with.
///
/// A missing override falls back to the built-in template. `None` when the
/// configured override exists but fails to load, since startup rejects it.
fn active_prompt_id(workspace: &Path, configured: Option<&str>, max_context_chars: usize) -> Option<String> {
    let Some(id) = configured else {
        return Some(DEFAULT_PROMPT_ID.to_string());
    };

    match find_prompt(workspace, id) {
        Ok(None) => Some(DEFAULT_PROMPT_ID.to_string()),
        Ok(Some(definition)) => match PromptAssembler::from_definition(&definition, max_context_chars) {
            Ok(_) => Some(id.to_string()),
            Err(e) => {
                tracing::warn!(prompt_id = id, error = %e, "Configured prompt override is invalid");
                None
            }
        },
        Err(e) => {
            tracing::warn!(prompt_id = id, error = %e, "Configured prompt override is invalid");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(workspace: &Path, id: &str, content: &str) {
        let dir = workspace.join(".medbot/prompts");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.yml", id)), content).unwrap();
    }

    #[test]
    fn test_no_override_uses_builtin() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            active_prompt_id(temp_dir.path(), None, 1000).as_deref(),
            Some(DEFAULT_PROMPT_ID)
        );
    }

    #[test]
    fn test_missing_override_falls_back_to_builtin() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            active_prompt_id(temp_dir.path(), Some("absent"), 1000).as_deref(),
            Some(DEFAULT_PROMPT_ID)
        );
    }

    #[test]
    fn test_valid_override_is_active() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            "terse",
            "id: terse\ntitle: Terse\napiVersion: \"1.0\"\ntemplate: \"{{context}} | {{question}}\"\n",
        );
        assert_eq!(
            active_prompt_id(temp_dir.path(), Some("terse"), 1000).as_deref(),
            Some("terse")
        );
    }

    #[test]
    fn test_invalid_override_is_not_active() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            "noq",
            "id: noq\ntitle: No question\napiVersion: \"1.0\"\ntemplate: \"{{context}}\"\n",
        );
        write_prompt(
            temp_dir.path(),
            "broken",
            "id: broken\ntitle: B\napiVersion: \"1.0\"\ntemplate: \"{{#if}}{{question}}\"\n",
        );

        assert!(load_prompt(temp_dir.path(), "noq").is_err());
        assert_eq!(active_prompt_id(temp_dir.path(), Some("noq"), 1000), None);
        assert_eq!(active_prompt_id(temp_dir.path(), Some("broken"), 1000), None);
    }
}
