//! Prompt loader for YAML prompt overrides.

use crate::types::PromptDefinition;
use medbot_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Directory holding prompt overrides, relative to the workspace.
const PROMPTS_DIR: &str = ".medbot/prompts";

fn prompt_path(workspace_path: &Path, prompt_id: &str) -> PathBuf {
    workspace_path
        .join(PROMPTS_DIR)
        .join(format!("{}.yml", prompt_id))
}

/// Load a prompt definition by ID from the workspace.
///
/// Looks for `<workspace>/.medbot/prompts/<id>.yml`.
///
/// # Example
/// ```no_run
/// use medbot_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "medbot.qa.grounded")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    find_prompt(workspace_path, prompt_id)?.ok_or_else(|| {
        AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_path(workspace_path, prompt_id)
        ))
    })
}

/// Like [`load_prompt`], but a missing file is `Ok(None)` rather than an error.
pub fn find_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<Option<PromptDefinition>> {
    let prompt_file = prompt_path(workspace_path, prompt_id);
    tracing::debug!("Looking for prompt override at {:?}", prompt_file);

    if !prompt_file.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);
    Ok(Some(definition))
}

/// List all prompt override IDs in the workspace, sorted.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let prompts_dir = workspace_path.join(PROMPTS_DIR);

    if !prompts_dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids: Vec<String> = walkdir::WalkDir::new(&prompts_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("yml")
        })
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .collect();

    prompt_ids.sort();
    Ok(prompt_ids)
}

/// Validate a prompt definition.
pub(crate) fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.api_version.is_empty() {
        return Err(AppError::Prompt(
            "Prompt apiVersion cannot be empty".to_string(),
        ));
    }

    // Simple format check
    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.template.contains("{{question}}") {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' never uses {{{{question}}}}",
            def.id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, id: &str, content: &str) {
        let prompts_dir = dir.join(PROMPTS_DIR);
        fs::create_dir_all(&prompts_dir).unwrap();
        fs::write(prompts_dir.join(format!("{}.yml", id)), content).unwrap();
    }

    fn valid_yaml(id: &str) -> String {
        format!(
            r#"
id: {}
title: "Short answers"
apiVersion: "1.0"
template: "Context: {{{{context}}}}\nQuestion: {{{{question}}}}\nAnswer:"
"#,
            id
        )
    }

    #[test]
    fn test_load_valid_prompt() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "short", &valid_yaml("short"));

        let prompt = load_prompt(temp_dir.path(), "short").unwrap();
        assert_eq!(prompt.id, "short");
        assert_eq!(prompt.title, "Short answers");
    }

    #[test]
    fn test_missing_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
        assert!(find_prompt(temp_dir.path(), "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "invalid", "invalid: yaml: content:");
        assert!(matches!(
            load_prompt(temp_dir.path(), "invalid"),
            Err(AppError::Prompt(_))
        ));
    }

    #[test]
    fn test_template_must_use_question() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            "noq",
            "id: noq\ntitle: No question\napiVersion: \"1.0\"\ntemplate: \"{{context}}\"\n",
        );
        let err = load_prompt(temp_dir.path(), "noq").unwrap_err();
        assert!(err.to_string().contains("{{question}}"));
    }

    #[test]
    fn test_bad_api_version() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            "v",
            "id: v\ntitle: V\napiVersion: \"1\"\ntemplate: \"{{question}}\"\n",
        );
        assert!(load_prompt(temp_dir.path(), "v").is_err());
    }

    #[test]
    fn test_list_prompts() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "prompt2", &valid_yaml("prompt2"));
        write_prompt(temp_dir.path(), "prompt1", &valid_yaml("prompt1"));
        fs::write(temp_dir.path().join(PROMPTS_DIR).join("notes.txt"), "x").unwrap();

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts, vec!["prompt1".to_string(), "prompt2".to_string()]);
    }

    #[test]
    fn test_list_prompts_without_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(list_prompts(temp_dir.path()).unwrap().is_empty());
    }
}
