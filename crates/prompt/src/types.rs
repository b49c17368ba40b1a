//! Prompt types.

use medbot_knowledge::Chunk;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A prompt override loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Handlebars template with `{{context}}` and `{{question}}` slots
    pub template: String,
}

/// A rendered prompt ready for the language model.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    /// Prompt text
    pub text: String,

    /// Chunks whose text made it into the prompt, in rank order
    pub sources: Vec<Arc<Chunk>>,

    /// Metadata about the build
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Chunks included in the context section
    #[serde(rename = "chunksIncluded")]
    pub chunks_included: usize,

    /// Lower-ranked chunks left out to respect the context budget
    #[serde(rename = "chunksDropped")]
    pub chunks_dropped: usize,

    /// Whether the top chunk had to be cut to fit
    #[serde(rename = "contextTruncated")]
    pub context_truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: medbot.qa.short
title: Short answers
apiVersion: "1.0"
createdBy: clinic
template: "Context: {{context}}\nQ: {{question}}\nA:"
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "medbot.qa.short");
        assert_eq!(def.api_version, "1.0");
        assert!(def.description.is_none());
        assert!(def.template.contains("{{question}}"));
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let meta = BuiltPromptMetadata {
            source_prompt_id: "medbot.qa.grounded".to_string(),
            chunks_included: 2,
            chunks_dropped: 1,
            context_truncated: false,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["sourcePromptId"], "medbot.qa.grounded");
        assert_eq!(json["chunksDropped"], 1);
    }
}
