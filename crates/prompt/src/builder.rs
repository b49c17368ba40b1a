//! Prompt assembly: budgeted context plus question rendered through a
//! Handlebars template.

use crate::context::PromptContext;
use crate::loader::{find_prompt, validate_prompt};
use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use handlebars::Handlebars;
use medbot_core::{AppError, AppResult};
use medbot_knowledge::Chunk;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Identifier of the built-in template.
pub const DEFAULT_PROMPT_ID: &str = "medbot.qa.grounded";

/// Built-in grounded QA template.
pub const DEFAULT_TEMPLATE: &str = "Use the following information to answer the user's question.
Only consider the context provided. Ignore anything not mentioned in the context.
Give the most likely condition first. Mention rare causes only if clearly supported.
If you don't know the answer based on the context, say 'I don't know.'

Context: {{context}}
Question: {{question}}

Helpful answer:
";

const TEMPLATE_NAME: &str = "prompt";

/// Renders prompts from retrieved chunks and a question.
///
/// Rendering is pure: the same chunks, question and budget always give the
/// same text.
pub struct PromptAssembler {
    registry: Handlebars<'static>,
    prompt_id: String,
    max_context_chars: usize,
}

impl std::fmt::Debug for PromptAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptAssembler")
            .field("prompt_id", &self.prompt_id)
            .field("max_context_chars", &self.max_context_chars)
            .finish()
    }
}

impl PromptAssembler {
    /// Assembler using the built-in template.
    pub fn new(max_context_chars: usize) -> AppResult<Self> {
        Self::with_template(DEFAULT_PROMPT_ID, DEFAULT_TEMPLATE, max_context_chars)
    }

    /// Assembler using a loaded prompt definition.
    pub fn from_definition(definition: &PromptDefinition, max_context_chars: usize) -> AppResult<Self> {
        validate_prompt(definition)?;
        Self::with_template(&definition.id, &definition.template, max_context_chars)
    }

    /// Assembler for the workspace: the override `prompt_id` when given and
    /// present, otherwise the built-in template.
    ///
    /// # Errors
    /// `AppError::Config` if an override exists but is invalid.
    pub fn load(workspace: &Path, prompt_id: Option<&str>, max_context_chars: usize) -> AppResult<Self> {
        let Some(id) = prompt_id else {
            return Self::new(max_context_chars);
        };

        let invalid = |e: AppError| AppError::Config(format!("Invalid prompt override '{}': {}", id, e));
        match find_prompt(workspace, id).map_err(invalid)? {
            Some(definition) => Self::from_definition(&definition, max_context_chars).map_err(invalid),
            None => {
                tracing::debug!(prompt_id = id, "No prompt override found; using built-in template");
                Self::new(max_context_chars)
            }
        }
    }

    fn with_template(prompt_id: &str, template: &str, max_context_chars: usize) -> AppResult<Self> {
        let mut registry = Handlebars::new();

        // Plain text, not HTML
        registry.register_escape_fn(handlebars::no_escape);

        registry
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

        Ok(Self {
            registry,
            prompt_id: prompt_id.to_string(),
            max_context_chars,
        })
    }

    pub fn prompt_id(&self) -> &str {
        &self.prompt_id
    }

    /// Build the prompt for `question` from ranked `chunks`.
    ///
    /// With no chunks the context section is empty but the instructions and
    /// question are still rendered.
    pub fn assemble(&self, chunks: &[Arc<Chunk>], question: &str) -> AppResult<BuiltPrompt> {
        let context = PromptContext::build(chunks, self.max_context_chars);

        let mut variables = BTreeMap::new();
        variables.insert("context", context.text());
        variables.insert("question", question.trim());

        let text = self
            .registry
            .render(TEMPLATE_NAME, &variables)
            .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

        let metadata = BuiltPromptMetadata {
            source_prompt_id: self.prompt_id.clone(),
            chunks_included: context.included().len(),
            chunks_dropped: context.dropped(),
            context_truncated: context.truncated(),
        };

        tracing::debug!(
            prompt_id = %self.prompt_id,
            chars = text.chars().count(),
            chunks = metadata.chunks_included,
            "Assembled prompt"
        );

        Ok(BuiltPrompt {
            text,
            sources: context.into_included(),
            metadata,
        })
    }
}
