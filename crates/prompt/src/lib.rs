//! Prompt assembly for medbot.
//!
//! This crate provides:
//! - The built-in grounded QA template
//! - Context budgeting over ranked chunks
//! - Handlebars rendering with HTML escaping disabled
//! - Optional YAML template overrides under `.medbot/prompts/`

pub mod builder;
pub mod context;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{PromptAssembler, DEFAULT_PROMPT_ID, DEFAULT_TEMPLATE};
pub use context::PromptContext;
pub use loader::{find_prompt, list_prompts, load_prompt};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
