//! Command handlers for the medbot CLI.

pub mod ask;
pub mod chat;
pub mod prompts;
pub mod stats;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use prompts::PromptsCommand;
pub use stats::StatsCommand;
