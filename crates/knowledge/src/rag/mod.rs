//! Retrieval-augmented answering.
//!
//! Turns an assembled prompt into an `AnswerResult`, either in one call or
//! as a stream of answer deltas.

pub mod filter;
pub mod synthesize;
pub mod types;

pub use filter::AnswerPrefixFilter;
pub use synthesize::{GenerationParams, ModelOutput, Synthesizer};
pub use types::{AnswerEvent, AnswerResult, AnswerStream, Completion, SourceRef, NO_RESULT};
