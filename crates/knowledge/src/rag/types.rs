//! Answer types.

use crate::types::Chunk;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

/// Answer text used when the model produced nothing usable.
pub const NO_RESULT: &str = "No result";

/// Maximum snippet length for source references.
const MAX_SNIPPET_LENGTH: usize = 150;

/// How far generation got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The model finished and the answer was extracted normally.
    Complete,
    /// Generation stopped early, or the answer marker never appeared.
    Partial,
    /// The model call failed; see the diagnostic.
    Failed,
}

/// Result of one question.
///
/// `sources` are exactly the chunks that went into the prompt, in rank order.
#[derive(Debug, Clone)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<Arc<Chunk>>,
    pub completion: Completion,
    /// Set when `completion` is `Failed`, and for some partial results.
    pub diagnostic: Option<String>,
}

impl AnswerResult {
    pub fn complete(answer: impl Into<String>, sources: Vec<Arc<Chunk>>) -> Self {
        Self {
            answer: non_empty(answer.into()),
            sources,
            completion: Completion::Complete,
            diagnostic: None,
        }
    }

    pub fn partial(answer: impl Into<String>, sources: Vec<Arc<Chunk>>, diagnostic: Option<String>) -> Self {
        Self {
            answer: non_empty(answer.into()),
            sources,
            completion: Completion::Partial,
            diagnostic,
        }
    }

    /// A failed generation. Never carries an empty diagnostic.
    pub fn failed(diagnostic: impl Into<String>, sources: Vec<Arc<Chunk>>) -> Self {
        let diagnostic = diagnostic.into();
        let diagnostic = if diagnostic.trim().is_empty() {
            "language model failed without a message".to_string()
        } else {
            diagnostic
        };

        Self {
            answer: String::new(),
            sources,
            completion: Completion::Failed,
            diagnostic: Some(diagnostic),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.completion == Completion::Failed
    }

    /// User-facing references for the source chunks.
    pub fn source_refs(&self) -> Vec<SourceRef> {
        self.sources.iter().map(|chunk| SourceRef::from_chunk(chunk)).collect()
    }
}

fn non_empty(answer: String) -> String {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        NO_RESULT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// A source reference shown next to an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    /// Chunk identifier
    pub id: String,

    /// Source document name (e.g., "anemia.pdf")
    pub source: String,

    /// Page within the source, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Short snippet of the chunk text (truncated if needed)
    pub snippet: String,
}

impl SourceRef {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id.clone(),
            source: chunk.source.clone(),
            page: chunk.page,
            snippet: snippet(&chunk.text),
        }
    }
}

/// Collapse whitespace and cut at a word boundary.
fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_SNIPPET_LENGTH {
        return collapsed;
    }

    let cut: String = collapsed.chars().take(MAX_SNIPPET_LENGTH).collect();
    let cut = match cut.rfind(' ') {
        Some(pos) if pos > MAX_SNIPPET_LENGTH / 2 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", cut)
}

/// Item of a streamed answer.
#[derive(Debug, Clone)]
pub enum AnswerEvent {
    /// Answer text the user may see now.
    Delta(String),
    /// Final result; always the last item.
    Finished(AnswerResult),
}

/// Stream of answer events. Dropping it abandons the model call.
pub type AnswerStream = Pin<Box<dyn Stream<Item = AnswerEvent> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_answer_becomes_no_result() {
        let result = AnswerResult::complete("   \n", vec![]);
        assert_eq!(result.answer, NO_RESULT);
        assert_eq!(result.completion, Completion::Complete);
    }

    #[test]
    fn test_failed_always_has_diagnostic() {
        let result = AnswerResult::failed("", vec![]);
        assert!(result.is_failed());
        assert!(!result.diagnostic.unwrap().is_empty());

        let result = AnswerResult::failed("model host unreachable", vec![]);
        assert_eq!(result.diagnostic.as_deref(), Some("model host unreachable"));
    }

    #[test]
    fn test_source_refs_preserve_order() {
        let sources = vec![
            Arc::new(Chunk::new("b", "second ranked", "b.pdf").with_page(2)),
            Arc::new(Chunk::new("a", "first   ranked\ntext", "a.pdf")),
        ];
        let result = AnswerResult::complete("answer", sources);
        let refs = result.source_refs();

        assert_eq!(refs[0].id, "b");
        assert_eq!(refs[0].page, Some(2));
        assert_eq!(refs[1].snippet, "first ranked text");
    }

    #[test]
    fn test_long_snippet_truncated_at_word() {
        let text = "word ".repeat(100);
        let snip = snippet(&text);
        assert!(snip.ends_with("..."));
        assert!(snip.chars().count() <= MAX_SNIPPET_LENGTH + 3);
        assert!(!snip.contains("wo..."));
    }
}
