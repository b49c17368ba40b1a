//! Context section budgeting.
//!
//! Chunks are added in rank order while they fit in `max_context_chars`
//! (counted in characters, separators included); the lowest-ranked chunks
//! are dropped first. Only when the top chunk alone is over budget is its
//! text cut, at a whitespace boundary where one exists.

use medbot_knowledge::Chunk;
use std::sync::Arc;

/// Separator between chunk texts in the context section.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Context text for one prompt and the chunks it was built from.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    text: String,
    included: Vec<Arc<Chunk>>,
    dropped: usize,
    truncated: bool,
}

impl PromptContext {
    pub fn build(chunks: &[Arc<Chunk>], max_context_chars: usize) -> Self {
        let separator_len = CHUNK_SEPARATOR.chars().count();
        let mut text = String::new();
        let mut used = 0usize;
        let mut included = Vec::new();

        for chunk in chunks {
            let len = chunk.text.chars().count();
            let needed = if included.is_empty() { len } else { len + separator_len };
            if used + needed > max_context_chars {
                break;
            }
            if !included.is_empty() {
                text.push_str(CHUNK_SEPARATOR);
            }
            text.push_str(&chunk.text);
            used += needed;
            included.push(Arc::clone(chunk));
        }

        let mut truncated = false;
        if included.is_empty() {
            if let Some(top) = chunks.first() {
                text = truncate_at_boundary(&top.text, max_context_chars);
                included.push(Arc::clone(top));
                truncated = true;
            }
        }

        let dropped = chunks.len() - included.len();
        if dropped > 0 || truncated {
            tracing::debug!(
                included = included.len(),
                dropped,
                truncated,
                max_context_chars,
                "Context trimmed to budget"
            );
        }

        Self {
            text,
            included,
            dropped,
            truncated,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Chunks present in the context, in rank order.
    pub fn included(&self) -> &[Arc<Chunk>] {
        &self.included
    }

    pub fn into_included(self) -> Vec<Arc<Chunk>> {
        self.included
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

/// First `max_chars` characters of `text`, backed off to the last whitespace
/// when there is one.
fn truncate_at_boundary(text: &str, max_chars: usize) -> String {
    let cut = match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => return text.to_string(),
    };

    match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => cut[..pos].trim_end().to_string(),
        _ => cut.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> Arc<Chunk> {
        Arc::new(Chunk::new(id, text, "doc.pdf"))
    }

    #[test]
    fn test_all_chunks_fit() {
        let chunks = vec![chunk("a", "alpha"), chunk("b", "beta")];
        let context = PromptContext::build(&chunks, 100);

        assert_eq!(context.text(), "alpha\n\nbeta");
        assert_eq!(context.included().len(), 2);
        assert_eq!(context.dropped(), 0);
        assert!(!context.truncated());
    }

    #[test]
    fn test_lowest_ranked_dropped_first() {
        let chunks = vec![chunk("a", "aaaaa"), chunk("b", "bbbbb"), chunk("c", "ccccc")];
        // 5 + 2 + 5 = 12 fits, the third would need 19
        let context = PromptContext::build(&chunks, 15);

        assert_eq!(context.text(), "aaaaa\n\nbbbbb");
        assert_eq!(context.dropped(), 1);
        let ids: Vec<_> = context.included().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_oversized_top_chunk_truncated_at_whitespace() {
        let chunks = vec![chunk("a", "Iron deficiency anemia is common"), chunk("b", "x")];
        let context = PromptContext::build(&chunks, 20);

        assert_eq!(context.text(), "Iron deficiency");
        assert!(context.truncated());
        assert_eq!(context.included().len(), 1);
        assert_eq!(context.dropped(), 1);
    }

    #[test]
    fn test_truncation_without_whitespace_cuts_on_char_boundary() {
        let chunks = vec![chunk("a", "ÄÖÜäöüß")];
        let context = PromptContext::build(&chunks, 3);
        assert_eq!(context.text(), "ÄÖÜ");
    }

    #[test]
    fn test_empty_chunk_list() {
        let context = PromptContext::build(&[], 100);
        assert_eq!(context.text(), "");
        assert!(context.included().is_empty());
        assert!(!context.truncated());
    }
}
