//! Answer-prefix filtering.
//!
//! Models prompted for a final answer tend to think out loud first. The
//! filter holds generated text back until the marker token sequence (by
//! default `FINAL ANSWER`) has been seen and surfaces only what follows it.

/// Incremental filter over streamed model text.
#[derive(Debug)]
pub struct AnswerPrefixFilter {
    tokens: Vec<String>,
    state: FilterState,
    held: String,
    surfaced: String,
    marker_seen: bool,
    released: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    /// Holding text back, looking for the marker
    Searching,
    /// Marker seen; dropping the separator before the answer
    SkippingSeparator,
    /// Everything goes through
    Passing,
}

impl AnswerPrefixFilter {
    /// Create a filter. Blank tokens are ignored; no tokens means pass-through.
    pub fn new(tokens: &[String]) -> Self {
        let tokens: Vec<String> = tokens
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let state = if tokens.is_empty() {
            FilterState::Passing
        } else {
            FilterState::Searching
        };

        Self {
            tokens,
            state,
            held: String::new(),
            surfaced: String::new(),
            marker_seen: false,
            released: false,
        }
    }

    /// Feed one fragment. Returns the text that may be shown now.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        match self.state {
            FilterState::Searching => {
                self.held.push_str(fragment);
                self.try_match(false)
            }
            _ => self.emit(fragment),
        }
    }

    /// Stop holding text back: surface everything held so far and pass the
    /// rest through. No-op unless still searching.
    pub fn release(&mut self) -> Option<String> {
        if self.state != FilterState::Searching {
            return None;
        }

        self.state = FilterState::Passing;
        self.released = true;
        let held = std::mem::take(&mut self.held);
        self.emit(held.trim_start())
    }

    /// Signal end of input. A marker ending exactly at the end of the text is
    /// only recognised here.
    pub fn finish(&mut self) -> Option<String> {
        if self.state == FilterState::Searching {
            self.try_match(true)
        } else {
            None
        }
    }

    /// Whether any marker tokens are configured.
    pub fn is_active(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Whether the marker has been observed.
    pub fn marker_seen(&self) -> bool {
        self.marker_seen
    }

    /// Whether held text was released without a marker.
    pub fn released(&self) -> bool {
        self.released
    }

    /// Whether text is still being held back.
    pub fn is_holding(&self) -> bool {
        self.state == FilterState::Searching
    }

    /// Text held back so far.
    pub fn held(&self) -> &str {
        &self.held
    }

    /// Everything surfaced so far.
    pub fn surfaced(&self) -> &str {
        &self.surfaced
    }

    fn try_match(&mut self, at_end: bool) -> Option<String> {
        let end = find_marker(&self.held, &self.tokens, at_end)?;
        let rest = self.held.split_off(end);
        self.held.clear();
        self.marker_seen = true;
        self.state = FilterState::SkippingSeparator;
        self.emit(&rest)
    }

    fn emit(&mut self, text: &str) -> Option<String> {
        let text = if self.state == FilterState::SkippingSeparator {
            let trimmed = trim_separator(text);
            if !trimmed.is_empty() {
                self.state = FilterState::Passing;
            }
            trimmed
        } else {
            text
        };

        if text.is_empty() {
            return None;
        }
        self.surfaced.push_str(text);
        Some(text.to_string())
    }
}

fn trim_separator(text: &str) -> &str {
    text.trim_start_matches(|c: char| c == ':' || c.is_whitespace())
}

/// Text after the marker in a complete model output, if the marker occurs.
pub fn text_after_marker<'a>(text: &'a str, tokens: &[String]) -> Option<&'a str> {
    let tokens: Vec<String> = tokens
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return None;
    }

    find_marker(text, &tokens, true).map(|end| trim_separator(&text[end..]))
}

/// Byte offset just past the first occurrence of `tokens` as consecutive
/// whitespace-separated words, each optionally followed by `:`.
///
/// Unless `at_end`, a match on the very last word only counts once something
/// follows it, since the word may still be growing.
fn find_marker(text: &str, tokens: &[String], at_end: bool) -> Option<usize> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                words.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        words.push((s, text.len()));
    }

    let n = tokens.len();
    if n == 0 || words.len() < n {
        return None;
    }

    for i in 0..=words.len() - n {
        let window = &words[i..i + n];
        let matched = window.iter().zip(tokens).all(|(&(s, e), token)| {
            text[s..e].trim_end_matches(':').eq_ignore_ascii_case(token)
        });
        if !matched {
            continue;
        }

        let end = window[n - 1].1;
        let settled = at_end || end < text.len() || text[..end].ends_with(':');
        return settled.then_some(end);
    }

    None
}
