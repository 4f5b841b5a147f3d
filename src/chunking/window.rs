//! Fixed-stride window splitting.
//!
//! A text of `L` chars with chunk size `C` and overlap `O` yields one node
//! when `L <= C`, otherwise `ceil((L - O) / (C - O))` nodes. Windows start
//! every `C - O` chars and the last window ends at the end of the text.

use super::{window_spans, ChunkingConfig, Splitter, TextSpan};

/// Character-window splitter.
pub struct WindowSplitter {
    config: ChunkingConfig,
}

impl WindowSplitter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }
}

impl Splitter for WindowSplitter {
    fn split(&self, text: &str) -> Vec<TextSpan> {
        let chars: Vec<char> = text.chars().collect();
        window_spans(&chars, 0, chars.len(), self.config)
    }
}
