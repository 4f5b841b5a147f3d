//! Sentence-aware splitting.
//!
//! Sentences are packed into chunks of at most `chunk_size` chars. The
//! trailing sentences of a chunk, up to `overlap_size` chars, are repeated at
//! the start of the next one. Sentences longer than a chunk fall back to
//! character windows.

use super::{window_spans, ChunkingConfig, Splitter, TextSpan};

/// Sentence-packing splitter.
pub struct SentenceSplitter {
    config: ChunkingConfig,
}

impl SentenceSplitter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Sentence boundaries as contiguous `(start, end)` char ranges.
    ///
    /// A sentence ends after `.`, `!` or `?` followed by whitespace, or after
    /// a newline. Trailing whitespace stays with the sentence it follows.
    fn sentences(chars: &[char]) -> Vec<(usize, usize)> {
        let mut sentences = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let terminal = c == '\n'
                || (matches!(c, '.' | '!' | '?')
                    && chars.get(i + 1).map_or(true, |next| next.is_whitespace()));

            if terminal {
                let mut end = i + 1;
                while end < chars.len() && chars[end].is_whitespace() {
                    end += 1;
                }
                sentences.push((start, end));
                start = end;
                i = end;
            } else {
                i += 1;
            }
        }

        if start < chars.len() {
            sentences.push((start, chars.len()));
        }
        sentences
    }
}

impl Splitter for SentenceSplitter {
    fn split(&self, text: &str) -> Vec<TextSpan> {
        let chars: Vec<char> = text.chars().collect();
        let sentences = Self::sentences(&chars);
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.overlap_size;

        let mut spans = Vec::new();
        let mut i = 0;

        while i < sentences.len() {
            let (start, first_end) = sentences[i];

            if first_end - start > chunk_size {
                spans.extend(window_spans(&chars, start, first_end, self.config));
                i += 1;
                continue;
            }

            let mut j = i;
            let mut end = first_end;
            while j + 1 < sentences.len() && sentences[j + 1].1 - start <= chunk_size {
                j += 1;
                end = sentences[j].1;
            }

            spans.push(TextSpan {
                start,
                end,
                text: chars[start..end].iter().collect(),
            });

            if j + 1 >= sentences.len() {
                break;
            }

            // Carry trailing sentences into the next chunk, always advancing
            // by at least one sentence.
            let mut next = j + 1;
            while next > i + 1 && end - sentences[next - 1].0 <= overlap {
                next -= 1;
            }
            i = next;
        }

        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_boundaries() {
        let chars: Vec<char> = "Dr. No is here. He waits!\nThen 3.5 hours pass".chars().collect();
        let sentences = SentenceSplitter::sentences(&chars);
        let texts: Vec<String> = sentences
            .iter()
            .map(|(s, e)| chars[*s..*e].iter().collect())
            .collect();
        assert_eq!(
            texts,
            vec!["Dr. ", "No is here. ", "He waits!\n", "Then 3.5 hours pass"]
        );
    }

    #[test]
    fn test_packs_sentences_without_cutting_them() {
        let splitter = SentenceSplitter::new(ChunkingConfig::new(30, 0).unwrap());
        let text = "Daniel moves west. He meets Ali. Johnny bullies him. Miyagi helps.";
        let spans = splitter.split(text);

        assert_eq!(spans[0].text, "Daniel moves west. ");
        for span in &spans {
            assert!(span.text.chars().count() <= 30);
        }
        let joined: String = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_overlap_repeats_trailing_sentence() {
        let splitter = SentenceSplitter::new(ChunkingConfig::new(40, 15).unwrap());
        let text = "One two three. Four five. Six seven eight. Nine ten.";
        let spans = splitter.split(text);

        assert!(spans.len() >= 2);
        assert_eq!(spans[0].text, "One two three. Four five. ");
        assert!(spans[1].text.starts_with("Four five. "));
        assert_eq!(spans.last().unwrap().end, text.chars().count());
    }

    #[test]
    fn test_long_sentence_falls_back_to_windows() {
        let splitter = SentenceSplitter::new(ChunkingConfig::new(512, 50).unwrap());
        let spans = splitter.split(&"a".repeat(1000));
        assert_eq!(spans.len(), 3);
    }
}
