//! Text chunking with overlap.
//!
//! Plain text is split into overlapping character windows so adjoining
//! context survives the window boundary. Structured vision output is never
//! chunked; it is stored whole so its metadata fields stay cohesive for
//! aggregation.

use crate::models::IngestionConfig;

/// Text chunker that splits document text into overlapping windows.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Window size in characters.
    chunk_size: usize,
    /// Overlap between consecutive windows in characters.
    overlap: usize,
}

impl TextChunker {
    pub fn new(config: &IngestionConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            overlap: config.chunk_overlap.min(config.chunk_size.saturating_sub(1)),
        }
    }

    /// Create a chunker with default settings.
    pub fn with_defaults() -> Self {
        Self::new(&IngestionConfig::default())
    }

    /// Split text into overlapping windows.
    ///
    /// Text shorter than one window yields exactly one chunk; empty or
    /// whitespace-only text yields none.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        if total <= self.chunk_size {
            return vec![text.to_string()];
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let end = (start + self.chunk_size).min(total);
            let end = self.find_break_point(&chars, end, total);
            chunks.push(chars[start..end].iter().collect());

            if end >= total {
                break;
            }
            start += step;
        }

        chunks
    }

    /// Prefer a natural break (paragraph > newline > sentence > space) near
    /// the target end position.
    fn find_break_point(&self, chars: &[char], target_end: usize, total: usize) -> usize {
        if target_end >= total {
            return total;
        }

        // Never look back past the overlap, or the next window would start
        // after this chunk's end and drop characters
        let lookback = (self.chunk_size / 5).min(self.overlap);
        let search_start = target_end.saturating_sub(lookback);
        let range = &chars[search_start..target_end];

        let mut paragraph = None;
        let mut newline = None;
        let mut sentence = None;
        let mut space = None;

        for (i, c) in range.iter().enumerate() {
            let pos = search_start + i;
            match c {
                '\n' => {
                    if i > 0 && range.get(i - 1) == Some(&'\n') {
                        paragraph = Some(pos + 1);
                    }
                    newline = Some(pos + 1);
                }
                '.' | '!' | '?' => {
                    if range.get(i + 1).is_some_and(|c| c.is_whitespace()) {
                        sentence = Some(pos + 1);
                    }
                }
                ' ' | '\t' => {
                    space = Some(pos + 1);
                }
                _ => {}
            }
        }

        paragraph
            .or(newline)
            .or(sentence)
            .or(space)
            .unwrap_or(target_end)
    }
}
