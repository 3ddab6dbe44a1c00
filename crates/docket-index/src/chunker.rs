//! Splits extracted text into overlapping, character-bounded chunks.
//!
//! Breaks are chosen from a preference order of separators; a hard cut is used
//! only when no separator falls in the tail of the window. Iteration is lazy, so
//! large documents never need all chunks in memory at once.

use docket_core::{ChunkingConfig, Result};

/// Break candidates, most preferred first
pub const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// Configured chunker; cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    /// Maximum characters per chunk
    chunk_size: usize,
    /// Characters shared between consecutive chunks
    overlap: usize,
}

/// One chunk borrowed from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunk<'text> {
    /// Trimmed chunk text
    pub text: &'text str,
    /// Byte offset of the chunk in the source text
    pub offset: usize,
}

impl Chunker {
    /// Create a chunker from validated settings
    ///
    /// # Errors
    /// Returns a configuration error if `chunk_overlap >= chunk_size` or `chunk_size` is zero
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
        })
    }

    /// Maximum characters per chunk
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared between consecutive chunks
    pub const fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily chunk `text`. Cloning the iterator restarts from the same point.
    pub fn chunks<'text>(&self, text: &'text str) -> Chunks<'text> {
        Chunks {
            text,
            cursor: skip_whitespace(text, 0),
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            finished: false,
        }
    }
}

/// Lazy iterator over the chunks of one text.
#[derive(Debug, Clone)]
pub struct Chunks<'text> {
    text: &'text str,
    cursor: usize,
    chunk_size: usize,
    overlap: usize,
    finished: bool,
}

impl<'text> Iterator for Chunks<'text> {
    type Item = TextChunk<'text>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.cursor >= self.text.len() {
            self.finished = true;
            return None;
        }

        let start = self.cursor;
        let window_end = self.text[start..]
            .char_indices()
            .nth(self.chunk_size)
            .map_or(self.text.len(), |(idx, _)| start + idx);

        if window_end == self.text.len() {
            self.finished = true;
            return Some(TextChunk {
                text: self.text[start..].trim_end(),
                offset: start,
            });
        }

        let break_at = self.find_break(start, window_end);
        if skip_whitespace(self.text, break_at) >= self.text.len() {
            self.finished = true;
        } else {
            self.cursor = self.next_start(start, break_at);
        }

        Some(TextChunk {
            text: self.text[start..break_at].trim_end(),
            offset: start,
        })
    }
}

impl Chunks<'_> {
    /// Byte position just past the best separator in `[start, window_end)`.
    fn find_break(&self, start: usize, window_end: usize) -> usize {
        let window = &self.text[start..window_end];
        let min_chars = (self.chunk_size / 2).max(self.overlap + 1);

        for separator in SEPARATORS {
            if let Some(found) = window.rfind(separator) {
                let candidate = found + separator.len();
                if window[..candidate].chars().count() >= min_chars {
                    return start + candidate;
                }
            }
        }

        window_end
    }

    /// Start of the next chunk: `overlap` characters back from the break, moved to a word start.
    fn next_start(&self, start: usize, break_at: usize) -> usize {
        if self.overlap == 0 {
            return skip_whitespace(self.text, break_at);
        }

        let head = &self.text[start..break_at];
        let back = head
            .char_indices()
            .rev()
            .nth(self.overlap - 1)
            .map_or(start, |(idx, _)| start + idx);

        let at_word_start = self.text[..back]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace);
        let aligned = if at_word_start {
            back
        } else {
            self.text[back..break_at]
                .char_indices()
                .find(|(_, ch)| ch.is_whitespace())
                .map_or(back, |(idx, ch)| back + idx + ch.len_utf8())
        };

        let next = skip_whitespace(self.text, aligned);
        if next <= start {
            skip_whitespace(self.text, break_at)
        } else {
            next
        }
    }
}

/// First non-whitespace byte position at or after `from`, or `text.len()`.
fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .char_indices()
        .find(|(_, ch)| !ch.is_whitespace())
        .map_or(text.len(), |(idx, _)| from + idx)
}
