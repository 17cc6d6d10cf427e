//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`WordWindowChunker`], which
//! splits text into overlapping windows of whitespace-delimited words.

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// A strategy for splitting document text into chunks.
///
/// Implementations must be deterministic: the same input always yields the
/// same chunk sequence, with ordinals `0..n` in position order.
pub trait Chunker: Send + Sync {
    /// Split `text` belonging to `document_id` into chunks.
    ///
    /// Returns an empty `Vec` if the text contains no words.
    fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk>;
}

/// Splits text into windows of `chunk_size` words, each starting
/// `chunk_size - chunk_overlap` words after the previous one.
///
/// Window `i` starts at word `i * (chunk_size - chunk_overlap)`. Windowing stops
/// as soon as a window reaches the last word, so no window is fully contained
/// in its predecessor and text shorter than `chunk_size` yields one chunk.
/// Words are re-joined with single spaces.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_retrieval::{Chunker, WordWindowChunker};
///
/// let chunker = WordWindowChunker::new(500, 50)?;
/// let chunks = chunker.chunk("doc-1", &text);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordWindowChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl WordWindowChunker {
    /// Create a new `WordWindowChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`; such a window would never advance.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Number of chunks produced for a text of `word_count` words.
    pub fn expected_chunks(&self, word_count: usize) -> usize {
        if word_count == 0 {
            return 0;
        }
        (word_count.saturating_sub(self.chunk_overlap)).div_ceil(self.step()).max(1)
    }

    /// Split raw text into window strings without attaching chunk identity.
    pub fn split(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut windows = Vec::with_capacity(self.expected_chunks(words.len()));
        let mut start = 0;

        while start < words.len() {
            let end = (start + self.chunk_size).min(words.len());
            let window = words[start..end].join(" ");
            if !window.is_empty() {
                windows.push(window);
            }
            if end == words.len() {
                break;
            }
            start += self.step();
        }

        windows
    }
}

impl Chunker for WordWindowChunker {
    fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk { document_id: document_id.to_string(), index, text })
            .collect()
    }
}
