//! Configuration for the retrieval coordinator.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// How [`build_context`](crate::ContextAssembler::build_context) fits ranked
/// chunks into the token budget.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextTruncation {
    /// Join every chunk, then cut the joined text at the token limit. The
    /// last chunk that fits may end mid-sentence.
    #[default]
    Concatenated,
    /// Keep whole chunks in rank order and drop the tail that would overflow.
    /// If even the top chunk is over budget it is token-truncated on its own.
    WholeChunks,
}

impl FromStr for ContextTruncation {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concatenated" => Ok(Self::Concatenated),
            "whole_chunks" | "whole-chunks" => Ok(Self::WholeChunks),
            other => Err(RagError::ConfigError(format!(
                "unknown context truncation policy '{other}' (expected 'concatenated' or 'whole_chunks')"
            ))),
        }
    }
}

/// Retry and timeout policy for calls to the embedder and both stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after every failure.
    pub initial_backoff_ms: u64,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 1000, timeout_ms: 30_000 }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration parameters for retrieval.
///
/// Chunk sizes are measured in whitespace-delimited words; the context budget
/// is measured in tokens of the coordinator's [`Tokenizer`](crate::Tokenizer).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Words per chunk window.
    pub chunk_size: usize,
    /// Words shared between consecutive windows.
    pub chunk_overlap: usize,
    /// Results returned by a query when the caller does not pass `top_k`.
    pub top_k: usize,
    /// Minimum similarity for a result to be returned.
    pub score_threshold: f32,
    /// Token budget of the assembled context.
    pub max_context_tokens: usize,
    /// Policy used when the ranked chunks exceed `max_context_tokens`.
    pub context_truncation: ContextTruncation,
    /// Retry and timeout policy for external calls.
    pub retry: RetryConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 5,
            score_threshold: 0.7,
            max_context_tokens: 3000,
            context_truncation: ContextTruncation::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// Load configuration from `RAG_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a variable cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup, using the same keys
    /// as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, "RAG_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_CHUNK_OVERLAP")? {
            config.chunk_overlap = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_TOP_K")? {
            config.top_k = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_SCORE_THRESHOLD")? {
            config.score_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_MAX_CONTEXT_TOKENS")? {
            config.max_context_tokens = v;
        }
        if let Some(raw) = lookup("RAG_CONTEXT_TRUNCATION") {
            config.context_truncation = raw.parse()?;
        }
        if let Some(v) = parse_var(&lookup, "RAG_RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_RETRY_INITIAL_BACKOFF_MS")? {
            config.retry.initial_backoff_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_TIMEOUT_MS")? {
            config.retry.timeout_ms = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `score_threshold` is not finite
    /// - `retry.max_attempts == 0` or `retry.timeout_ms == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if !self.score_threshold.is_finite() {
            return Err(RagError::ConfigError(format!(
                "score_threshold must be finite, got {}",
                self.score_threshold
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(RagError::ConfigError(
                "retry.max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.retry.timeout_ms == 0 {
            return Err(RagError::ConfigError(
                "retry.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RagError::ConfigError(format!("invalid value for {key} ('{raw}'): {e}"))),
    }
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    /// Set the chunk window size in words.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in words.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the default number of results per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity score for returned results.
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.config.score_threshold = threshold;
        self
    }

    /// Set the token budget of the assembled context.
    pub fn max_context_tokens(mut self, tokens: usize) -> Self {
        self.config.max_context_tokens = tokens;
        self
    }

    /// Set the context truncation policy.
    pub fn context_truncation(mut self, policy: ContextTruncation) -> Self {
        self.config.context_truncation = policy;
        self
    }

    /// Set the retry policy for external calls.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the [`RetrievalConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RetrievalConfig::validate`].
    pub fn build(self) -> Result<RetrievalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
