//! Error types for the `ragchat-retrieval` crate.

use thiserror::Error;

/// Errors that can occur in retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The document store or vector index could not be reached, or rejected a request.
    #[error("Store unavailable ({store}): {message}")]
    StoreUnavailable {
        /// The store that produced the error.
        store: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding provider errored or returned malformed output.
    #[error("Embedding failure ({provider}): {message}")]
    EmbeddingFailure {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration value was rejected before any I/O took place.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Document metadata is not a flat map of scalar values.
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// No stored document has the given id.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Text could not be encoded or decoded by the tokenizer.
    #[error("Tokenizer error ({encoding}): {message}")]
    TokenizerError {
        /// The encoding scheme in use.
        encoding: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    /// Whether retrying the failed call may succeed.
    ///
    /// Store and embedding failures are transient; every other variant is
    /// deterministic and is never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. } | Self::EmbeddingFailure { .. })
    }

    pub(crate) fn store(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable { store: store.into(), message: message.into() }
    }

    pub(crate) fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingFailure { provider: provider.into(), message: message.into() }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
