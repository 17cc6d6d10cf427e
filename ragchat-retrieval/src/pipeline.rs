//! Retrieval coordinator.
//!
//! The [`RetrievalCoordinator`] orchestrates ingest (store → chunk → embed →
//! index) and query (embed → search → assemble context) by composing a
//! [`DocumentStore`], a [`VectorIndex`], an [`EmbeddingProvider`], a
//! [`Chunker`] and a [`Tokenizer`].
//!
//! Ingest is all-or-nothing per document. Once the document is persisted, a
//! failure to embed or index its chunks triggers a compensating delete of the
//! document and of any vector records already written for it.
//!
//! Every write is safe to retry. The document id is chosen before the first
//! attempt, and vector record ids are derived from `(document id, chunk
//! index)`, so an attempt whose acknowledgement was lost is overwritten by the
//! retry instead of duplicated. The same ids let [`RetrievalCoordinator::reindex_all`]
//! rebuild the index from the document store.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_retrieval::{
//!     InMemoryDocumentStore, InMemoryVectorIndex, Metadata, RetrievalConfig, RetrievalCoordinator,
//! };
//!
//! let coordinator = RetrievalCoordinator::builder()
//!     .config(RetrievalConfig::default())
//!     .document_store(Arc::new(InMemoryDocumentStore::new()))
//!     .vector_index(Arc::new(InMemoryVectorIndex::new()))
//!     .embedding_provider(Arc::new(my_embedder))
//!     .build()?;
//!
//! coordinator.initialize().await?;
//! let id = coordinator.add_document("Rust is a systems language.", Metadata::new()).await?;
//! let results = coordinator.retrieve("what is rust?", None).await?;
//! let context = coordinator.build_context(&results)?;
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, WordWindowChunker};
use crate::config::RetrievalConfig;
use crate::context::{ContextAssembler, RetrievedContext};
use crate::docstore::DocumentStore;
use crate::document::{
    Chunk, ChunkPayload, Document, EmbeddingRecord, Metadata, SearchResult, validate_metadata,
};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retry::{Dependency, RetryPolicy};
use crate::tokenizer::{TiktokenTokenizer, Tokenizer};
use crate::vectorstore::VectorIndex;

/// The retrieval coordinator.
///
/// Holds no mutable state of its own; every call is independent and the
/// coordinator can be shared across tasks behind an `Arc`. Construct one via
/// [`RetrievalCoordinator::builder()`].
pub struct RetrievalCoordinator {
    config: RetrievalConfig,
    document_store: Arc<dyn DocumentStore>,
    vector_index: Arc<dyn VectorIndex>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn Chunker>,
    tokenizer: Arc<dyn Tokenizer>,
    assembler: ContextAssembler,
    retry: RetryPolicy,
}

impl RetrievalCoordinator {
    /// Create a new [`RetrievalCoordinatorBuilder`].
    pub fn builder() -> RetrievalCoordinatorBuilder {
        RetrievalCoordinatorBuilder::default()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Return the tokenizer used for context budgets.
    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    /// Create the vector collection with the embedder's dimensionality.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreUnavailable`] if the index cannot be reached
    /// or already holds vectors of a different dimensionality.
    pub async fn initialize(&self) -> Result<()> {
        let dimensions = self.embedding_provider.dimensions();
        self.retry
            .run(Dependency::VectorIndex, "ensure_collection", || {
                self.vector_index.ensure_collection(dimensions)
            })
            .await
            .inspect_err(|e| error!(dimensions, error = %e, "failed to initialize vector collection"))
    }

    /// Ingest a document: store → chunk → embed → index.
    ///
    /// Returns the id assigned to the new document.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidMetadata`] before any I/O if the metadata is invalid.
    /// - [`RagError::StoreUnavailable`] if either store fails after retries.
    /// - [`RagError::EmbeddingFailure`] if any chunk cannot be embedded after
    ///   retries; no partially embedded document is left behind.
    pub async fn add_document(&self, content: &str, metadata: Metadata) -> Result<String> {
        validate_metadata(&metadata)?;
        let document = Document::new(content, metadata);

        if let Err(e) = self
            .retry
            .run(Dependency::DocumentStore, "put", || self.document_store.put(&document))
            .await
        {
            error!(document.id = %document.id, error = %e, "failed to persist document");
            // The last attempt may have landed before its acknowledgement was lost.
            if let Err(cleanup) = self.document_store.delete(&document.id).await {
                debug!(document.id = %document.id, error = %cleanup, "cleanup after failed put also failed");
            }
            return Err(e);
        }

        let chunks = self.chunker.chunk(&document.id, &document.content);
        if chunks.is_empty() {
            info!(document.id = %document.id, chunk_count = 0, "ingested document (empty)");
            return Ok(document.id);
        }

        if let Err(e) = self.index_chunks(&chunks, &document.metadata).await {
            error!(document.id = %document.id, error = %e, "ingest failed, rolling back");
            self.compensate(&document.id).await;
            return Err(e);
        }

        info!(document.id = %document.id, chunk_count = chunks.len(), "ingested document");
        Ok(document.id)
    }

    async fn index_chunks(&self, chunks: &[Chunk], metadata: &Metadata) -> Result<Vec<String>> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let texts = texts.as_slice();
        let embeddings = self
            .retry
            .run(Dependency::Embedder, "embed_batch", || async move {
                let embeddings = self.embedding_provider.embed_batch(texts).await?;
                self.check_embeddings(&embeddings, texts.len())?;
                Ok(embeddings)
            })
            .await?;

        let model_id = self.embedding_provider.model_id();
        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| {
                EmbeddingRecord::new(
                    vector,
                    ChunkPayload {
                        document_id: chunk.document_id.clone(),
                        chunk_index: chunk.index,
                        text: chunk.text.clone(),
                        metadata: metadata.clone(),
                        embedding_model: model_id.to_string(),
                    },
                )
            })
            .collect();

        self.retry.run(Dependency::VectorIndex, "upsert", || self.vector_index.upsert(&records)).await
    }

    /// Reject embedder output that is the wrong shape, so it is retried
    /// rather than written to the index.
    fn check_embeddings(&self, embeddings: &[Vec<f32>], expected: usize) -> Result<()> {
        let provider = self.embedding_provider.model_id();
        if embeddings.len() != expected {
            return Err(RagError::embedding(
                provider,
                format!("expected {expected} embeddings, got {}", embeddings.len()),
            ));
        }
        let dimensions = self.embedding_provider.dimensions();
        if let Some((i, bad)) = embeddings
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != dimensions || v.iter().any(|x| !x.is_finite()))
        {
            return Err(RagError::embedding(
                provider,
                format!(
                    "embedding {i} is malformed ({} values, expected {dimensions} finite values)",
                    bad.len()
                ),
            ));
        }
        Ok(())
    }

    /// Undo a half-finished ingest. Failures here are logged, not returned;
    /// the caller reports the error that caused the rollback.
    async fn compensate(&self, document_id: &str) {
        if let Err(e) = self.vector_index.delete_by_document(document_id).await {
            error!(document.id = %document_id, error = %e, "failed to remove vector records during rollback");
        }
        if let Err(e) = self.document_store.delete(document_id).await {
            error!(document.id = %document_id, error = %e, "failed to remove document during rollback");
        }
    }

    /// Query for the chunks most similar to `query`.
    ///
    /// `top_k` overrides the configured default. Results are ordered by
    /// descending score and all score at least the configured threshold; an
    /// empty result means nothing relevant was found. Results embedded by a
    /// different model than the current provider are dropped.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if `top_k` is `Some(0)`.
    /// - [`RagError::EmbeddingFailure`] or [`RagError::StoreUnavailable`] if
    ///   the query cannot be embedded or searched after retries.
    pub async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<Vec<SearchResult>> {
        let top_k = top_k.unwrap_or(self.config.top_k);
        if top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }

        let query_embedding = self
            .retry
            .run(Dependency::Embedder, "embed", || async move {
                let embedding = self.embedding_provider.embed(query).await?;
                self.check_embeddings(std::slice::from_ref(&embedding), 1)?;
                Ok(embedding)
            })
            .await
            .inspect_err(|e| error!(error = %e, "embedding failed during query"))?;

        let threshold = self.config.score_threshold;
        let results = self
            .retry
            .run(Dependency::VectorIndex, "search", || {
                self.vector_index.search(&query_embedding, top_k, threshold)
            })
            .await
            .inspect_err(|e| error!(error = %e, "vector index search failed"))?;

        let model_id = self.embedding_provider.model_id();
        let mut filtered: Vec<SearchResult> = results
            .into_iter()
            .filter(|r| r.score >= threshold)
            .filter(|r| {
                let current = r.payload.embedding_model == model_id;
                if !current {
                    warn!(
                        document.id = %r.payload.document_id,
                        chunk_index = r.payload.chunk_index,
                        stored_model = %r.payload.embedding_model,
                        query_model = model_id,
                        "skipping result embedded by a different model"
                    );
                }
                current
            })
            .collect();
        filtered.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        filtered.truncate(top_k);

        info!(top_k, result_count = filtered.len(), "query completed");
        Ok(filtered)
    }

    /// Join ranked results into a context that fits the token budget.
    ///
    /// Empty results produce empty text.
    pub fn build_context(&self, results: &[SearchResult]) -> Result<String> {
        self.assembler.build_context(results)
    }

    /// [`retrieve`](Self::retrieve) followed by [`build_context`](Self::build_context).
    pub async fn retrieve_context(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<RetrievedContext> {
        let sources = self.retrieve(query, top_k).await?;
        let context = self.build_context(&sources)?;
        debug!(
            source_count = sources.len(),
            context_len = context.len(),
            max_tokens = self.assembler.max_tokens(),
            "assembled context"
        );
        Ok(RetrievedContext { context, sources })
    }

    /// Fetch a stored document.
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.retry.run(Dependency::DocumentStore, "get", || self.document_store.get(id)).await
    }

    /// All stored documents, oldest first.
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.retry.run(Dependency::DocumentStore, "list", || self.document_store.list()).await
    }

    /// Delete a document and all of its vector records.
    ///
    /// Vector records go first, so a failure never leaves searchable chunks
    /// pointing at a missing document. Unknown ids are not an error.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        self.retry
            .run(Dependency::VectorIndex, "delete_by_document", || {
                self.vector_index.delete_by_document(id)
            })
            .await
            .inspect_err(|e| error!(document.id = %id, error = %e, "failed to delete vector records"))?;
        self.retry
            .run(Dependency::DocumentStore, "delete", || self.document_store.delete(id))
            .await
            .inspect_err(|e| error!(document.id = %id, error = %e, "failed to delete document"))?;
        info!(document.id = %id, "deleted document");
        Ok(())
    }

    /// Rebuild the vector records of a stored document from its content,
    /// using the current chunker and embedding provider.
    ///
    /// Existing records for the document are removed first, so records left
    /// by another embedding model, or by an interrupted ingest, are replaced.
    /// Returns the number of chunks indexed. The document itself is never
    /// modified; if embedding fails the document is left without vectors
    /// and can be reindexed again.
    ///
    /// # Errors
    ///
    /// - [`RagError::DocumentNotFound`] if no document has this id.
    /// - [`RagError::EmbeddingFailure`] or [`RagError::StoreUnavailable`] after retries.
    pub async fn reindex_document(&self, id: &str) -> Result<usize> {
        let document =
            self.get_document(id).await?.ok_or_else(|| RagError::DocumentNotFound(id.to_string()))?;
        self.reindex(&document).await
    }

    /// Reindex every stored document.
    ///
    /// A failure on one document is logged and recorded in the report; the
    /// remaining documents are still processed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the documents cannot be listed.
    pub async fn reindex_all(&self) -> Result<ReindexReport> {
        let documents = self.list_documents().await?;
        let mut report = ReindexReport::default();
        for document in &documents {
            match self.reindex(document).await {
                Ok(chunks) => {
                    report.documents += 1;
                    report.chunks += chunks;
                }
                Err(e) => {
                    error!(document.id = %document.id, error = %e, "failed to reindex document");
                    report.failed.push(document.id.clone());
                }
            }
        }
        info!(
            documents = report.documents,
            chunks = report.chunks,
            failed = report.failed.len(),
            "reindex completed"
        );
        Ok(report)
    }

    async fn reindex(&self, document: &Document) -> Result<usize> {
        self.retry
            .run(Dependency::VectorIndex, "delete_by_document", || {
                self.vector_index.delete_by_document(&document.id)
            })
            .await?;

        let chunks = self.chunker.chunk(&document.id, &document.content);
        if !chunks.is_empty() {
            self.index_chunks(&chunks, &document.metadata).await?;
        }
        debug!(document.id = %document.id, chunk_count = chunks.len(), "reindexed document");
        Ok(chunks.len())
    }
}

/// Outcome of [`RetrievalCoordinator::reindex_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    /// Documents whose records were rebuilt.
    pub documents: usize,
    /// Chunks written across those documents.
    pub chunks: usize,
    /// Ids of documents that could not be reindexed.
    pub failed: Vec<String>,
}

/// Builder for constructing a [`RetrievalCoordinator`].
///
/// The document store, vector index and embedding provider are required. The
/// configuration defaults to [`RetrievalConfig::default()`], the chunker to a
/// [`WordWindowChunker`] sized from the configuration, and the tokenizer to
/// tiktoken's `cl100k_base`.
///
/// # Example
///
/// ```rust,ignore
/// let coordinator = RetrievalCoordinator::builder()
///     .config(RetrievalConfig::from_env()?)
///     .document_store(Arc::new(store))
///     .vector_index(Arc::new(index))
///     .embedding_provider(Arc::new(embedder))
///     .tokenizer(Arc::new(TiktokenTokenizer::for_model("gpt-4o")?))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RetrievalCoordinatorBuilder {
    config: Option<RetrievalConfig>,
    document_store: Option<Arc<dyn DocumentStore>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
}

impl RetrievalCoordinatorBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document store.
    pub fn document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.document_store = Some(store);
        self
    }

    /// Set the vector index.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Set the embedding provider used for both ingest and query.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Replace the default word-window chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Replace the default tiktoken tokenizer.
    pub fn tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Build the [`RetrievalCoordinator`], validating the configuration and
    /// that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the configuration is invalid or a
    /// required field is missing.
    pub fn build(self) -> Result<RetrievalCoordinator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let document_store = self
            .document_store
            .ok_or_else(|| RagError::ConfigError("document_store is required".to_string()))?;
        let vector_index = self
            .vector_index
            .ok_or_else(|| RagError::ConfigError("vector_index is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        if embedding_provider.dimensions() == 0 {
            return Err(RagError::ConfigError(
                "embedding provider reports zero dimensions".to_string(),
            ));
        }

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(WordWindowChunker::new(config.chunk_size, config.chunk_overlap)?),
        };
        let tokenizer = match self.tokenizer {
            Some(tokenizer) => tokenizer,
            None => Arc::new(TiktokenTokenizer::cl100k()?),
        };
        let assembler = ContextAssembler::new(
            tokenizer.clone(),
            config.max_context_tokens,
            config.context_truncation,
        );
        let retry = RetryPolicy::from(&config.retry);

        Ok(RetrievalCoordinator {
            config,
            document_store,
            vector_index,
            embedding_provider,
            chunker,
            tokenizer,
            assembler,
            retry,
        })
    }
}
