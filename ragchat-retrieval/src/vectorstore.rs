//! Vector index trait for storing and searching chunk embeddings.

use async_trait::async_trait;

use crate::document::{EmbeddingRecord, SearchResult};
use crate::error::Result;

/// A nearest-neighbour index over chunk embeddings.
///
/// Each implementation manages one logical collection in which every vector
/// has the same dimensionality. Record ids are generated by the index and are
/// unrelated to document ids.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_retrieval::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.ensure_collection(384).await?;
/// let ids = index.upsert(&records).await?;
/// let results = index.search(&query_embedding, 5, 0.7).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection for vectors of `dimensions` length.
    /// No-op if it already exists.
    async fn ensure_collection(&self, dimensions: usize) -> Result<()>;

    /// Write records in one logical batch, returning the generated id of
    /// each record in input order.
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<Vec<String>>;

    /// Return at most `limit` records scoring at least `score_threshold`,
    /// ordered by descending similarity.
    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[&str]) -> Result<()>;

    /// Delete every record whose payload belongs to `document_id`.
    async fn delete_by_document(&self, document_id: &str) -> Result<()>;
}
