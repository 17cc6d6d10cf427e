//! In-memory document store and vector index.
//!
//! [`InMemoryVectorIndex`] scores by cosine similarity over a `HashMap`, and
//! [`InMemoryDocumentStore`] keeps documents in a `HashMap`; both are guarded
//! by a `tokio::sync::RwLock`. They are suitable for development, testing and
//! small-scale use.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::docstore::DocumentStore;
use crate::document::{ChunkPayload, Document, EmbeddingRecord, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorIndex;

const INDEX_BACKEND: &str = "in-memory index";
const STORE_BACKEND: &str = "in-memory store";

#[derive(Debug, Clone)]
struct StoredPoint {
    vector: Vec<f32>,
    payload: ChunkPayload,
}

#[derive(Debug, Default)]
struct Collection {
    dimensions: Option<usize>,
    points: HashMap<String, StoredPoint>,
}

/// An in-memory [`VectorIndex`] using cosine similarity for search.
///
/// [`ensure_collection`](VectorIndex::ensure_collection) must be called before
/// the first upsert; afterwards every vector must have the collection's
/// dimensionality.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_retrieval::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.ensure_collection(384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    collection: RwLock<Collection>,
}

impl InMemoryVectorIndex {
    /// Create a new empty in-memory vector index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.collection.read().await.points.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Payloads of every stored record, in no particular order.
    pub async fn payloads(&self) -> Vec<ChunkPayload> {
        self.collection.read().await.points.values().map(|p| p.payload.clone()).collect()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        let mut collection = self.collection.write().await;
        match collection.dimensions {
            None => {
                collection.dimensions = Some(dimensions);
                Ok(())
            }
            Some(existing) if existing == dimensions => Ok(()),
            Some(existing) => Err(RagError::store(
                INDEX_BACKEND,
                format!("collection exists with {existing} dimensions, requested {dimensions}"),
            )),
        }
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<Vec<String>> {
        let mut collection = self.collection.write().await;
        let dimensions = collection
            .dimensions
            .ok_or_else(|| RagError::store(INDEX_BACKEND, "collection has not been created"))?;

        // Validate the whole batch before writing any of it.
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimensions) {
            return Err(RagError::store(
                INDEX_BACKEND,
                format!(
                    "vector for chunk {} of document '{}' has {} dimensions, expected {dimensions}",
                    bad.payload.chunk_index,
                    bad.payload.document_id,
                    bad.vector.len()
                ),
            ));
        }

        for record in records {
            collection.points.insert(
                record.id.clone(),
                StoredPoint { vector: record.vector.clone(), payload: record.payload.clone() },
            );
        }
        Ok(records.iter().map(|r| r.id.clone()).collect())
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let collection = self.collection.read().await;
        if let Some(dimensions) = collection.dimensions {
            if embedding.len() != dimensions {
                return Err(RagError::store(
                    INDEX_BACKEND,
                    format!(
                        "query vector has {} dimensions, expected {dimensions}",
                        embedding.len()
                    ),
                ));
            }
        }

        let mut scored: Vec<SearchResult> = collection
            .points
            .iter()
            .map(|(id, point)| SearchResult {
                id: id.clone(),
                score: cosine_similarity(&point.vector, embedding),
                payload: point.payload.clone(),
            })
            .filter(|r| r.score >= score_threshold)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete(&self, ids: &[&str]) -> Result<()> {
        let mut collection = self.collection.write().await;
        for id in ids {
            collection.points.remove(*id);
        }
        Ok(())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<()> {
        let mut collection = self.collection.write().await;
        collection.points.retain(|_, point| point.payload.document_id != document_id);
        Ok(())
    }
}

/// An in-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(&self, document: &Document) -> Result<()> {
        self.documents.write().await.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Document>> {
        let mut documents: Vec<Document> =
            self.documents.read().await.values().cloned().collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(documents)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if self.documents.write().await.remove(id).is_none() {
            tracing::debug!(backend = STORE_BACKEND, document.id = id, "delete of unknown document");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    fn record(document_id: &str, chunk_index: usize, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord::new(
            vector,
            ChunkPayload {
                document_id: document_id.into(),
                chunk_index,
                text: format!("chunk {chunk_index}"),
                metadata: Metadata::new(),
                embedding_model: "test".into(),
            },
        )
    }

    #[tokio::test]
    async fn upserting_the_same_chunk_twice_keeps_one_record() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection(2).await.unwrap();

        let first = index.upsert(&[record("doc", 0, vec![1.0, 0.0])]).await.unwrap();
        let second = index.upsert(&[record("doc", 0, vec![0.0, 1.0])]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(index.len().await, 1);
        let hits = index.search(&[0.0, 1.0], 5, 0.9).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, first[0]);
    }

    #[tokio::test]
    async fn putting_a_document_twice_keeps_one_copy() {
        let store = InMemoryDocumentStore::new();
        let document = Document::new("hello", Metadata::new());

        store.put(&document).await.unwrap();
        store.put(&document).await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec![document.clone()]);
        assert_eq!(store.get(&document.id).await.unwrap(), Some(document));
    }
}
