//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ragchat_retrieval::{
    Document, DocumentStore, EmbeddingProvider, EmbeddingRecord, InMemoryDocumentStore,
    InMemoryVectorIndex, RagError, Result, RetrievalConfig, RetrievalCoordinator,
    RetryConfig, SearchResult, VectorIndex,
};

/// Deterministic bag-of-words embedder: every lowercased word adds ±1 to one
/// FNV-hashed bucket, and the vector is L2-normalized. Identical word bags
/// map to identical vectors.
pub struct HashEmbedder {
    dimensions: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self::with_model(dimensions, "hash-embedder-v1")
    }

    pub fn with_model(dimensions: usize, model: &str) -> Self {
        Self { dimensions, model: model.to_string() }
    }

    fn fnv1a(word: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for word in text.split_whitespace() {
            let hash = Self::fnv1a(&word.to_lowercase());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        } else {
            // Blank text still has to be a valid, finite vector.
            v[0] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Embedder with hand-picked vectors per text; unknown text maps to `fallback`.
pub struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

impl TableEmbedder {
    pub fn new(entries: &[(&str, Vec<f32>)], fallback: Vec<f32>) -> Self {
        let table = entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        Self { table, fallback }
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.table.get(text).cloned().unwrap_or_else(|| self.fallback.clone()))
    }

    fn dimensions(&self) -> usize {
        self.fallback.len()
    }

    fn model_id(&self) -> &str {
        "table-embedder"
    }
}

/// Fails the first `failures` batch calls, then delegates to a [`HashEmbedder`].
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    failures: u32,
    pub calls: AtomicU32,
}

impl FlakyEmbedder {
    pub fn new(dimensions: usize, failures: u32) -> Self {
        Self { inner: HashEmbedder::new(dimensions), failures, calls: AtomicU32::new(0) }
    }

    /// An embedder that never succeeds.
    pub fn always_failing(dimensions: usize) -> Self {
        Self::new(dimensions, u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn attempt(&self) -> Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(RagError::EmbeddingFailure {
                provider: "flaky".into(),
                message: "503 service unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.attempt()?;
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.attempt()?;
        Ok(texts.iter().map(|t| self.inner.vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// A document store whose writes always fail.
#[derive(Default)]
pub struct UnavailableDocumentStore {
    pub puts: AtomicU32,
}

impl UnavailableDocumentStore {
    fn down() -> RagError {
        RagError::StoreUnavailable { store: "unavailable".into(), message: "connection refused".into() }
    }
}

#[async_trait]
impl DocumentStore for UnavailableDocumentStore {
    async fn put(&self, _document: &Document) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Err(Self::down())
    }

    async fn get(&self, _id: &str) -> Result<Option<Document>> {
        Err(Self::down())
    }

    async fn list(&self) -> Result<Vec<Document>> {
        Err(Self::down())
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        Err(Self::down())
    }
}

/// An in-memory index that can be told to reject upserts.
#[derive(Default)]
pub struct SwitchableIndex {
    pub inner: InMemoryVectorIndex,
    pub fail_upserts: AtomicBool,
    pub upserts: AtomicU32,
}

#[async_trait]
impl VectorIndex for SwitchableIndex {
    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        self.inner.ensure_collection(dimensions).await
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<Vec<String>> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(RagError::StoreUnavailable {
                store: "switchable".into(),
                message: "write rejected".into(),
            });
        }
        self.inner.upsert(records).await
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        self.inner.search(embedding, limit, score_threshold).await
    }

    async fn delete(&self, ids: &[&str]) -> Result<()> {
        self.inner.delete(ids).await
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<()> {
        self.inner.delete_by_document(document_id).await
    }
}

/// How long a write whose acknowledgement is lost keeps the caller waiting.
const LOST_ACK_STALL: Duration = Duration::from_secs(3600);

/// An in-memory index whose first upsert commits and then never answers.
#[derive(Default)]
pub struct LostAckIndex {
    pub inner: InMemoryVectorIndex,
    pub upserts: AtomicU32,
}

#[async_trait]
impl VectorIndex for LostAckIndex {
    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        self.inner.ensure_collection(dimensions).await
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<Vec<String>> {
        let ids = self.inner.upsert(records).await?;
        if self.upserts.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(LOST_ACK_STALL).await;
        }
        Ok(ids)
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        self.inner.search(embedding, limit, score_threshold).await
    }

    async fn delete(&self, ids: &[&str]) -> Result<()> {
        self.inner.delete(ids).await
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<()> {
        self.inner.delete_by_document(document_id).await
    }
}

/// An in-memory document store whose first put commits and then never answers.
#[derive(Default)]
pub struct LostAckDocumentStore {
    pub inner: InMemoryDocumentStore,
    pub puts: AtomicU32,
}

#[async_trait]
impl DocumentStore for LostAckDocumentStore {
    async fn put(&self, document: &Document) -> Result<()> {
        self.inner.put(document).await?;
        if self.puts.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(LOST_ACK_STALL).await;
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Document>> {
        self.inner.list().await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }
}

/// Default configuration with short backoff so retry tests stay quick even
/// without a paused clock.
pub fn test_config() -> RetrievalConfig {
    RetrievalConfig::builder()
        .retry(RetryConfig { max_attempts: 3, initial_backoff_ms: 10, timeout_ms: 1_000 })
        .build()
        .unwrap()
}

pub struct Harness {
    pub coordinator: RetrievalCoordinator,
    pub store: Arc<InMemoryDocumentStore>,
    pub index: Arc<InMemoryVectorIndex>,
}

/// A coordinator over fresh in-memory stores, already initialized.
pub async fn harness(
    config: RetrievalConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Harness {
    let store = Arc::new(InMemoryDocumentStore::new());
    let index = Arc::new(InMemoryVectorIndex::new());
    let coordinator = RetrievalCoordinator::builder()
        .config(config)
        .document_store(store.clone())
        .vector_index(index.clone())
        .embedding_provider(embedder)
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();
    Harness { coordinator, store, index }
}
