//! Retrieval core for a RAG chat backend.
//!
//! Documents are stored, split into overlapping word windows, embedded and
//! indexed; queries are embedded, matched by nearest-neighbour search above a
//! score threshold, and the ranked chunk texts are assembled into a
//! token-budgeted context for a language-model call.
//!
//! The [`RetrievalCoordinator`] drives both paths. Everything it talks to is
//! injected behind a trait:
//!
//! - [`DocumentStore`]: raw documents ([`InMemoryDocumentStore`], or
//!   `mongo::MongoDocumentStore` with the `mongodb` feature)
//! - [`VectorIndex`]: nearest-neighbour search ([`InMemoryVectorIndex`], or
//!   `qdrant::QdrantVectorIndex` with the `qdrant` feature)
//! - [`EmbeddingProvider`]: text to vector (`openai::OpenAIEmbeddingProvider`
//!   with the `openai` feature)
//! - [`Tokenizer`]: token counting and truncation ([`TiktokenTokenizer`], or
//!   `huggingface::HfTokenizer` with the `hf-tokenizer` feature)
//! - [`Chunker`]: document splitting ([`WordWindowChunker`])

pub mod chunking;
pub mod config;
pub mod context;
pub mod docstore;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod pipeline;
pub mod retry;
pub mod tokenizer;
pub mod vectorstore;

#[cfg(feature = "hf-tokenizer")]
pub mod huggingface;
#[cfg(feature = "mongodb")]
pub mod mongo;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use chunking::{Chunker, WordWindowChunker};
pub use config::{ContextTruncation, RetrievalConfig, RetrievalConfigBuilder, RetryConfig};
pub use context::{CHUNK_SEPARATOR, ContextAssembler, RetrievedContext};
pub use docstore::DocumentStore;
pub use document::{
    Chunk, ChunkPayload, Document, EmbeddingRecord, Metadata, MetadataValue, SearchResult,
    metadata_from_json, validate_metadata,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use inmemory::{InMemoryDocumentStore, InMemoryVectorIndex, cosine_similarity};
pub use pipeline::{ReindexReport, RetrievalCoordinator, RetrievalCoordinatorBuilder};
pub use retry::{Dependency, RetryPolicy};
pub use tokenizer::{TiktokenTokenizer, Tokenizer};
pub use vectorstore::VectorIndex;
