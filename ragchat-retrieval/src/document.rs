//! Data types for documents, chunks, embedding records, and search results.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RagError, Result};

/// Namespace for chunk record ids derived from `(document_id, chunk_index)`.
const CHUNK_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d1f_4c2a_9b7e_4f0a_8e35_2c91_d4a7_b063);

/// A scalar metadata value.
///
/// Metadata is flat: nested objects, arrays and nulls are
/// rejected when parsing from JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Document metadata: string keys mapped to scalar values.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Parse loosely-typed JSON metadata into [`Metadata`].
///
/// `null` is treated as empty metadata. Anything other than a flat object of
/// strings, numbers and booleans is rejected.
///
/// # Errors
///
/// Returns [`RagError::InvalidMetadata`] naming the offending key.
pub fn metadata_from_json(value: serde_json::Value) -> Result<Metadata> {
    let object = match value {
        serde_json::Value::Null => return Ok(Metadata::new()),
        serde_json::Value::Object(object) => object,
        other => {
            return Err(RagError::InvalidMetadata(format!(
                "expected an object, got {}",
                json_kind(&other)
            )));
        }
    };

    let mut metadata = Metadata::new();
    for (key, value) in object {
        let value = match value {
            serde_json::Value::Bool(b) => MetadataValue::Bool(b),
            serde_json::Value::String(s) => MetadataValue::String(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => MetadataValue::Integer(i),
                None => MetadataValue::Float(n.as_f64().ok_or_else(|| {
                    RagError::InvalidMetadata(format!("key '{key}': number out of range"))
                })?),
            },
            other => {
                return Err(RagError::InvalidMetadata(format!(
                    "key '{key}': expected a string, number or boolean, got {}",
                    json_kind(&other)
                )));
            }
        };
        metadata.insert(key, value);
    }
    validate_metadata(&metadata)?;
    Ok(metadata)
}

/// Check metadata before it is persisted or copied into vector payloads.
///
/// # Errors
///
/// Returns [`RagError::InvalidMetadata`] for empty keys or non-finite floats.
pub fn validate_metadata(metadata: &Metadata) -> Result<()> {
    for (key, value) in metadata {
        if key.trim().is_empty() {
            return Err(RagError::InvalidMetadata("metadata keys must not be empty".to_string()));
        }
        if let MetadataValue::Float(x) = value {
            if !x.is_finite() {
                return Err(RagError::InvalidMetadata(format!("key '{key}': {x} is not finite")));
            }
        }
    }
    Ok(())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// A stored source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier, assigned before the document is first written.
    pub id: String,
    /// The raw text content.
    pub content: String,
    /// Scalar metadata supplied at ingest.
    #[serde(default)]
    pub metadata: Metadata,
    /// When the document was stored.
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// A new document with a fresh random id, timestamped now.
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// A word-window slice of a [`Document`]'s content.
///
/// Chunks only live for the duration of an ingest; downstream they exist as
/// [`ChunkPayload`]s in the vector index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// 0-based position within the document.
    pub index: usize,
    /// The chunk's words joined by single spaces.
    pub text: String,
}

/// The payload stored next to each chunk vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkPayload {
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Ordinal of the chunk within its document.
    pub chunk_index: usize,
    /// The chunk text.
    pub text: String,
    /// A copy of the parent document's metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Identifier of the embedding model that produced the vector.
    pub embedding_model: String,
}

/// A vector and its payload, as written to the vector index.
///
/// The id is a function of the payload's document id and chunk index, so
/// writing the same chunk twice replaces the earlier record.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    /// Record id (a UUID string), see [`EmbeddingRecord::chunk_id`].
    pub id: String,
    /// The chunk embedding.
    pub vector: Vec<f32>,
    /// What the vector represents.
    pub payload: ChunkPayload,
}

impl EmbeddingRecord {
    /// Build a record whose id is derived from the payload.
    pub fn new(vector: Vec<f32>, payload: ChunkPayload) -> Self {
        let id = Self::chunk_id(&payload.document_id, payload.chunk_index);
        Self { id, vector, payload }
    }

    /// The UUIDv5 record id of chunk `chunk_index` of `document_id`.
    pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
        let name = format!("{document_id}/{chunk_index}");
        Uuid::new_v5(&CHUNK_ID_NAMESPACE, name.as_bytes()).to_string()
    }
}

/// A retrieved chunk paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The vector index's identifier for the record.
    pub id: String,
    /// The similarity score (higher is more relevant).
    pub score: f32,
    /// The stored payload.
    pub payload: ChunkPayload,
}
