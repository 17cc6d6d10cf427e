//! Qdrant vector index backend.
//!
//! Provides [`QdrantVectorIndex`] which implements [`VectorIndex`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_retrieval::qdrant::QdrantVectorIndex;
//!
//! let index = QdrantVectorIndex::new("http://localhost:6334", "chatbot_knowledge")?;
//! index.ensure_collection(1536).await?;
//! let ids = index.upsert(&records).await?;
//! let results = index.search(&query_embedding, 5, 0.7).await?;
//! ```

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CollectionInfo, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::debug;

use crate::document::{ChunkPayload, EmbeddingRecord, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorIndex;

const BACKEND: &str = "qdrant";

/// The collection name used by [`QdrantVectorIndex::from_env`] when
/// `QDRANT_COLLECTION` is unset.
pub const DEFAULT_COLLECTION: &str = "chatbot_knowledge";

/// A [`VectorIndex`] backed by one [Qdrant](https://qdrant.tech/) collection.
///
/// Vectors use cosine distance. Point ids are the records' chunk UUIDs, so
/// re-upserting a chunk overwrites its point. The [`ChunkPayload`] is stored
/// as the point payload, so records can be filtered by `document_id`
/// server-side.
pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorIndex {
    /// Create a new Qdrant index connecting to the given URL.
    pub fn new(url: &str, collection: impl Into<String>) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client, collection: collection.into() })
    }

    /// Create a new Qdrant index from `QDRANT_URL` (default
    /// `http://localhost:6334`) and `QDRANT_COLLECTION`.
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".to_string());
        let collection =
            std::env::var("QDRANT_COLLECTION").unwrap_or_else(|_| DEFAULT_COLLECTION.to_string());
        Self::new(&url, collection)
    }

    /// Create a new Qdrant index from an existing client.
    pub fn from_client(client: Qdrant, collection: impl Into<String>) -> Self {
        Self { client, collection: collection.into() }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::store(BACKEND, e.to_string())
    }

    fn to_payload(payload: &ChunkPayload) -> Result<Payload> {
        let value = serde_json::to_value(payload)
            .map_err(|e| RagError::store(BACKEND, format!("failed to encode payload: {e}")))?;
        Payload::try_from(value)
            .map_err(|e| RagError::store(BACKEND, format!("failed to encode payload: {e}")))
    }

    fn from_payload(
        payload: std::collections::HashMap<String, QdrantValue>,
    ) -> Result<ChunkPayload> {
        let object: serde_json::Map<String, serde_json::Value> =
            payload.iter().map(|(k, v)| (k.clone(), to_json(v))).collect();
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| RagError::store(BACKEND, format!("malformed point payload: {e}")))
    }
}

/// The single unnamed vector size of a collection, if it has one.
fn vector_size(info: &CollectionInfo) -> Option<u64> {
    let vectors = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match vectors.config.as_ref()? {
        VectorsConfigKind::Params(params) => Some(params.size),
        VectorsConfigKind::ParamsMap(_) => None,
    }
}

fn check_dimensions(collection: &str, info: &CollectionInfo, dimensions: usize) -> Result<()> {
    match vector_size(info) {
        Some(size) if size == dimensions as u64 => Ok(()),
        Some(size) => Err(RagError::store(
            BACKEND,
            format!("collection '{collection}' has {size} dimensions, requested {dimensions}"),
        )),
        None => Err(RagError::store(
            BACKEND,
            format!("collection '{collection}' does not have a single unnamed vector"),
        )),
    }
}

/// Convert a Qdrant payload value into JSON.
fn to_json(value: &QdrantValue) -> serde_json::Value {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(*i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(to_json).collect())
        }
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields.iter().map(|(k, v)| (k.clone(), to_json(v))).collect(),
        ),
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        let collections = self.client.list_collections().await.map_err(Self::map_err)?;
        let exists = collections.collections.iter().any(|c| c.name == self.collection);
        if exists {
            let info = self
                .client
                .collection_info(self.collection.as_str())
                .await
                .map_err(Self::map_err)?
                .result
                .ok_or_else(|| RagError::store(BACKEND, "collection info missing from response"))?;
            check_dimensions(&self.collection, &info, dimensions)?;
            debug!(collection = %self.collection, dimensions, "qdrant collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<Vec<String>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let points = records
            .iter()
            .map(|record| {
                Ok(PointStruct::new(
                    record.id.clone(),
                    record.vector.clone(),
                    Self::to_payload(&record.payload)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = records.len(), "upserted points to qdrant");
        Ok(records.iter().map(|r| r.id.clone()).collect())
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, embedding.to_vec(), limit as u64)
                    .score_threshold(score_threshold)
                    .with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        response
            .result
            .into_iter()
            .map(|scored| {
                let id = scored
                    .id
                    .as_ref()
                    .and_then(|pid| match &pid.point_id_options {
                        Some(PointIdOptions::Uuid(s)) => Some(s.clone()),
                        Some(PointIdOptions::Num(n)) => Some(n.to_string()),
                        None => None,
                    })
                    .unwrap_or_default();
                let payload = Self::from_payload(scored.payload)?;
                Ok(SearchResult { id, score: scored.score, payload })
            })
            .collect()
    }

    async fn delete(&self, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<qdrant_client::qdrant::PointId> =
            ids.iter().map(|id| (*id).into()).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = ids.len(), "deleted points from qdrant");
        Ok(())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Filter::must([Condition::matches(
                        "document_id",
                        document_id.to_string(),
                    )]))
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, document.id = document_id, "deleted document points from qdrant");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use qdrant_client::qdrant::{
        CollectionConfig, CollectionParams, VectorParams, VectorParamsMap, VectorsConfig,
    };

    use super::*;
    use crate::document::{Metadata, MetadataValue};

    fn info_with(vectors: VectorsConfigKind) -> CollectionInfo {
        CollectionInfo {
            config: Some(CollectionConfig {
                params: Some(CollectionParams {
                    vectors_config: Some(VectorsConfig { config: Some(vectors) }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn single(size: u64) -> VectorsConfigKind {
        VectorsConfigKind::Params(VectorParams {
            size,
            distance: Distance::Cosine as i32,
            ..Default::default()
        })
    }

    #[test]
    fn existing_collection_must_match_dimensions() {
        assert!(check_dimensions("kb", &info_with(single(1536)), 1536).is_ok());

        let err = check_dimensions("kb", &info_with(single(384)), 1536).unwrap_err();
        assert!(matches!(err, RagError::StoreUnavailable { ref message, .. } if message.contains("384")));

        let named = VectorsConfigKind::ParamsMap(VectorParamsMap { map: Default::default() });
        assert!(check_dimensions("kb", &info_with(named), 1536).is_err());
        assert!(check_dimensions("kb", &CollectionInfo::default(), 1536).is_err());
    }

    #[test]
    fn payload_survives_the_qdrant_value_conversion() {
        let payload = ChunkPayload {
            document_id: "doc-1".into(),
            chunk_index: 4,
            text: "chunk text".into(),
            metadata: Metadata::from([
                ("source".to_string(), MetadataValue::from("faq.md")),
                ("page".to_string(), MetadataValue::from(12i64)),
                ("weight".to_string(), MetadataValue::from(0.25)),
                ("public".to_string(), MetadataValue::from(true)),
            ]),
            embedding_model: "text-embedding-3-small".into(),
        };
        let encoded: HashMap<String, QdrantValue> =
            QdrantVectorIndex::to_payload(&payload).unwrap().into();
        let decoded = QdrantVectorIndex::from_payload(encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn payload_without_required_fields_is_rejected() {
        let encoded = HashMap::from([("text".to_string(), QdrantValue::from("orphan"))]);
        let err = QdrantVectorIndex::from_payload(encoded).unwrap_err();
        assert!(matches!(err, RagError::StoreUnavailable { .. }));
    }
}
