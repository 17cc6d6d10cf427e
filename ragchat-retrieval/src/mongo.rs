//! MongoDB document store backend.
//!
//! This module is only available when the `mongodb` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_retrieval::mongo::MongoDocumentStore;
//!
//! let store = MongoDocumentStore::connect("mongodb://localhost:27017/", "rag_chatbot").await?;
//! store.put(&Document::new("some text", Metadata::new())).await?;
//! ```

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Client, Collection, IndexModel};
use tracing::debug;

use crate::docstore::DocumentStore;
use crate::document::Document;
use crate::error::{RagError, Result};

const BACKEND: &str = "mongodb";

/// The collection documents are stored in.
pub const DOCUMENTS_COLLECTION: &str = "documents";

/// A [`DocumentStore`] backed by a MongoDB collection.
///
/// Documents are looked up by their own `id` field rather than Mongo's `_id`.
pub struct MongoDocumentStore {
    documents: Collection<Document>,
}

impl MongoDocumentStore {
    /// Connect to `uri` and use the `documents` collection of `database`.
    ///
    /// Creates the indexes on `id` and `created_at` if they do not exist.
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await.map_err(Self::map_err)?;
        let store = Self::from_client(&client, database);
        store.create_indexes().await?;
        Ok(store)
    }

    /// Connect using `MONGODB_URI` (default `mongodb://localhost:27017/`) and
    /// `MONGODB_DB_NAME` (default `rag_chatbot`).
    pub async fn from_env() -> Result<Self> {
        let uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/".to_string());
        let database =
            std::env::var("MONGODB_DB_NAME").unwrap_or_else(|_| "rag_chatbot".to_string());
        Self::connect(&uri, &database).await
    }

    /// Use an existing client. Indexes are not created.
    pub fn from_client(client: &Client, database: &str) -> Self {
        Self { documents: client.database(database).collection(DOCUMENTS_COLLECTION) }
    }

    async fn create_indexes(&self) -> Result<()> {
        let by_id = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(mongodb::options::IndexOptions::builder().unique(true).build())
            .build();
        let by_created = IndexModel::builder().keys(doc! { "created_at": 1 }).build();
        self.documents.create_indexes([by_id, by_created]).await.map_err(Self::map_err)?;
        Ok(())
    }

    fn map_err(e: mongodb::error::Error) -> RagError {
        RagError::store(BACKEND, e.to_string())
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn put(&self, document: &Document) -> Result<()> {
        // Upsert on `id` so a retried write does not trip the unique index.
        self.documents
            .replace_one(doc! { "id": &document.id }, document)
            .upsert(true)
            .await
            .map_err(Self::map_err)?;
        debug!(document.id = %document.id, "stored document in mongodb");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        self.documents.find_one(doc! { "id": id }).await.map_err(Self::map_err)
    }

    async fn list(&self) -> Result<Vec<Document>> {
        let cursor = self.documents.find(doc! {}).await.map_err(Self::map_err)?;
        let mut documents: Vec<Document> = cursor.try_collect().await.map_err(Self::map_err)?;
        // `created_at` is stored as an RFC 3339 string, which does not sort
        // lexically when fractional seconds differ in length.
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(documents)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = self.documents.delete_one(doc! { "id": id }).await.map_err(Self::map_err)?;
        debug!(document.id = id, deleted = result.deleted_count, "deleted document from mongodb");
        Ok(())
    }
}
