//! Document store trait for persisting raw documents.

use async_trait::async_trait;

use crate::document::Document;
use crate::error::Result;

/// A key-value store of raw documents.
///
/// Documents are immutable once stored: they are created, read and deleted,
/// never updated in place. Ids are chosen by the caller.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `document` under its id.
    ///
    /// Must be idempotent: writing the same document again (a retry after a
    /// lost acknowledgement) leaves exactly one copy.
    async fn put(&self, document: &Document) -> Result<()>;

    /// Fetch a document by id.
    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// All documents, oldest first.
    async fn list(&self) -> Result<Vec<Document>>;

    /// Delete a document. Deleting an unknown id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;
}
