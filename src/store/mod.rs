//! The remote document store as seen by the sync engine.
//!
//! Every call resolves to `Ok` or one of four error kinds. Implementations
//! decide the kind; callers only ever match on it.

mod appwrite;
mod memory;

pub use appwrite::AppwriteStore;
pub use memory::{MemoryStore, StoreStats};

use crate::schema::{AttributeDefinition, IndexDefinition};
use async_trait::async_trait;
use thiserror::Error;

/// Field payload of one stored document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The thing being created is already there. Callers treat this as success.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Availability fault worth retrying (5xx, throttling, connection reset).
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("store request failed: {0}")]
    Fatal(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentPage {
    pub documents: Vec<StoredDocument>,
    /// Id of the last document, to pass as the next cursor; `None` on an empty page.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub id: String,
    pub name: String,
    /// Keys of the attributes the store currently reports.
    pub attributes: Vec<String>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_database(&self, database: &str) -> StoreResult<()>;

    async fn create_database(&self, database: &str, name: &str) -> StoreResult<()>;

    async fn get_collection(&self, database: &str, collection: &str)
        -> StoreResult<CollectionInfo>;

    async fn create_collection(
        &self,
        database: &str,
        collection: &str,
        name: &str,
    ) -> StoreResult<()>;

    async fn delete_collection(&self, database: &str, collection: &str) -> StoreResult<()>;

    async fn create_attribute(
        &self,
        database: &str,
        collection: &str,
        attribute: &AttributeDefinition,
    ) -> StoreResult<()>;

    async fn delete_attribute(&self, database: &str, collection: &str, key: &str)
        -> StoreResult<()>;

    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        index: &IndexDefinition,
    ) -> StoreResult<()>;

    /// Up to `limit` documents strictly after `cursor` (a document id).
    async fn list_documents(
        &self,
        database: &str,
        collection: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<DocumentPage>;

    async fn create_document(
        &self,
        database: &str,
        collection: &str,
        document_id: &str,
        fields: &Fields,
    ) -> StoreResult<()>;

    async fn delete_document(&self, database: &str, collection: &str, document_id: &str)
        -> StoreResult<()>;
}

/// Fresh store-side document id (32 lowercase hex chars).
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
