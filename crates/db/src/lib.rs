//! Document store used by the shelf services.
//!
//! Storage is modelled as named collections of JSON documents keyed by a
//! string `_id`. [`DocumentStore`] is the backend seam; [`Collection`] layers
//! typed (de)serialization on top of it. Two backends exist: [`MemoryStore`]
//! for local runs and tests, and `MongoStore` behind the `mongo` feature.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod collection;
pub mod filter;
pub mod memory;
#[cfg(feature = "mongo")]
pub mod mongo;
pub mod pipeline;

pub use collection::{from_document, to_document, Collection};
pub use filter::{FindQuery, Filter, SortOrder};
pub use memory::MemoryStore;
pub use pipeline::{Pipeline, Projection, Stage};

/// Name of the identifier field carried by every document.
pub const ID_FIELD: &str = "_id";

/// A stored document: a JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key in `{collection}` violates index `{index}`")]
    Duplicate { collection: String, index: String },

    #[error("document has no string `_id`")]
    MissingId,

    #[error("value is not a JSON object")]
    NotADocument,

    #[error("document (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[cfg(feature = "mongo")]
    #[error("mongodb: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

/// Index definition contributed by a module migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub collection: &'static str,
    pub name: &'static str,
    pub field: &'static str,
    pub unique: bool,
}

impl IndexSpec {
    pub const fn unique(collection: &'static str, name: &'static str, field: &'static str) -> Self {
        Self {
            collection,
            name,
            field,
            unique: true,
        }
    }

    pub const fn lookup(collection: &'static str, name: &'static str, field: &'static str) -> Self {
        Self {
            collection,
            name,
            field,
            unique: false,
        }
    }
}

/// Backend seam for document persistence.
///
/// Implementations must preserve insertion order for unsorted reads and must
/// evaluate a whole [`Pipeline`] against one consistent view of the data.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human readable backend name for logs.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn ensure_index(&self, index: &IndexSpec) -> Result<(), StoreError>;

    /// Insert a document that already carries its `_id`.
    async fn insert(&self, collection: &str, document: Document) -> Result<Document, StoreError>;

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn find_one(&self, collection: &str, filter: &Filter)
        -> Result<Option<Document>, StoreError>;

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Merge `changes` into the first document matching `filter` and return
    /// the updated document, or `None` when nothing matched.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Document,
    ) -> Result<Option<Document>, StoreError>;

    async fn delete_by_id(&self, collection: &str, id: &str)
        -> Result<Option<Document>, StoreError>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, StoreError>;
}

/// Which backend to connect to.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Mongo,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "DatabaseSettings::default_uri")]
    pub uri: String,
    #[serde(default = "DatabaseSettings::default_name")]
    pub name: String,
}

impl DatabaseSettings {
    fn default_uri() -> String {
        "mongodb://127.0.0.1:27017".to_string()
    }

    fn default_name() -> String {
        "shelf".to_string()
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            uri: Self::default_uri(),
            name: Self::default_name(),
        }
    }
}

/// Open the configured backend.
pub async fn connect(settings: &DatabaseSettings) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match settings.backend {
        StoreBackend::Memory => {
            tracing::warn!(
                target: "shelf-db",
                "using in-memory document store; data is lost on restart"
            );
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "mongo")]
        StoreBackend::Mongo => {
            let store = mongo::MongoStore::connect(&settings.uri, &settings.name).await?;
            tracing::info!(target: "shelf-db", database = %settings.name, "connected to mongodb");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongo"))]
        StoreBackend::Mongo => Err(StoreError::Backend(
            "the mongo backend requires building with the `mongo` feature".to_string(),
        )),
    }
}
