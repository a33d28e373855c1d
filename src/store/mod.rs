//! Vector store gateway used by the ingestion and answer pipelines.
//!
//! Callers hand the gateway plain text; embedding and similarity ranking happen behind the
//! [`VectorStore`] trait. [`QdrantVectorStore`] is the production implementation.

mod qdrant;

pub use qdrant::QdrantVectorStore;

use crate::embedding::EmbeddingClientError;
use crate::qdrant::QdrantError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised by vector store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected the request or could not be reached.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Text could not be embedded.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// `add` received sequences of different lengths.
    #[error(
        "documents ({documents}), metadatas ({metadatas}) and ids ({ids}) must have the same length"
    )]
    LengthMismatch {
        /// Number of documents supplied.
        documents: usize,
        /// Number of metadata maps supplied.
        metadatas: usize,
        /// Number of ids supplied.
        ids: usize,
    },
    /// Collection name outside the accepted character set or length.
    #[error(
        "Invalid collection name '{0}': use 3-63 characters from letters, digits, '_' and '-'"
    )]
    InvalidCollectionName(String),
    /// Embedding provider produced vectors of an unexpected size.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for collections.
        expected: usize,
        /// Dimension returned by the provider.
        actual: usize,
    },
}

/// Handle to a collection returned by [`VectorStore::get_or_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    name: String,
}

impl CollectionHandle {
    /// Wrap an existing collection name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One ranked result of a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    /// Caller-supplied id the chunk was added with.
    pub id: String,
    /// Stored chunk text.
    pub document: String,
    /// Metadata stored with the chunk.
    pub metadata: Map<String, Value>,
    /// Similarity score reported by the store; higher is closer.
    pub score: f32,
}

/// Persistent vector database holding named collections of text chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return a handle to `name`, creating the collection when it does not exist.
    async fn get_or_create(&self, name: &str) -> Result<CollectionHandle, StoreError>;

    /// Store `documents` with their metadata under the given ids.
    ///
    /// Re-adding an existing id overwrites the stored chunk.
    async fn add(
        &self,
        collection: &CollectionHandle,
        documents: Vec<String>,
        metadatas: Vec<Map<String, Value>>,
        ids: Vec<String>,
    ) -> Result<(), StoreError>;

    /// Return up to `n_results` nearest chunks for each query text, best match first.
    async fn query(
        &self,
        collection: &CollectionHandle,
        query_texts: Vec<String>,
        n_results: usize,
    ) -> Result<Vec<Vec<QueryMatch>>, StoreError>;

    /// Names of every collection in the store.
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Whether a collection exists.
    async fn exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Delete a collection and its vectors. Deleting a missing collection succeeds.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// Accepted collection name lengths, in characters.
pub const COLLECTION_NAME_LEN: std::ops::RangeInclusive<usize> = 3..=63;

/// Check that `name` is 3-63 ASCII letters, digits, `_` or `-`.
///
/// Generated upload collections (`doc_<8 hex>`) always pass.
pub fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    let allowed = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if allowed && COLLECTION_NAME_LEN.contains(&name.len()) {
        Ok(())
    } else {
        Err(StoreError::InvalidCollectionName(name.to_string()))
    }
}

/// Reject `add` calls whose sequences disagree in length.
pub(crate) fn check_lengths(
    documents: &[String],
    metadatas: &[Map<String, Value>],
    ids: &[String],
) -> Result<(), StoreError> {
    if documents.len() == metadatas.len() && documents.len() == ids.len() {
        Ok(())
    } else {
        Err(StoreError::LengthMismatch {
            documents: documents.len(),
            metadatas: metadatas.len(),
            ids: ids.len(),
        })
    }
}
