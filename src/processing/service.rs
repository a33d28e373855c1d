//! Document service coordinating ingestion, answering, and collection management.

use crate::{
    config::Config,
    generation::{GeminiClient, GenerationClient},
    images::ImageCache,
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        answer::{Answer, Answering},
        chunking::TextChunker,
        ingest::Ingestion,
        types::{
            Document, IngestionError, IngestionObserver, IngestionOutcome, ServiceInitError,
            StoreHealth,
        },
    },
    store::{QdrantVectorStore, StoreError, VectorStore},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Owns the long-lived collaborators shared by every request: vector store, generation client,
/// image cache, chunker, and metrics.
///
/// Construct it once near process start and share it through an `Arc`.
pub struct DocumentService {
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn GenerationClient>,
    images: ImageCache,
    chunker: TextChunker,
    metrics: Arc<PipelineMetrics>,
    default_collection: String,
}

/// Abstraction over the document pipeline used by the HTTP surface.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Extract, chunk, and store `document` into `collection`.
    async fn ingest(
        &self,
        document: Document,
        collection: &str,
        observer: &dyn IngestionObserver,
    ) -> Result<IngestionOutcome, IngestionError>;

    /// Answer `query` from `collection`. Never fails; see [`Answer`].
    async fn answer(&self, query: &str, collection: &str) -> Answer;

    /// Enumerate collections in the vector store.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Delete a collection. The image cache is left untouched.
    async fn delete_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Probe the vector store for the health endpoint.
    async fn health(&self) -> StoreHealth;

    /// Shared image cache.
    fn image_cache(&self) -> &ImageCache;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl DocumentService {
    /// Build the service from configuration: Qdrant store, Gemini client, LRU image cache.
    pub fn new(config: &Config) -> Result<Self, ServiceInitError> {
        tracing::info!(url = %config.vector_store_url, "Initializing vector store");
        let store = QdrantVectorStore::from_config(config)?;
        let generator = GeminiClient::from_config(config)?;
        let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self::from_parts(
            Arc::new(store),
            Arc::new(generator),
            ImageCache::new(config.image_cache_max_collections),
            chunker,
            config.default_collection_name.clone(),
        ))
    }

    /// Assemble a service from already-built collaborators.
    pub fn from_parts(
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn GenerationClient>,
        images: ImageCache,
        chunker: TextChunker,
        default_collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            generator,
            images,
            chunker,
            metrics: Arc::new(PipelineMetrics::new()),
            default_collection: default_collection.into(),
        }
    }

    fn ingestion(&self) -> Ingestion<'_> {
        Ingestion {
            store: self.store.as_ref(),
            images: &self.images,
            chunker: &self.chunker,
        }
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn ingest(
        &self,
        document: Document,
        collection: &str,
        observer: &dyn IngestionObserver,
    ) -> Result<IngestionOutcome, IngestionError> {
        let result = self.ingestion().run(document, collection, observer).await;
        match &result {
            Ok(outcome) => self
                .metrics
                .record_document(outcome.chunk_count as u64, outcome.image_count as u64),
            Err(_) => self.metrics.record_failure(),
        }
        result
    }

    async fn answer(&self, query: &str, collection: &str) -> Answer {
        let answer = Answering {
            store: self.store.as_ref(),
            images: &self.images,
            generator: self.generator.as_ref(),
        }
        .run(query, collection)
        .await;
        self.metrics.record_answer(answer.is_fallback());
        answer
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.store.list().await
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        self.store.delete(name).await?;
        tracing::info!(collection = name, "Collection deleted");
        Ok(())
    }

    async fn health(&self) -> StoreHealth {
        let probe = match self.store.list().await {
            Ok(_) => self.store.exists(&self.default_collection).await,
            Err(error) => Err(error),
        };
        match probe {
            Ok(exists) => StoreHealth {
                reachable: true,
                default_collection: self.default_collection.clone(),
                default_collection_exists: exists,
                error: None,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Vector store health probe failed");
                StoreHealth {
                    reachable: false,
                    default_collection: self.default_collection.clone(),
                    default_collection_exists: false,
                    error: Some(error.to_string()),
                }
            }
        }
    }

    fn image_cache(&self) -> &ImageCache {
        &self.images
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
