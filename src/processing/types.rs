//! Core data types and error definitions for the ingestion and answer pipelines.

use crate::extraction::{ExtractionDiagnostic, ExtractionError};
use crate::generation::GenerationError;
use crate::store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible chunk budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap cannot exceed the chunk size.
    #[error("chunk overlap ({overlap}) is larger than chunk size ({chunk_size})")]
    OverlapTooLarge {
        /// Requested overlap.
        overlap: usize,
        /// Requested chunk size.
        chunk_size: usize,
    },
}

/// Errors that move an ingestion into the `failed` state.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The document could not be read.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Chunker settings were rejected.
    #[error("Invalid chunking settings: {0}")]
    Chunking(#[from] ChunkingError),
    /// The vector store rejected a write.
    #[error("Vector store request failed: {0}")]
    Store(#[from] StoreError),
    /// A blocking worker panicked or was cancelled.
    #[error("Ingestion worker failed: {0}")]
    Worker(String),
}

/// Errors raised while wiring the document service at start-up.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// Vector store or embedding client could not be built.
    #[error("Failed to initialize vector store: {0}")]
    Store(#[from] StoreError),
    /// Generation client could not be built.
    #[error("Failed to initialize generation client: {0}")]
    Generation(#[from] GenerationError),
    /// Chunk settings are invalid.
    #[error("Invalid chunking settings: {0}")]
    Chunking(#[from] ChunkingError),
}

/// Reachability of the vector store as seen by the health endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoreHealth {
    /// Whether the store answered a listing request.
    pub reachable: bool,
    /// Collection probed for existence.
    pub default_collection: String,
    /// Whether that collection exists; `false` when the store is unreachable.
    pub default_collection_exists: bool,
    /// Error text when the store is unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Stages of a single ingestion, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStage {
    /// Upload accepted, nothing processed yet.
    Received,
    /// Extracting text and images.
    Extracting,
    /// Optimizing images and writing them to the image cache.
    CachingImages,
    /// Splitting extracted text into chunks.
    Chunking,
    /// Writing chunk batches to the vector store.
    Storing,
    /// All steps finished.
    Completed,
    /// A step failed; earlier batch writes are kept.
    Failed,
}

impl IngestionStage {
    /// Progress percentage reported when the stage is entered.
    pub fn progress(self) -> u8 {
        match self {
            Self::Received | Self::Failed => 0,
            Self::Extracting => 10,
            Self::CachingImages => 35,
            Self::Chunking => 50,
            Self::Storing => 60,
            Self::Completed => 100,
        }
    }

    /// Status line shown while the stage is active.
    pub fn message(self) -> &'static str {
        match self {
            Self::Received => "Starting document processing...",
            Self::Extracting => "Extracting text and images from document...",
            Self::CachingImages => "Caching extracted images...",
            Self::Chunking => "Splitting text into chunks...",
            Self::Storing => "Storing chunks in vector database...",
            Self::Completed => "Document processed successfully!",
            Self::Failed => "Error processing document",
        }
    }
}

/// Receives stage transitions from the ingestion pipeline.
pub trait IngestionObserver: Send + Sync {
    /// Called on every transition and after each stored batch.
    fn on_progress(&self, stage: IngestionStage, progress: u8, message: &str);
}

/// Observer that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IngestionObserver for NoopObserver {
    fn on_progress(&self, _stage: IngestionStage, _progress: u8, _message: &str) {}
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestionOutcome {
    /// Number of chunks written to the vector store.
    pub chunk_count: usize,
    /// Number of `add` calls issued to the vector store.
    pub batch_count: usize,
    /// Number of optimized images placed in the image cache.
    pub image_count: usize,
    /// Pages and images skipped during extraction.
    pub diagnostics: Vec<ExtractionDiagnostic>,
}

/// Raw upload handed to the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct Document {
    /// Original filename; its extension selects the extractor.
    pub filename: String,
    /// File contents.
    pub bytes: bytes::Bytes,
}

impl Document {
    /// Wrap uploaded bytes with their filename.
    pub fn new(filename: impl Into<String>, bytes: impl Into<bytes::Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}
