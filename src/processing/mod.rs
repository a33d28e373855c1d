//! Document processing pipeline: chunking, batching, ingestion, and answering.

pub mod answer;
pub mod batches;
pub mod chunking;
pub mod ingest;
mod service;
pub mod types;

pub use answer::{Answer, Unanswerable};
pub use service::{DocumentApi, DocumentService};
pub use types::{
    ChunkingError, Document, IngestionError, IngestionObserver, IngestionOutcome, IngestionStage,
    NoopObserver, ServiceInitError, StoreHealth,
};
