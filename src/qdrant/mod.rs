//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use payload::{CHUNK_ID_KEY, DOCUMENT_KEY, INGESTED_AT_KEY, METADATA_KEY, point_id_for};
pub use types::{PointInsert, QdrantError, ScoredPoint};
