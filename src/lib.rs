#![deny(missing_docs)]

//! Core library for the document question-answering backend.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text and image extraction from PDF, DOCX, and TXT uploads.
pub mod extraction;
/// Generation model client.
pub mod generation;
/// Image optimization and caching.
pub mod images;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Document processing pipeline.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Vector store gateway.
pub mod store;
/// Background ingestion tasks.
pub mod tasks;
