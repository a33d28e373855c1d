//! Ingestion orchestrator: extraction, image caching, chunking, and batched storage.
//!
//! Stages run in a fixed order and report through an [`IngestionObserver`]. CPU-bound work
//! runs on the blocking pool. Batches already written stay in the store when a later batch
//! fails.

use super::batches::{BATCH_SIZE, plan_batches};
use super::chunking::TextChunker;
use super::types::{Document, IngestionError, IngestionObserver, IngestionOutcome, IngestionStage};
use crate::extraction::{self, Extraction};
use crate::images::{ImageCache, optimize_default};
use crate::store::VectorStore;

/// Status message for a finished ingestion.
pub fn completion_message(filename: &str) -> String {
    format!("Document '{filename}' processed successfully!")
}

/// Status message for a failed ingestion.
pub fn failure_message(error: &IngestionError) -> String {
    format!("Error processing document: {error}")
}

/// Borrowed collaborators for one ingestion.
pub struct Ingestion<'a> {
    /// Destination for text chunks.
    pub store: &'a dyn VectorStore,
    /// Destination for optimized images.
    pub images: &'a ImageCache,
    /// Splitter applied to extracted text.
    pub chunker: &'a TextChunker,
}

impl Ingestion<'_> {
    /// Process `document` into `collection`, reporting each stage to `observer`.
    ///
    /// The observer sees `Completed` or `Failed` last, with the matching status message.
    pub async fn run(
        &self,
        document: Document,
        collection: &str,
        observer: &dyn IngestionObserver,
    ) -> Result<IngestionOutcome, IngestionError> {
        let filename = document.filename.clone();
        tracing::info!(
            filename = %filename,
            collection,
            bytes = document.bytes.len(),
            "Starting document processing"
        );

        match self.process(document, collection, observer).await {
            Ok(outcome) => {
                observer.on_progress(
                    IngestionStage::Completed,
                    IngestionStage::Completed.progress(),
                    &completion_message(&filename),
                );
                tracing::info!(
                    filename = %filename,
                    collection,
                    chunks = outcome.chunk_count,
                    batches = outcome.batch_count,
                    images = outcome.image_count,
                    skipped = outcome.diagnostics.len(),
                    "Document processed"
                );
                Ok(outcome)
            }
            Err(error) => {
                observer.on_progress(
                    IngestionStage::Failed,
                    IngestionStage::Failed.progress(),
                    &failure_message(&error),
                );
                tracing::error!(filename = %filename, collection, error = %error, "Error processing document");
                Err(error)
            }
        }
    }

    async fn process(
        &self,
        document: Document,
        collection: &str,
        observer: &dyn IngestionObserver,
    ) -> Result<IngestionOutcome, IngestionError> {
        enter(observer, IngestionStage::Extracting);
        let Document { filename, bytes } = document;
        let extract_name = filename.clone();
        let Extraction {
            text,
            images,
            diagnostics,
        } = blocking(move || extraction::extract(&bytes, &extract_name)).await??;

        let mut outcome = IngestionOutcome {
            diagnostics,
            ..Default::default()
        };

        if !images.is_empty() {
            enter(observer, IngestionStage::CachingImages);
            let optimized =
                blocking(move || images.into_iter().map(optimize_default).collect::<Vec<_>>())
                    .await?;
            outcome.image_count = self.images.put(collection, optimized).len();
        }

        if text.trim().is_empty() {
            return Ok(outcome);
        }

        enter(observer, IngestionStage::Chunking);
        let chunker = self.chunker.clone();
        let chunks = blocking(move || chunker.split(&text)).await?;
        tracing::info!(collection, chunks = chunks.len(), "Split document into text chunks");
        if chunks.is_empty() {
            return Ok(outcome);
        }

        enter(observer, IngestionStage::Storing);
        let handle = self.store.get_or_create(collection).await?;
        let batches = plan_batches(&chunks, collection, &filename, BATCH_SIZE);
        let total = batches.len();
        for (done, batch) in batches.into_iter().enumerate() {
            let size = batch.len();
            tracing::info!(
                collection,
                batch = batch.batch_id + 1,
                total,
                chunks = size,
                "Storing batch"
            );
            self.store
                .add(&handle, batch.documents, batch.metadatas, batch.ids)
                .await?;
            outcome.chunk_count += size;
            outcome.batch_count += 1;
            observer.on_progress(
                IngestionStage::Storing,
                storing_progress(done + 1, total),
                &format!("Stored batch {}/{total}", done + 1),
            );
        }

        Ok(outcome)
    }
}

fn enter(observer: &dyn IngestionObserver, stage: IngestionStage) {
    observer.on_progress(stage, stage.progress(), stage.message());
}

/// Progress after `done` of `total` batches, spread over 60..=95.
fn storing_progress(done: usize, total: usize) -> u8 {
    let start = usize::from(IngestionStage::Storing.progress());
    let span = 35;
    let step = span * done / total.max(1);
    u8::try_from(start + step.min(span)).unwrap_or(95)
}

async fn blocking<T, F>(work: F) -> Result<T, IngestionError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| IngestionError::Worker(error.to_string()))
}
