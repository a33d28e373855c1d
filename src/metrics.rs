use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and answering activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_ingested: AtomicU64,
    ingestion_failures: AtomicU64,
    chunks_stored: AtomicU64,
    images_cached: AtomicU64,
    answers_generated: AtomicU64,
    answer_fallbacks: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed ingestion along with the chunks and images it produced.
    pub fn record_document(&self, chunk_count: u64, image_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_stored.fetch_add(chunk_count, Ordering::Relaxed);
        self.images_cached.fetch_add(image_count, Ordering::Relaxed);
    }

    /// Record an ingestion that ended in the `failed` state.
    pub fn record_failure(&self) {
        self.ingestion_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chat request; `fallback` is true when a canned reply was returned.
    pub fn record_answer(&self, fallback: bool) {
        if fallback {
            self.answer_fallbacks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.answers_generated.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            ingestion_failures: self.ingestion_failures.load(Ordering::Relaxed),
            chunks_stored: self.chunks_stored.load(Ordering::Relaxed),
            images_cached: self.images_cached.load(Ordering::Relaxed),
            answers_generated: self.answers_generated.load(Ordering::Relaxed),
            answer_fallbacks: self.answer_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that completed ingestion since startup.
    pub documents_ingested: u64,
    /// Ingestions that ended in failure.
    pub ingestion_failures: u64,
    /// Chunks written to the vector store.
    pub chunks_stored: u64,
    /// Optimized images placed in the image cache.
    pub images_cached: u64,
    /// Chat requests answered by the model.
    pub answers_generated: u64,
    /// Chat requests that fell back to a canned reply.
    pub answer_fallbacks: u64,
}
