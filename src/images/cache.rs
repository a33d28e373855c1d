//! In-memory image sets keyed by collection name.
//!
//! Entries are created during ingestion and overwritten when a collection is re-ingested. The
//! cache is bounded by the number of collections it holds and evicts the least recently used
//! set when full. Nothing is persisted; a restart empties the cache.

use image::DynamicImage;
use moka::{policy::EvictionPolicy, sync::Cache};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordered, shared set of optimized images for one collection.
pub type ImageSet = Arc<Vec<DynamicImage>>;

/// Process-wide image store shared by the ingestion and answer pipelines.
#[derive(Clone)]
pub struct ImageCache {
    entries: Cache<String, ImageSet>,
}

impl ImageCache {
    /// Create a cache holding image sets for at most `max_collections` collections.
    pub fn new(max_collections: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_collections.max(1))
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { entries }
    }

    /// Store `images` for `collection`, replacing any previous set.
    pub fn put(&self, collection: &str, images: Vec<DynamicImage>) -> ImageSet {
        let set: ImageSet = Arc::new(images);
        self.entries.insert(collection.to_string(), set.clone());
        tracing::info!(
            collection,
            images = set.len(),
            "Cached images for collection"
        );
        set
    }

    /// Images cached for `collection`, or an empty set when none exist.
    pub fn get(&self, collection: &str) -> ImageSet {
        self.entries.get(collection).unwrap_or_default()
    }

    /// Drop the image set for one collection. Returns whether an entry was present.
    pub fn evict(&self, collection: &str) -> bool {
        let removed = self.entries.remove(collection).is_some();
        if removed {
            tracing::info!(collection, "Cleared image cache for collection");
        }
        removed
    }

    /// Drop every cached image set.
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
        tracing::info!("Cleared all image cache");
    }

    /// Number of cached images per collection.
    pub fn info(&self) -> BTreeMap<String, usize> {
        self.entries
            .iter()
            .map(|(collection, images)| (collection.as_ref().clone(), images.len()))
            .collect()
    }
}
