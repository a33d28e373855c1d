//! Splits a chunk sequence into vector-store write batches.

use serde_json::{Map, Value};

/// Chunks sent per vector store `add` call.
pub const BATCH_SIZE: usize = 100;

/// One `add` call worth of documents, metadata, and ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkBatch {
    /// Zero-based batch number, equal to `chunk_index / batch_size` for every member.
    pub batch_id: usize,
    /// Chunk texts in document order.
    pub documents: Vec<String>,
    /// Per-chunk metadata: `filename`, `chunk_index`, `total_chunks`, `batch_id`.
    pub metadatas: Vec<Map<String, Value>>,
    /// Chunk ids of the form `{collection}_{chunk_index}`.
    pub ids: Vec<String>,
}

impl ChunkBatch {
    /// Number of chunks in the batch.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the batch holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Id under which chunk `index` of `collection` is stored.
pub fn chunk_id(collection: &str, index: usize) -> String {
    format!("{collection}_{index}")
}

/// Group `chunks` into batches of `batch_size`, tagging each chunk with its metadata.
///
/// Yields `ceil(chunks.len() / batch_size)` batches; concatenating their documents in order
/// reproduces `chunks`. A `batch_size` of zero is treated as one.
pub fn plan_batches(
    chunks: &[String],
    collection: &str,
    filename: &str,
    batch_size: usize,
) -> Vec<ChunkBatch> {
    let batch_size = batch_size.max(1);
    let total_chunks = chunks.len();

    chunks
        .chunks(batch_size)
        .enumerate()
        .map(|(batch_id, slice)| {
            let start = batch_id * batch_size;
            let indices = start..start + slice.len();
            ChunkBatch {
                batch_id,
                documents: slice.to_vec(),
                metadatas: indices
                    .clone()
                    .map(|chunk_index| chunk_metadata(filename, chunk_index, total_chunks, batch_id))
                    .collect(),
                ids: indices.map(|index| chunk_id(collection, index)).collect(),
            }
        })
        .collect()
}

fn chunk_metadata(
    filename: &str,
    chunk_index: usize,
    total_chunks: usize,
    batch_id: usize,
) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("filename".into(), Value::from(filename));
    map.insert("chunk_index".into(), Value::from(chunk_index));
    map.insert("total_chunks".into(), Value::from(total_chunks));
    map.insert("batch_id".into(), Value::from(batch_id));
    map
}
