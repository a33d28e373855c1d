//! Helpers for constructing Qdrant payloads and point identifiers.

use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Payload key holding the chunk text.
pub const DOCUMENT_KEY: &str = "document";
/// Payload key holding the caller-visible chunk id.
pub const CHUNK_ID_KEY: &str = "chunk_id";
/// Payload key holding the caller metadata map.
pub const METADATA_KEY: &str = "metadata";
/// Payload key holding the write timestamp.
pub const INGESTED_AT_KEY: &str = "ingested_at";

/// Build the payload object stored alongside each chunk.
pub(crate) fn build_payload(
    chunk_id: &str,
    document: &str,
    metadata: Map<String, Value>,
    timestamp_rfc3339: &str,
) -> Value {
    let mut payload = Map::new();
    payload.insert(CHUNK_ID_KEY.into(), Value::String(chunk_id.to_string()));
    payload.insert(DOCUMENT_KEY.into(), Value::String(document.to_string()));
    payload.insert(METADATA_KEY.into(), Value::Object(metadata));
    payload.insert(
        INGESTED_AT_KEY.into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(payload)
}

/// Map a caller-visible chunk id onto the UUID Qdrant requires.
///
/// The mapping is deterministic, so re-adding an id overwrites the existing point.
pub fn point_id_for(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
