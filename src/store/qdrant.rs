use super::{
    CollectionHandle, QueryMatch, StoreError, VectorStore, check_lengths, validate_collection_name,
};
use crate::config::Config;
use crate::embedding::{EmbeddingClient, build_embedding_client};
use crate::qdrant::payload::{build_payload, current_timestamp_rfc3339};
use crate::qdrant::{
    CHUNK_ID_KEY, DOCUMENT_KEY, METADATA_KEY, PointInsert, QdrantService, ScoredPoint,
    point_id_for,
};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Qdrant-backed store that embeds text with the configured provider before writing.
pub struct QdrantVectorStore {
    qdrant: QdrantService,
    embedder: Box<dyn EmbeddingClient>,
    dimension: usize,
}

impl QdrantVectorStore {
    /// Assemble a store from its collaborators.
    pub fn new(qdrant: QdrantService, embedder: Box<dyn EmbeddingClient>, dimension: usize) -> Self {
        Self {
            qdrant,
            embedder,
            dimension,
        }
    }

    /// Connect to the store and embedding provider named in the configuration.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let qdrant = QdrantService::new(
            &config.vector_store_url,
            config.vector_store_api_key.clone(),
        )?;
        let embedder = build_embedding_client(config)?;
        Ok(Self::new(qdrant, embedder, config.embedding_dimension))
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, StoreError> {
        let vectors = self.embedder.generate_embeddings(texts).await?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn get_or_create(&self, name: &str) -> Result<CollectionHandle, StoreError> {
        validate_collection_name(name)?;
        self.qdrant
            .create_collection_if_not_exists(name, self.dimension as u64)
            .await?;
        Ok(CollectionHandle::new(name))
    }

    async fn add(
        &self,
        collection: &CollectionHandle,
        documents: Vec<String>,
        metadatas: Vec<Map<String, Value>>,
        ids: Vec<String>,
    ) -> Result<(), StoreError> {
        validate_collection_name(collection.name())?;
        check_lengths(&documents, &metadatas, &ids)?;
        if documents.is_empty() {
            return Ok(());
        }

        let vectors = self.embed(documents.clone()).await?;
        let timestamp = current_timestamp_rfc3339();
        let points: Vec<PointInsert> = documents
            .iter()
            .zip(metadatas)
            .zip(ids.iter())
            .zip(vectors)
            .map(|(((document, metadata), id), vector)| PointInsert {
                id: point_id_for(id),
                vector,
                payload: build_payload(id, document, metadata, &timestamp),
            })
            .collect();

        let written = self.qdrant.upsert_points(collection.name(), points).await?;
        tracing::debug!(collection = collection.name(), points = written, "Added documents");
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionHandle,
        query_texts: Vec<String>,
        n_results: usize,
    ) -> Result<Vec<Vec<QueryMatch>>, StoreError> {
        validate_collection_name(collection.name())?;
        if query_texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.embed(query_texts).await?;
        let mut results = Vec::with_capacity(vectors.len());
        for vector in vectors {
            let points = self
                .qdrant
                .search_points(collection.name(), vector, n_results)
                .await?;
            results.push(points.into_iter().map(into_match).collect());
        }
        Ok(results)
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.qdrant.list_collections().await?)
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        validate_collection_name(name)?;
        Ok(self.qdrant.collection_exists(name).await?)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        validate_collection_name(name)?;
        Ok(self.qdrant.delete_collection(name).await?)
    }
}

fn into_match(point: ScoredPoint) -> QueryMatch {
    let mut payload = point.payload.unwrap_or_default();
    let document = match payload.remove(DOCUMENT_KEY) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };
    let metadata = match payload.remove(METADATA_KEY) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let id = match payload.remove(CHUNK_ID_KEY) {
        Some(Value::String(id)) => id,
        _ => point.id,
    };
    QueryMatch {
        id,
        document,
        metadata,
        score: point.score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbeddingClient;
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };
    use serde_json::json;

    fn store_for(server: &MockServer, dimension: usize) -> QdrantVectorStore {
        QdrantVectorStore::new(
            QdrantService::new(&server.base_url(), None).expect("client"),
            Box::new(HashedEmbeddingClient::new(dimension)),
            dimension,
        )
    }

    #[tokio::test]
    async fn add_writes_uuid_points_with_chunk_ids() {
        let server = MockServer::start_async().await;
        let expected_uuid = point_id_for("doc_1234abcd_0");
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/doc_1234abcd/points")
                    .query_param("wait", "true")
                    .body_contains(expected_uuid.as_str())
                    .body_contains(r#""chunk_id":"doc_1234abcd_0""#)
                    .body_contains(r#""filename":"sky.txt""#);
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let metadata = json!({ "filename": "sky.txt", "chunk_index": 0 })
            .as_object()
            .cloned()
            .unwrap();
        store_for(&server, 8)
            .add(
                &CollectionHandle::new("doc_1234abcd"),
                vec!["The sky is blue.".into()],
                vec![metadata],
                vec!["doc_1234abcd_0".into()],
            )
            .await
            .expect("add");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn add_rejects_mismatched_lengths_without_network() {
        let server = MockServer::start_async().await;
        let error = store_for(&server, 8)
            .add(
                &CollectionHandle::new("doc"),
                vec!["a".into(), "b".into()],
                vec![Map::new()],
                vec!["doc_0".into(), "doc_1".into()],
            )
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::LengthMismatch { .. }));
    }

    #[tokio::test]
    async fn query_maps_payload_back_to_matches() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/doc/points/query");
                then.status(200).json_body(json!({
                    "result": { "points": [{
                        "id": point_id_for("doc_0"),
                        "score": 0.9,
                        "payload": {
                            "chunk_id": "doc_0",
                            "document": "The sky is blue.",
                            "metadata": { "filename": "sky.txt" }
                        }
                    }]}
                }));
            })
            .await;

        let results = store_for(&server, 8)
            .query(
                &CollectionHandle::new("doc"),
                vec!["What color is the sky?".into()],
                5,
            )
            .await
            .expect("query");

        assert_eq!(results.len(), 1);
        let hit = &results[0][0];
        assert_eq!(hit.id, "doc_0");
        assert_eq!(hit.document, "The sky is blue.");
        assert_eq!(hit.metadata["filename"], "sky.txt");
    }

    #[tokio::test]
    async fn get_or_create_creates_missing_collections() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/fresh");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/fresh")
                    .json_body_partial(r#"{"vectors":{"size":8}}"#);
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        let handle = store_for(&server, 8).get_or_create("fresh").await.unwrap();
        create.assert_async().await;
        assert_eq!(handle.name(), "fresh");
    }

    #[tokio::test]
    async fn invalid_collection_names_fail_before_any_request() {
        let server = MockServer::start_async().await;
        let any_request = server
            .mock_async(|when, then| {
                when.path_contains("/collections");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let store = store_for(&server, 8);

        assert!(matches!(
            store.exists("doc_a?x").await,
            Err(StoreError::InvalidCollectionName(_))
        ));
        assert!(matches!(
            store.delete("x/../victim").await,
            Err(StoreError::InvalidCollectionName(_))
        ));
        assert!(matches!(
            store.get_or_create("..").await,
            Err(StoreError::InvalidCollectionName(_))
        ));
        assert!(matches!(
            store
                .query(&CollectionHandle::new("doc a"), vec!["sky".into()], 5)
                .await,
            Err(StoreError::InvalidCollectionName(_))
        ));

        assert_eq!(any_request.hits_async().await, 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_detected_before_writing() {
        let server = MockServer::start_async().await;
        let store = QdrantVectorStore::new(
            QdrantService::new(&server.base_url(), None).unwrap(),
            Box::new(HashedEmbeddingClient::new(4)),
            8,
        );
        let error = store
            .add(
                &CollectionHandle::new("doc"),
                vec!["x".into()],
                vec![Map::new()],
                vec!["doc_0".into()],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            StoreError::DimensionMismatch {
                expected: 8,
                actual: 4
            }
        ));
    }
}
