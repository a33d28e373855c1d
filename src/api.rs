//! HTTP surface for the document QA backend.
//!
//! - `GET /` – Health check including vector store reachability.
//! - `POST /api/upload` – Multipart upload (field `file`); starts background ingestion into a
//!   fresh `doc_<8 hex>` collection and returns the task id at once.
//! - `GET /api/status/:task_id` – Progress of an ingestion task.
//! - `POST /api/chat` – Answer `{query, collection_name}` from a collection.
//! - `GET /api/collections`, `DELETE /api/collections/:name` – Collection management. Deleting
//!   a collection leaves its cached images in place.
//! - `GET /api/cache`, `DELETE /api/cache`, `DELETE /api/cache/:collection` – Image cache
//!   inspection and eviction.
//! - `GET /api/metrics` – Pipeline counters.

use crate::processing::{
    DocumentApi, Document,
    ingest::{completion_message, failure_message},
};
use crate::store::{StoreError, validate_collection_name};
use crate::tasks::{TaskRegistry, TaskStatus};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

/// Multipart framing allowance on top of the file size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// State shared by every handler.
pub struct AppState<S> {
    service: Arc<S>,
    tasks: TaskRegistry,
    max_upload_bytes: usize,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            tasks: self.tasks.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

impl<S> AppState<S> {
    /// Bundle the service with the task registry and the upload limit in bytes.
    pub fn new(service: Arc<S>, tasks: TaskRegistry, max_upload_bytes: usize) -> Self {
        Self {
            service,
            tasks,
            max_upload_bytes,
        }
    }
}

/// Build the HTTP router.
pub fn create_router<S>(state: AppState<S>) -> Router
where
    S: DocumentApi + 'static,
{
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/", get(health::<S>))
        .route("/api/upload", post(upload_document::<S>))
        .route("/api/status/:task_id", get(get_status::<S>))
        .route("/api/chat", post(chat::<S>))
        .route("/api/collections", get(list_collections::<S>))
        .route("/api/collections/:name", delete(delete_collection::<S>))
        .route("/api/cache", get(cache_info::<S>).delete(clear_cache::<S>))
        .route("/api/cache/:collection", delete(evict_cache::<S>))
        .route("/api/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Report liveness and whether the vector store answers.
async fn health<S>(State(state): State<AppState<S>>) -> Json<serde_json::Value>
where
    S: DocumentApi,
{
    let vector_store = state.service.health().await;
    Json(json!({
        "status": "ok",
        "message": "Welcome to the RAG Multi-Modal API",
        "vector_store": vector_store,
    }))
}

/// Response body for `POST /api/upload`.
#[derive(Serialize)]
struct UploadResponse {
    message: String,
    task_id: String,
    collection_name: String,
}

/// Accept an upload and start ingestion in the background.
///
/// Oversized files are rejected with `413` before any extraction starts.
async fn upload_document<S>(
    State(state): State<AppState<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi + 'static,
{
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::BadRequest("Uploaded file has no filename.".into()))?;
        let bytes = field.bytes().await?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("Field 'file' is required.".into()))?;

    tracing::info!(filename = %filename, bytes = bytes.len(), "Received file");
    if bytes.len() > state.max_upload_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "File too large. Maximum size is {}MB.",
            state.max_upload_bytes / (1024 * 1024)
        )));
    }

    let collection_name = new_collection_name();
    let message = format!("File '{filename}' upload started.");
    let service = Arc::clone(&state.service);
    let collection = collection_name.clone();
    let task_id = state.tasks.submit(&collection_name, move |reporter| async move {
        let document = Document::new(filename.clone(), bytes);
        service
            .ingest(document, &collection, &reporter)
            .await
            .map(|_| completion_message(&filename))
            .map_err(|error| failure_message(&error))
    });

    Ok(Json(UploadResponse {
        message,
        task_id,
        collection_name,
    }))
}

fn new_collection_name() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("doc_{}", &hex[..8])
}

async fn get_status<S>(
    State(state): State<AppState<S>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatus>, AppError>
where
    S: DocumentApi,
{
    state
        .tasks
        .status(&task_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Task not found".into()))
}

/// Request body for `POST /api/chat`.
#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    collection_name: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

/// Answer a question; model failures come back as fallback text, never as an error status.
async fn chat<S>(
    State(state): State<AppState<S>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: DocumentApi,
{
    if request.query.trim().is_empty() || request.collection_name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Query and collection_name are required.".into(),
        ));
    }
    validate_collection_name(&request.collection_name)?;
    let answer = state
        .service
        .answer(&request.query, &request.collection_name)
        .await;
    Ok(Json(ChatResponse {
        response: answer.into_text(),
    }))
}

#[derive(Serialize)]
struct CollectionsResponse {
    collections: Vec<String>,
}

async fn list_collections<S>(
    State(state): State<AppState<S>>,
) -> Result<Json<CollectionsResponse>, AppError>
where
    S: DocumentApi,
{
    let collections = state.service.list_collections().await?;
    Ok(Json(CollectionsResponse { collections }))
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn delete_collection<S>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, AppError>
where
    S: DocumentApi,
{
    validate_collection_name(&name)?;
    state.service.delete_collection(&name).await?;
    Ok(Json(MessageResponse {
        message: format!("Collection '{name}' deleted successfully"),
    }))
}

#[derive(Serialize)]
struct CacheResponse {
    collections: BTreeMap<String, usize>,
    total_images: usize,
}

async fn cache_info<S>(State(state): State<AppState<S>>) -> Json<CacheResponse>
where
    S: DocumentApi,
{
    let collections = state.service.image_cache().info();
    let total_images = collections.values().sum();
    Json(CacheResponse {
        collections,
        total_images,
    })
}

async fn clear_cache<S>(State(state): State<AppState<S>>) -> Json<MessageResponse>
where
    S: DocumentApi,
{
    state.service.image_cache().clear();
    Json(MessageResponse {
        message: "Cleared all image cache".into(),
    })
}

async fn evict_cache<S>(
    State(state): State<AppState<S>>,
    Path(collection): Path<String>,
) -> Result<Json<serde_json::Value>, AppError>
where
    S: DocumentApi,
{
    validate_collection_name(&collection)?;
    let evicted = state.service.image_cache().evict(&collection);
    Ok(Json(json!({
        "message": format!("Cleared image cache for collection '{collection}'"),
        "evicted": evicted,
    })))
}

async fn get_metrics<S>(State(state): State<AppState<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: DocumentApi,
{
    Json(state.service.metrics_snapshot())
}

/// Errors returned to HTTP clients as `{"detail": ...}`.
#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    PayloadTooLarge(String),
    Multipart(MultipartError),
    Store(StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            Self::PayloadTooLarge(detail) => (StatusCode::PAYLOAD_TOO_LARGE, detail),
            Self::Multipart(error) => (error.status(), error.body_text()),
            Self::Store(error @ StoreError::InvalidCollectionName(_)) => {
                (StatusCode::BAD_REQUEST, error.to_string())
            }
            Self::Store(error) => {
                tracing::error!(error = %error, "Vector store request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(inner: StoreError) -> Self {
        Self::Store(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}
