mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use common::{Harness, ScriptedGenerator};
use docqa::api::{AppState, create_router};
use docqa::processing::{DocumentApi, batches::BATCH_SIZE, chunking::TextChunker};
use docqa::tasks::{TaskRegistry, TaskState};
use serde_json::{Value, json};
use tower::ServiceExt;

const BOUNDARY: &str = "docqa-flow";

fn app(harness: &Harness, tasks: &TaskRegistry, limit: usize) -> Router {
    create_router(AppState::new(harness.service.clone(), tasks.clone(), limit))
}

fn upload(filename: &str, contents: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn upload_poll_and_chat() {
    let harness = Harness::new(ScriptedGenerator::replying("Blue."));
    let tasks = TaskRegistry::new(32);
    let app = app(&harness, &tasks, 1024 * 1024);

    let response = app
        .clone()
        .oneshot(upload("sky.txt", b"The sky is blue."))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let uploaded = json_body(response).await;
    let task_id = uploaded["task_id"].as_str().unwrap().to_string();
    let collection = uploaded["collection_name"].as_str().unwrap().to_string();

    let finished = tasks.wait(&task_id).await.unwrap();
    assert_eq!(finished.status, TaskState::Completed);

    let status = json_body(
        app.clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/status/{task_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(
        status,
        json!({
            "status": "completed",
            "message": "Document 'sky.txt' processed successfully!",
            "progress": 100,
            "collection_name": collection,
        })
    );

    let chat = json_body(
        app.clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "query": "What color is the sky?", "collection_name": collection })
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(chat["response"], "Blue.");
    assert_eq!(harness.store.last_query().unwrap()[0].document, "The sky is blue.");

    let listed = json_body(
        app.oneshot(
            Request::builder()
                .uri("/api/collections")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap(),
    )
    .await;
    assert!(
        listed["collections"]
            .as_array()
            .unwrap()
            .contains(&Value::String(collection))
    );
}

#[tokio::test]
async fn oversized_files_never_reach_extraction() {
    let harness = Harness::new(ScriptedGenerator::replying("unused"));
    let tasks = TaskRegistry::new(4);
    let limit = 4 * 1024;
    let app = app(&harness, &tasks, limit);

    let response = app
        .oneshot(upload("huge.txt", &vec![b'x'; limit + 1]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(tasks.is_empty());
    assert!(harness.store.add_calls().is_empty());
    assert_eq!(harness.service.metrics_snapshot().ingestion_failures, 0);
}

#[tokio::test]
async fn failing_batch_fails_the_task_and_keeps_earlier_batches() {
    let harness = Harness::with_chunker(
        ScriptedGenerator::replying("unused"),
        TextChunker::new(12, 0).unwrap(),
    );
    harness.store.fail_adds_after(1);
    let tasks = TaskRegistry::new(4);
    let app = app(&harness, &tasks, 1024 * 1024);

    let text = (0..250)
        .map(|n| format!("word{n:04}"))
        .collect::<Vec<_>>()
        .join(" ");
    let uploaded = json_body(
        app.oneshot(upload("words.txt", text.as_bytes()))
            .await
            .unwrap(),
    )
    .await;
    let task_id = uploaded["task_id"].as_str().unwrap();
    let collection = uploaded["collection_name"].as_str().unwrap();

    let finished = tasks.wait(task_id).await.unwrap();
    assert_eq!(finished.status, TaskState::Failed);
    assert_eq!(finished.progress, 0);
    assert!(
        finished
            .message
            .starts_with("Error processing document: Vector store request failed"),
        "{}",
        finished.message
    );
    assert!(finished.message.ends_with("store offline"));

    assert_eq!(harness.store.add_calls().len(), 1);
    assert_eq!(harness.store.chunk_count(collection), BATCH_SIZE);
    let metrics = harness.service.metrics_snapshot();
    assert_eq!(metrics.ingestion_failures, 1);
    assert_eq!(metrics.documents_ingested, 0);
}
