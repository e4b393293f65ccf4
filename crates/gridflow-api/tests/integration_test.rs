// Integration tests for the Gridflow API
//
// Drives the production router against the in-memory backend, so the whole
// enqueue -> process -> export pipeline runs without a database or network.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use gridflow_api::build_app;
use gridflow_core::StatusBroadcaster;
use gridflow_storage::StorageBackend;
use gridflow_worker::{CellUpdateHandler, EchoEnricher, EventProcessor, ProcessorConfig};

fn app() -> Router {
    let storage = StorageBackend::in_memory();
    let broadcaster = Arc::new(StatusBroadcaster::new(32));
    let mut processor = EventProcessor::new(
        storage.clone(),
        broadcaster.clone(),
        ProcessorConfig::default(),
    );
    processor.register_handler(Arc::new(CellUpdateHandler::new(
        storage.clone(),
        broadcaster.clone(),
        Arc::new(EchoEnricher),
    )));
    build_app(storage, broadcaster, Arc::new(processor))
}

async fn request_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create_document(app: &Router, name: &str, columns: &[&str]) -> String {
    let (status, doc) =
        request_json(app, "POST", "/v1/documents", Some(json!({"name": name}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = doc["id"].as_str().unwrap().to_string();

    for title in columns {
        let (status, _) = request_json(
            app,
            "POST",
            &format!("/v1/documents/{}/columns", id),
            Some(json!({"title": title})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    id
}

#[tokio::test]
async fn test_enqueue_process_export_pipeline() {
    let app = app();
    let doc = create_document(&app, "Research", &["Query", "Result", "Notes"]).await;

    // Enqueue a cell mutation
    let (status, event) = request_json(
        &app,
        "POST",
        &format!("/v1/documents/{}/events", doc),
        Some(json!({
            "eventType": "cell_update",
            "payload": {"rowIndex": 0, "colIndex": 0, "content": "weather NYC"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(event["status"], "pending");
    assert!(event["id"].is_string());

    // The pending event is visible in the reporting view
    let (status, listed) =
        request_json(&app, "GET", &format!("/v1/documents/{}/events", doc), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    // Process now
    let (status, report) = request_json(
        &app,
        "POST",
        &format!("/v1/documents/{}/events/process", doc),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["processedCount"], 1);

    // Terminal events drop out of the outstanding view
    let (_, listed) =
        request_json(&app, "GET", &format!("/v1/documents/{}/events", doc), None).await;
    assert!(listed["data"].as_array().unwrap().is_empty());

    // The grid holds the raw edit and the enrichment one column right
    let (status, grid) =
        request_json(&app, "GET", &format!("/v1/documents/{}/export", doc), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grid["columnCount"], 3);
    assert_eq!(grid["rowCount"], 1);
    assert_eq!(grid["rows"][0][0], "weather NYC");
    let enriched = grid["rows"][0][1].as_str().unwrap();
    assert!(!enriched.is_empty());
    assert_eq!(grid["rows"][0][2], "");
}

#[tokio::test]
async fn test_batch_processes_both_events() {
    let app = app();
    let doc = create_document(&app, "Batch", &["Query", "Result"]).await;

    for (row, content) in [(0, "first"), (1, "second")] {
        let (status, _) = request_json(
            &app,
            "POST",
            &format!("/v1/documents/{}/events", doc),
            Some(json!({
                "eventType": "cell_update",
                "payload": {"rowIndex": row, "colIndex": 0, "content": content}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, report) = request_json(
        &app,
        "POST",
        &format!("/v1/documents/{}/events/process", doc),
        None,
    )
    .await;
    assert_eq!(report["processedCount"], 2);

    let (_, grid) =
        request_json(&app, "GET", &format!("/v1/documents/{}/export", doc), None).await;
    assert_eq!(grid["rowCount"], 2);
    assert!(!grid["rows"][0][1].as_str().unwrap().is_empty());
    assert!(!grid["rows"][1][1].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_csv_export_headers_and_round_trip() {
    let app = app();
    let doc = create_document(&app, "Q3 Research: NYC", &["Query", "Result", "Notes"]).await;

    for (row, col, content) in [(0, 0, "alpha"), (0, 1, "beta"), (1, 1, "gamma")] {
        let (status, _) = request_json(
            &app,
            "PUT",
            &format!("/v1/documents/{}/cells/{}/{}", doc, row, col),
            Some(json!({"content": content})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/documents/{}/export?format=csv", doc))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("Q3_Research__NYC.csv"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next().unwrap(), "Query,Result,Notes");

    // Re-parse and compare against the structured export
    let reparsed: Vec<Vec<String>> = lines
        .map(|l| l.split(',').map(str::to_string).collect())
        .collect();
    let (_, grid) =
        request_json(&app, "GET", &format!("/v1/documents/{}/export", doc), None).await;
    let rows: Vec<Vec<String>> = grid["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| {
            row.as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect()
        })
        .collect();
    assert_eq!(reparsed, rows);
}

#[tokio::test]
async fn test_unsupported_export_format_is_rejected() {
    let app = app();
    let doc = create_document(&app, "Doc", &[]).await;

    let (status, body) = request_json(
        &app,
        "GET",
        &format!("/v1/documents/{}/export?format=xml", doc),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Unsupported"));
}

#[tokio::test]
async fn test_enqueue_rejections_never_reach_the_queue() {
    let app = app();

    // Unknown document
    let (status, _) = request_json(
        &app,
        "POST",
        &format!("/v1/documents/{}/events", uuid::Uuid::now_v7()),
        Some(json!({
            "eventType": "cell_update",
            "payload": {"rowIndex": 0, "colIndex": 0, "content": "q"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Malformed payload for a known document
    let doc = create_document(&app, "Doc", &[]).await;
    let (status, _) = request_json(
        &app,
        "POST",
        &format!("/v1/documents/{}/events", doc),
        Some(json!({"eventType": "cell_update", "payload": {"rowIndex": -1}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, listed) =
        request_json(&app, "GET", &format!("/v1/documents/{}/events", doc), None).await;
    assert!(listed["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_direct_cell_write_is_last_write_wins() {
    let app = app();
    let doc = create_document(&app, "Doc", &["A"]).await;

    for content in ["first", "second"] {
        let (status, _) = request_json(
            &app,
            "PUT",
            &format!("/v1/documents/{}/cells/0/0", doc),
            Some(json!({"content": content})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, cells) =
        request_json(&app, "GET", &format!("/v1/documents/{}/cells", doc), None).await;
    let data = cells["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["content"], "second");
}

#[tokio::test]
async fn test_document_lifecycle() {
    let app = app();
    let doc = create_document(&app, "Ephemeral", &[]).await;

    let (status, fetched) =
        request_json(&app, "GET", &format!("/v1/documents/{}", doc), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Ephemeral");

    let (status, _) =
        request_json(&app, "DELETE", &format!("/v1/documents/{}", doc), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = request_json(&app, "GET", &format!("/v1/documents/{}", doc), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
