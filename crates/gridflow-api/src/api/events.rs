// Event queue HTTP routes and the SSE status stream
//
// Messages on the stream are notifications, not primary data storage: a
// reconnecting client gets a fresh `connected` + snapshot pair instead of
// a replay, because status is re-derivable from current queue state.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{stream, Stream, StreamExt};
use gridflow_core::{
    CellUpdatePayload, Event, StatusBroadcaster, StreamMessage, EVENT_TYPE_CELL_UPDATE,
};
use gridflow_storage::StorageBackend;
use gridflow_worker::{EventProcessor, ProcessReport};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{internal_error, not_found, ErrorResponse, ListResponse};
use super::validation;
use crate::services::EventService;

/// Request to enqueue an event
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueEventRequest {
    /// Tag selecting the handler to invoke (e.g. "cell_update").
    #[schema(example = "cell_update")]
    pub event_type: String,
    /// Handler-specific payload.
    #[schema(example = json!({"rowIndex": 0, "colIndex": 0, "content": "weather NYC"}))]
    pub payload: serde_json::Value,
}

/// Result of a synchronous processing run
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    /// Events claimed and driven to a transition in this batch.
    pub processed_count: usize,
}

impl From<ProcessReport> for ProcessResponse {
    fn from(report: ProcessReport) -> Self {
        Self {
            processed_count: report.processed_count,
        }
    }
}

/// App state for event routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EventService>,
}

impl AppState {
    pub fn new(
        storage: StorageBackend,
        broadcaster: Arc<StatusBroadcaster>,
        processor: Arc<EventProcessor>,
    ) -> Self {
        Self {
            service: Arc::new(EventService::new(storage, broadcaster, processor)),
        }
    }
}

/// Create event routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/documents/:document_id/events",
            post(enqueue_event).get(list_events),
        )
        .route(
            "/v1/documents/:document_id/events/process",
            post(process_events),
        )
        .route("/v1/documents/:document_id/stream", get(stream_status))
        .with_state(state)
}

/// POST /v1/documents/{document_id}/events - Enqueue a mutation-intent
#[utoipa::path(
    post,
    path = "/v1/documents/{document_id}/events",
    params(("document_id" = Uuid, Path, description = "Document ID")),
    request_body = EnqueueEventRequest,
    responses(
        (status = 201, description = "Event enqueued", body = Event),
        (status = 400, description = "Validation failure", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn enqueue_event(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(req): Json<EnqueueEventRequest>,
) -> Result<(StatusCode, Json<Event>), (StatusCode, Json<ErrorResponse>)> {
    validation::validate_event_type(&req.event_type)?;
    validation::validate_event_payload(&req.payload)?;

    // Malformed cell mutations are rejected here, never enqueued
    if req.event_type == EVENT_TYPE_CELL_UPDATE {
        let payload: CellUpdatePayload = serde_json::from_value(req.payload.clone())
            .map_err(|_| validation::ValidationError)?;
        validation::validate_cell_coordinates(payload.row_index, payload.col_index)?;
        validation::validate_cell_content(&payload.content)?;
    }

    let event = state
        .service
        .enqueue(document_id, req.event_type, req.payload)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Document"))?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /v1/documents/{document_id}/events - Outstanding events (reporting)
#[utoipa::path(
    get,
    path = "/v1/documents/{document_id}/events",
    params(("document_id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Outstanding events, oldest first", body = ListResponse<Event>),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<ListResponse<Event>>, (StatusCode, Json<ErrorResponse>)> {
    let events = state
        .service
        .list(document_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Document"))?;
    Ok(Json(ListResponse::new(events)))
}

/// POST /v1/documents/{document_id}/events/process - Run one batch now
#[utoipa::path(
    post,
    path = "/v1/documents/{document_id}/events/process",
    params(("document_id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Batch processed", body = ProcessResponse),
        (status = 500, description = "Processing failure", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn process_events(
    State(state): State<AppState>,
    Path(_document_id): Path<Uuid>,
) -> Result<Json<ProcessResponse>, (StatusCode, Json<ErrorResponse>)> {
    let report = state.service.process_now().await.map_err(|e| {
        tracing::error!("Process trigger failed: {}", e);
        ErrorResponse::new(e.to_string()).into_response(StatusCode::INTERNAL_SERVER_ERROR)
    })?;
    Ok(Json(ProcessResponse::from(report)))
}

/// GET /v1/documents/{document_id}/stream - SSE status stream
#[utoipa::path(
    get,
    path = "/v1/documents/{document_id}/stream",
    params(("document_id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Status stream", content_type = "text/event-stream"),
        (status = 404, description = "Document not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "events"
)]
pub async fn stream_status(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    let (initial, receiver) = state
        .service
        .open_stream(document_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to open stream: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    tracing::info!(document_id = %document_id, "Status stream opened");

    let initial_stream = stream::iter(initial.iter().map(to_sse).collect::<Vec<_>>());

    // Lagged receivers surface as a delivery-layer error message; the
    // client is expected to reconnect for a fresh snapshot.
    let live = BroadcastStream::new(receiver).map(|result| match result {
        Ok(message) => to_sse(&message),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => to_sse(&StreamMessage::error(format!(
            "{} messages dropped, reconnect for a fresh snapshot",
            skipped
        ))),
    });

    let stream = initial_stream.chain(live);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// SSE wire format: event name is the message kind, data is the full
/// message JSON.
fn to_sse(message: &StreamMessage) -> Result<SseEvent, Infallible> {
    let json = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());
    Ok(SseEvent::default().event(message.kind.as_str()).data(json))
}
