// Grid export HTTP routes

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use gridflow_core::Grid;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{internal_error, not_found, ErrorResponse};
use crate::services::ExportService;
use gridflow_storage::StorageBackend;

/// Query parameters for grid export
#[derive(Debug, Deserialize, IntoParams)]
pub struct ExportQuery {
    /// Output format: "json" (structured grid) or "csv" (delimited text).
    pub format: Option<String>,
}

/// App state for export routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExportService>,
}

impl AppState {
    pub fn new(storage: StorageBackend) -> Self {
        Self {
            service: Arc::new(ExportService::new(storage)),
        }
    }
}

/// Create export routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/documents/:document_id/export", get(export_grid))
        .with_state(state)
}

/// GET /v1/documents/{document_id}/export - Materialize the full grid
#[utoipa::path(
    get,
    path = "/v1/documents/{document_id}/export",
    params(
        ("document_id" = Uuid, Path, description = "Document ID"),
        ExportQuery
    ),
    responses(
        (status = 200, description = "Grid as JSON or delimited text", body = Grid),
        (status = 400, description = "Unsupported export format", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "export"
)]
pub async fn export_grid(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let format = query.format.as_deref().unwrap_or("json");
    if format != "json" && format != "csv" {
        return Err(ErrorResponse::new(format!("Unsupported export format: {}", format))
            .into_response(StatusCode::BAD_REQUEST));
    }

    let (document, grid) = state
        .service
        .grid(document_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Document"))?;

    if format == "json" {
        return Ok(Json(grid).into_response());
    }

    let filename = format!("{}.csv", document.export_stem());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(grid.to_delimited()))
        .map_err(|e| internal_error(e.into()))
}
