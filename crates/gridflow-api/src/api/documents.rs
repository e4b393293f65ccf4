// Document CRUD HTTP routes
//
// Documents and columns are collaborators of the pipeline, not its core;
// these routes exist so the queue has something to mutate and export.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use gridflow_core::{Cell, Column, Document};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{internal_error, not_found, ErrorResponse, ListResponse};
use super::validation;
use crate::services::DocumentService;
use gridflow_storage::StorageBackend;

/// Request to create a new document
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateDocumentRequest {
    /// Display name of the document.
    #[schema(example = "Market Research")]
    pub name: String,
}

/// Request to append a column to a document
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateColumnRequest {
    /// Column header title.
    #[schema(example = "Query")]
    pub title: String,
    /// Zero-based position; defaults to the end of the column list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
}

/// Request to write a cell directly (no enrichment)
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PutCellRequest {
    /// New cell content; replaces any existing content.
    pub content: String,
}

/// App state for document routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DocumentService>,
}

impl AppState {
    pub fn new(storage: StorageBackend) -> Self {
        Self {
            service: Arc::new(DocumentService::new(storage)),
        }
    }
}

/// Create document routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/documents", post(create_document).get(list_documents))
        .route(
            "/v1/documents/:document_id",
            get(get_document).delete(delete_document),
        )
        .route(
            "/v1/documents/:document_id/columns",
            post(create_column).get(list_columns),
        )
        .route("/v1/documents/:document_id/cells", get(list_cells))
        .route(
            "/v1/documents/:document_id/cells/:row_index/:col_index",
            put(put_cell),
        )
        .with_state(state)
}

/// POST /v1/documents - Create a new document
#[utoipa::path(
    post,
    path = "/v1/documents",
    request_body = CreateDocumentRequest,
    responses(
        (status = 201, description = "Document created successfully", body = Document),
        (status = 400, description = "Validation failure", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "documents"
)]
pub async fn create_document(
    State(state): State<AppState>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<Document>), (StatusCode, Json<ErrorResponse>)> {
    validation::validate_document_name(&req.name)?;

    let document = state.service.create(req.name).await.map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /v1/documents - List all documents
#[utoipa::path(
    get,
    path = "/v1/documents",
    responses(
        (status = 200, description = "List of documents", body = ListResponse<Document>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "documents"
)]
pub async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Document>>, (StatusCode, Json<ErrorResponse>)> {
    let documents = state.service.list().await.map_err(internal_error)?;
    Ok(Json(ListResponse::new(documents)))
}

/// GET /v1/documents/{document_id} - Get document by ID
#[utoipa::path(
    get,
    path = "/v1/documents/{document_id}",
    params(("document_id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document found", body = Document),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "documents"
)]
pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Document>, (StatusCode, Json<ErrorResponse>)> {
    let document = state
        .service
        .get(document_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Document"))?;
    Ok(Json(document))
}

/// DELETE /v1/documents/{document_id} - Delete a document and its contents
#[utoipa::path(
    delete,
    path = "/v1/documents/{document_id}",
    params(("document_id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "documents"
)]
pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let deleted = state
        .service
        .delete(document_id)
        .await
        .map_err(internal_error)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Document"))
    }
}

/// POST /v1/documents/{document_id}/columns - Append a column
#[utoipa::path(
    post,
    path = "/v1/documents/{document_id}/columns",
    params(("document_id" = Uuid, Path, description = "Document ID")),
    request_body = CreateColumnRequest,
    responses(
        (status = 201, description = "Column created", body = Column),
        (status = 400, description = "Validation failure", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "documents"
)]
pub async fn create_column(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(req): Json<CreateColumnRequest>,
) -> Result<(StatusCode, Json<Column>), (StatusCode, Json<ErrorResponse>)> {
    validation::validate_column_title(&req.title)?;

    let column = state
        .service
        .add_column(document_id, req.title, req.position)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Document"))?;
    Ok((StatusCode::CREATED, Json(column)))
}

/// GET /v1/documents/{document_id}/columns - Ordered column list
#[utoipa::path(
    get,
    path = "/v1/documents/{document_id}/columns",
    params(("document_id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Columns in position order", body = ListResponse<Column>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "documents"
)]
pub async fn list_columns(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<ListResponse<Column>>, (StatusCode, Json<ErrorResponse>)> {
    let columns = state
        .service
        .columns(document_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(ListResponse::new(columns)))
}

/// GET /v1/documents/{document_id}/cells - All populated cells
#[utoipa::path(
    get,
    path = "/v1/documents/{document_id}/cells",
    params(("document_id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Populated cells in row/column order", body = ListResponse<Cell>),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "documents"
)]
pub async fn list_cells(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<ListResponse<Cell>>, (StatusCode, Json<ErrorResponse>)> {
    let cells = state
        .service
        .cells(document_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Document"))?;
    Ok(Json(ListResponse::new(cells)))
}

/// PUT /v1/documents/{document_id}/cells/{row_index}/{col_index} - Direct cell write
#[utoipa::path(
    put,
    path = "/v1/documents/{document_id}/cells/{row_index}/{col_index}",
    params(
        ("document_id" = Uuid, Path, description = "Document ID"),
        ("row_index" = i32, Path, description = "Zero-based row index"),
        ("col_index" = i32, Path, description = "Zero-based column index")
    ),
    request_body = PutCellRequest,
    responses(
        (status = 200, description = "Cell written", body = Cell),
        (status = 400, description = "Validation failure", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "documents"
)]
pub async fn put_cell(
    State(state): State<AppState>,
    Path((document_id, row_index, col_index)): Path<(Uuid, i32, i32)>,
    Json(req): Json<PutCellRequest>,
) -> Result<Json<Cell>, (StatusCode, Json<ErrorResponse>)> {
    validation::validate_cell_coordinates(row_index, col_index)?;
    validation::validate_cell_content(&req.content)?;

    let cell = state
        .service
        .put_cell(document_id, row_index, col_index, &req.content)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Document"))?;
    Ok(Json(cell))
}
