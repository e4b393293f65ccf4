// Input validation for the ingress API
//
// Last-resort validation limits to guard Gridflow from abuse.
// These are hard limits, not configurable. Values chosen to allow legitimate
// use while preventing resource exhaustion attacks.

use super::common::ErrorResponse;
use axum::http::StatusCode;
use axum::Json;

// =============================================================================
// Input Size Limits
// =============================================================================

/// Maximum size for a document name.
pub const MAX_DOCUMENT_NAME_BYTES: usize = 2 * 1024; // 2 KB

/// Maximum size for a column title.
pub const MAX_COLUMN_TITLE_BYTES: usize = 2 * 1024; // 2 KB

/// Maximum size for a single cell's content.
pub const MAX_CELL_CONTENT_BYTES: usize = 64 * 1024; // 64 KB

/// Maximum serialized size of an event payload.
pub const MAX_EVENT_PAYLOAD_BYTES: usize = 256 * 1024; // 256 KB

/// Maximum size of an event type tag.
pub const MAX_EVENT_TYPE_BYTES: usize = 128;

/// Generic validation error message returned to clients.
/// Intentionally vague to avoid leaking which field exceeded limits.
pub const VALIDATION_ERROR_MESSAGE: &str = "Input exceeds allowed limits";

// =============================================================================
// Validation Functions
// =============================================================================

/// Validation error - returns generic message to avoid leaking details
pub struct ValidationError;

impl From<ValidationError> for StatusCode {
    fn from(_: ValidationError) -> Self {
        StatusCode::BAD_REQUEST
    }
}

impl From<ValidationError> for (StatusCode, Json<ErrorResponse>) {
    fn from(_: ValidationError) -> Self {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(VALIDATION_ERROR_MESSAGE)),
        )
    }
}

/// Validate document name size
pub fn validate_document_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() || name.len() > MAX_DOCUMENT_NAME_BYTES {
        tracing::warn!(
            "Document name outside limits: {} bytes (max: {})",
            name.len(),
            MAX_DOCUMENT_NAME_BYTES
        );
        return Err(ValidationError);
    }
    Ok(())
}

/// Validate column title size
pub fn validate_column_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() || title.len() > MAX_COLUMN_TITLE_BYTES {
        tracing::warn!(
            "Column title outside limits: {} bytes (max: {})",
            title.len(),
            MAX_COLUMN_TITLE_BYTES
        );
        return Err(ValidationError);
    }
    Ok(())
}

/// Validate cell content size
pub fn validate_cell_content(content: &str) -> Result<(), ValidationError> {
    if content.len() > MAX_CELL_CONTENT_BYTES {
        tracing::warn!(
            "Cell content exceeds limit: {} bytes (max: {})",
            content.len(),
            MAX_CELL_CONTENT_BYTES
        );
        return Err(ValidationError);
    }
    Ok(())
}

/// Validate event type tag
pub fn validate_event_type(event_type: &str) -> Result<(), ValidationError> {
    if event_type.trim().is_empty() || event_type.len() > MAX_EVENT_TYPE_BYTES {
        tracing::warn!(
            "Event type outside limits: {} bytes (max: {})",
            event_type.len(),
            MAX_EVENT_TYPE_BYTES
        );
        return Err(ValidationError);
    }
    Ok(())
}

/// Validate serialized event payload size
pub fn validate_event_payload(payload: &serde_json::Value) -> Result<(), ValidationError> {
    let size = serde_json::to_string(payload).map(|s| s.len()).unwrap_or(0);
    if size > MAX_EVENT_PAYLOAD_BYTES {
        tracing::warn!(
            "Event payload exceeds limit: {} bytes (max: {})",
            size,
            MAX_EVENT_PAYLOAD_BYTES
        );
        return Err(ValidationError);
    }
    Ok(())
}

/// Validate a cell coordinate pair (malformed identifiers are rejected at
/// the boundary, never enqueued)
pub fn validate_cell_coordinates(row_index: i32, col_index: i32) -> Result<(), ValidationError> {
    if row_index < 0 || col_index < 0 {
        tracing::warn!(
            "Negative cell coordinates: ({}, {})",
            row_index,
            col_index
        );
        return Err(ValidationError);
    }
    Ok(())
}
