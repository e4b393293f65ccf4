// Database models (internal, may differ from public DTOs)

use chrono::{DateTime, Utc};
use gridflow_core::{Cell, Column, Document, Event, EventStatus};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================
// Document models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateDocument {
    pub name: String,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ============================================
// Column models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct ColumnRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub title: String,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct CreateColumn {
    pub document_id: Uuid,
    pub title: String,
    pub position: i32,
}

impl From<ColumnRow> for Column {
    fn from(row: ColumnRow) -> Self {
        Column {
            id: row.id,
            document_id: row.document_id,
            title: row.title,
            position: row.position,
        }
    }
}

// ============================================
// Cell models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct CellRow {
    pub document_id: Uuid,
    pub row_index: i32,
    pub col_index: i32,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

impl From<CellRow> for Cell {
    fn from(row: CellRow) -> Self {
        Cell {
            document_id: row.document_id,
            row_index: row.row_index,
            col_index: row.col_index,
            content: row.content,
            updated_at: row.updated_at,
        }
    }
}

// ============================================
// Event queue models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateEvent {
    pub document_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            document_id: row.document_id,
            event_type: row.event_type,
            payload: row.payload,
            status: EventStatus::from(row.status.as_str()),
            retry_count: row.retry_count,
            last_error: row.last_error,
            created_at: row.created_at,
            processed_at: row.processed_at,
        }
    }
}
