// Storage backend abstraction
// Decision: Use enum dispatch for simplicity over trait objects
//
// This module provides a unified StorageBackend enum that can work with
// either PostgreSQL (production) or in-memory (dev mode) storage.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::memory::InMemoryDatabase;
use crate::models::*;
use crate::repositories::Database;

/// Storage backend that can be either PostgreSQL or in-memory
#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL database (production)
    Postgres(Database),
    /// In-memory database (dev mode)
    InMemory(std::sync::Arc<InMemoryDatabase>),
}

impl StorageBackend {
    /// Create a PostgreSQL storage backend from a database URL
    pub async fn postgres(database_url: &str) -> Result<Self> {
        let db = Database::from_url(database_url).await?;
        Ok(Self::Postgres(db))
    }

    /// Create an in-memory storage backend
    pub fn in_memory() -> Self {
        Self::InMemory(std::sync::Arc::new(InMemoryDatabase::new()))
    }

    /// Check if this is dev mode (in-memory)
    pub fn is_dev_mode(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }

    /// Get the PostgreSQL pool if using PostgreSQL backend
    /// Returns None for in-memory backend
    pub fn pool(&self) -> Option<&PgPool> {
        match self {
            Self::Postgres(db) => Some(db.pool()),
            Self::InMemory(_) => None,
        }
    }

    // ============================================
    // Documents
    // ============================================

    pub async fn create_document(&self, input: CreateDocument) -> Result<DocumentRow> {
        match self {
            Self::Postgres(db) => db.create_document(input).await,
            Self::InMemory(db) => db.create_document(input).await,
        }
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRow>> {
        match self {
            Self::Postgres(db) => db.get_document(id).await,
            Self::InMemory(db) => db.get_document(id).await,
        }
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentRow>> {
        match self {
            Self::Postgres(db) => db.list_documents().await,
            Self::InMemory(db) => db.list_documents().await,
        }
    }

    pub async fn delete_document(&self, id: Uuid) -> Result<bool> {
        match self {
            Self::Postgres(db) => db.delete_document(id).await,
            Self::InMemory(db) => db.delete_document(id).await,
        }
    }

    // ============================================
    // Columns
    // ============================================

    pub async fn create_column(&self, input: CreateColumn) -> Result<ColumnRow> {
        match self {
            Self::Postgres(db) => db.create_column(input).await,
            Self::InMemory(db) => db.create_column(input).await,
        }
    }

    pub async fn list_columns(&self, document_id: Uuid) -> Result<Vec<ColumnRow>> {
        match self {
            Self::Postgres(db) => db.list_columns(document_id).await,
            Self::InMemory(db) => db.list_columns(document_id).await,
        }
    }

    // ============================================
    // Cells
    // ============================================

    pub async fn upsert_cell(
        &self,
        document_id: Uuid,
        row_index: i32,
        col_index: i32,
        content: &str,
    ) -> Result<CellRow> {
        match self {
            Self::Postgres(db) => db.upsert_cell(document_id, row_index, col_index, content).await,
            Self::InMemory(db) => db.upsert_cell(document_id, row_index, col_index, content).await,
        }
    }

    pub async fn list_cells(&self, document_id: Uuid) -> Result<Vec<CellRow>> {
        match self {
            Self::Postgres(db) => db.list_cells(document_id).await,
            Self::InMemory(db) => db.list_cells(document_id).await,
        }
    }

    pub async fn get_cell(
        &self,
        document_id: Uuid,
        row_index: i32,
        col_index: i32,
    ) -> Result<Option<CellRow>> {
        match self {
            Self::Postgres(db) => db.get_cell(document_id, row_index, col_index).await,
            Self::InMemory(db) => db.get_cell(document_id, row_index, col_index).await,
        }
    }

    // ============================================
    // Event queue
    // ============================================

    pub async fn enqueue_event(&self, input: CreateEvent) -> Result<EventRow> {
        match self {
            Self::Postgres(db) => db.enqueue_event(input).await,
            Self::InMemory(db) => db.enqueue_event(input).await,
        }
    }

    pub async fn claim_events(&self, limit: i64) -> Result<Vec<EventRow>> {
        match self {
            Self::Postgres(db) => db.claim_events(limit).await,
            Self::InMemory(db) => db.claim_events(limit).await,
        }
    }

    pub async fn mark_event_completed(&self, id: Uuid) -> Result<Option<EventRow>> {
        match self {
            Self::Postgres(db) => db.mark_event_completed(id).await,
            Self::InMemory(db) => db.mark_event_completed(id).await,
        }
    }

    pub async fn mark_event_failed(&self, id: Uuid, error: &str) -> Result<Option<EventRow>> {
        match self {
            Self::Postgres(db) => db.mark_event_failed(id, error).await,
            Self::InMemory(db) => db.mark_event_failed(id, error).await,
        }
    }

    pub async fn reschedule_event(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<Option<EventRow>> {
        match self {
            Self::Postgres(db) => db.reschedule_event(id, error, next_attempt_at).await,
            Self::InMemory(db) => db.reschedule_event(id, error, next_attempt_at).await,
        }
    }

    pub async fn get_event(&self, id: Uuid) -> Result<Option<EventRow>> {
        match self {
            Self::Postgres(db) => db.get_event(id).await,
            Self::InMemory(db) => db.get_event(id).await,
        }
    }

    pub async fn list_outstanding_events(&self, document_id: Uuid) -> Result<Vec<EventRow>> {
        match self {
            Self::Postgres(db) => db.list_outstanding_events(document_id).await,
            Self::InMemory(db) => db.list_outstanding_events(document_id).await,
        }
    }
}
