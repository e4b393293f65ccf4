// Repository layer for PostgreSQL operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL and apply pending migrations
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ============================================
    // Documents
    // ============================================

    pub async fn create_document(&self, input: CreateDocument) -> Result<DocumentRow> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents (id, name)
            VALUES ($1, $2)
            RETURNING id, name, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRow>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, name, created_at, updated_at
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentRow>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, name, created_at, updated_at
            FROM documents
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn delete_document(&self, id: Uuid) -> Result<bool> {
        // Columns, cells, and events cascade
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ============================================
    // Columns
    // ============================================

    pub async fn create_column(&self, input: CreateColumn) -> Result<ColumnRow> {
        let row = sqlx::query_as::<_, ColumnRow>(
            r#"
            INSERT INTO columns (id, document_id, title, position)
            VALUES ($1, $2, $3, $4)
            RETURNING id, document_id, title, position
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.document_id)
        .bind(&input.title)
        .bind(input.position)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_columns(&self, document_id: Uuid) -> Result<Vec<ColumnRow>> {
        let rows = sqlx::query_as::<_, ColumnRow>(
            r#"
            SELECT id, document_id, title, position
            FROM columns
            WHERE document_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Cells
    // ============================================

    /// Conflict-safe cell write: insert if absent, overwrite if present.
    /// A single statement so two racing writers can never lose an update.
    pub async fn upsert_cell(
        &self,
        document_id: Uuid,
        row_index: i32,
        col_index: i32,
        content: &str,
    ) -> Result<CellRow> {
        let row = sqlx::query_as::<_, CellRow>(
            r#"
            INSERT INTO cells (document_id, row_index, col_index, content, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (document_id, row_index, col_index)
            DO UPDATE SET content = EXCLUDED.content, updated_at = NOW()
            RETURNING document_id, row_index, col_index, content, updated_at
            "#,
        )
        .bind(document_id)
        .bind(row_index)
        .bind(col_index)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_cells(&self, document_id: Uuid) -> Result<Vec<CellRow>> {
        let rows = sqlx::query_as::<_, CellRow>(
            r#"
            SELECT document_id, row_index, col_index, content, updated_at
            FROM cells
            WHERE document_id = $1
            ORDER BY row_index ASC, col_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn get_cell(
        &self,
        document_id: Uuid,
        row_index: i32,
        col_index: i32,
    ) -> Result<Option<CellRow>> {
        let row = sqlx::query_as::<_, CellRow>(
            r#"
            SELECT document_id, row_index, col_index, content, updated_at
            FROM cells
            WHERE document_id = $1 AND row_index = $2 AND col_index = $3
            "#,
        )
        .bind(document_id)
        .bind(row_index)
        .bind(col_index)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    // ============================================
    // Event queue
    // ============================================

    pub async fn enqueue_event(&self, input: CreateEvent) -> Result<EventRow> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            INSERT INTO events (id, document_id, event_type, payload, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING id, document_id, event_type, payload, status, retry_count,
                      last_error, next_attempt_at, created_at, processed_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.document_id)
        .bind(&input.event_type)
        .bind(&input.payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Atomically claim up to `limit` due pending events, oldest first.
    ///
    /// The select-and-mark happens in one statement; FOR UPDATE SKIP LOCKED
    /// lets concurrent claimers proceed without ever handing out the same
    /// event twice.
    pub async fn claim_events(&self, limit: i64) -> Result<Vec<EventRow>> {
        let mut rows = sqlx::query_as::<_, EventRow>(
            r#"
            UPDATE events SET status = 'processing'
            WHERE id IN (
                SELECT id FROM events
                WHERE status = 'pending'
                  AND (next_attempt_at IS NULL OR next_attempt_at <= NOW())
                ORDER BY created_at ASC, id ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, document_id, event_type, payload, status, retry_count,
                      last_error, next_attempt_at, created_at, processed_at
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // RETURNING gives no ordering guarantee; restore FIFO for callers
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    /// Terminal success transition. A no-op when the event is already
    /// terminal; returns the updated row otherwise.
    pub async fn mark_event_completed(&self, id: Uuid) -> Result<Option<EventRow>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            UPDATE events
            SET status = 'completed', processed_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            RETURNING id, document_id, event_type, payload, status, retry_count,
                      last_error, next_attempt_at, created_at, processed_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Terminal failure transition: records the error, bumps the retry
    /// counter. A no-op when the event is already terminal.
    pub async fn mark_event_failed(&self, id: Uuid, error: &str) -> Result<Option<EventRow>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            UPDATE events
            SET status = 'failed', retry_count = retry_count + 1,
                last_error = $2, processed_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            RETURNING id, document_id, event_type, payload, status, retry_count,
                      last_error, next_attempt_at, created_at, processed_at
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Requeue a failed attempt for a future retry: back to pending with
    /// the error recorded and the next attempt deferred. A no-op when the
    /// event is already terminal.
    pub async fn reschedule_event(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<Option<EventRow>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            UPDATE events
            SET status = 'pending', retry_count = retry_count + 1,
                last_error = $2, next_attempt_at = $3
            WHERE id = $1 AND status = 'processing'
            RETURNING id, document_id, event_type, payload, status, retry_count,
                      last_error, next_attempt_at, created_at, processed_at
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_event(&self, id: Uuid) -> Result<Option<EventRow>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, document_id, event_type, payload, status, retry_count,
                   last_error, next_attempt_at, created_at, processed_at
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Read-only status query: outstanding (pending + processing) events of
    /// a document, FIFO. Used for reporting and broadcast snapshots, never
    /// for claiming.
    pub async fn list_outstanding_events(&self, document_id: Uuid) -> Result<Vec<EventRow>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, document_id, event_type, payload, status, retry_count,
                   last_error, next_attempt_at, created_at, processed_at
            FROM events
            WHERE document_id = $1 AND status IN ('pending', 'processing', 'failed')
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
