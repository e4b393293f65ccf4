// In-memory storage implementation for dev mode
// Decision: Use parking_lot for thread-safe access
// Decision: UUIDs generated via uuid v7 (time-ordered)
//
// This implementation provides a PostgreSQL-compatible API backed by in-memory
// HashMaps, allowing the server and tests to run without a database. Claim
// atomicity comes from holding the events write lock for the whole
// select-and-mark pass.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::*;

/// In-memory database for dev mode
/// All data is stored in memory and lost on restart
#[derive(Default)]
pub struct InMemoryDatabase {
    documents: RwLock<HashMap<Uuid, DocumentRow>>,
    columns: RwLock<HashMap<Uuid, ColumnRow>>,
    cells: RwLock<HashMap<(Uuid, i32, i32), CellRow>>,
    events: RwLock<HashMap<Uuid, EventRow>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    // ============================================
    // Documents
    // ============================================

    pub async fn create_document(&self, input: CreateDocument) -> Result<DocumentRow> {
        let now = Self::now();
        let row = DocumentRow {
            id: Uuid::now_v7(),
            name: input.name,
            created_at: now,
            updated_at: now,
        };
        self.documents.write().insert(row.id, row.clone());
        Ok(row)
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRow>> {
        Ok(self.documents.read().get(&id).cloned())
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentRow>> {
        let documents = self.documents.read();
        let mut result: Vec<_> = documents.values().cloned().collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    pub async fn delete_document(&self, id: Uuid) -> Result<bool> {
        // Mirror the Postgres cascade
        self.columns.write().retain(|_, c| c.document_id != id);
        self.cells.write().retain(|(doc, _, _), _| *doc != id);
        self.events.write().retain(|_, e| e.document_id != id);
        Ok(self.documents.write().remove(&id).is_some())
    }

    // ============================================
    // Columns
    // ============================================

    pub async fn create_column(&self, input: CreateColumn) -> Result<ColumnRow> {
        let row = ColumnRow {
            id: Uuid::now_v7(),
            document_id: input.document_id,
            title: input.title,
            position: input.position,
        };
        self.columns.write().insert(row.id, row.clone());
        Ok(row)
    }

    pub async fn list_columns(&self, document_id: Uuid) -> Result<Vec<ColumnRow>> {
        let columns = self.columns.read();
        let mut result: Vec<_> = columns
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        result.sort_by_key(|c| c.position);
        Ok(result)
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
        let mut cells = self.cells.write();
        let row = cells
            .entry((document_id, row_index, col_index))
            .and_modify(|c| {
                c.content = content.to_string();
                c.updated_at = Self::now();
            })
            .or_insert_with(|| CellRow {
                document_id,
                row_index,
                col_index,
                content: content.to_string(),
                updated_at: Self::now(),
            });
        Ok(row.clone())
    }

    pub async fn list_cells(&self, document_id: Uuid) -> Result<Vec<CellRow>> {
        let cells = self.cells.read();
        let mut result: Vec<_> = cells
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        result.sort_by_key(|c| (c.row_index, c.col_index));
        Ok(result)
    }

    pub async fn get_cell(
        &self,
        document_id: Uuid,
        row_index: i32,
        col_index: i32,
    ) -> Result<Option<CellRow>> {
        Ok(self
            .cells
            .read()
            .get(&(document_id, row_index, col_index))
            .cloned())
    }

    // ============================================
    // Event queue
    // ============================================

    pub async fn enqueue_event(&self, input: CreateEvent) -> Result<EventRow> {
        let row = EventRow {
            id: Uuid::now_v7(),
            document_id: input.document_id,
            event_type: input.event_type,
            payload: input.payload,
            status: "pending".to_string(),
            retry_count: 0,
            last_error: None,
            next_attempt_at: None,
            created_at: Self::now(),
            processed_at: None,
        };
        self.events.write().insert(row.id, row.clone());
        Ok(row)
    }

    pub async fn claim_events(&self, limit: i64) -> Result<Vec<EventRow>> {
        let now = Self::now();
        let mut events = self.events.write();

        // Select-and-mark under one write lock: FIFO over due pending events
        let mut due: Vec<Uuid> = events
            .values()
            .filter(|e| {
                e.status == "pending" && e.next_attempt_at.map(|t| t <= now).unwrap_or(true)
            })
            .map(|e| e.id)
            .collect();
        due.sort_by_key(|id| {
            let e = &events[id];
            (e.created_at, e.id)
        });
        due.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(event) = events.get_mut(&id) {
                event.status = "processing".to_string();
                claimed.push(event.clone());
            }
        }
        Ok(claimed)
    }

    pub async fn mark_event_completed(&self, id: Uuid) -> Result<Option<EventRow>> {
        let mut events = self.events.write();
        if let Some(event) = events.get_mut(&id) {
            if event.status == "pending" || event.status == "processing" {
                event.status = "completed".to_string();
                event.processed_at = Some(Self::now());
                return Ok(Some(event.clone()));
            }
        }
        Ok(None)
    }

    pub async fn mark_event_failed(&self, id: Uuid, error: &str) -> Result<Option<EventRow>> {
        let mut events = self.events.write();
        if let Some(event) = events.get_mut(&id) {
            if event.status == "pending" || event.status == "processing" {
                event.status = "failed".to_string();
                event.retry_count += 1;
                event.last_error = Some(error.to_string());
                event.processed_at = Some(Self::now());
                return Ok(Some(event.clone()));
            }
        }
        Ok(None)
    }

    pub async fn reschedule_event(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<Option<EventRow>> {
        let mut events = self.events.write();
        if let Some(event) = events.get_mut(&id) {
            if event.status == "processing" {
                event.status = "pending".to_string();
                event.retry_count += 1;
                event.last_error = Some(error.to_string());
                event.next_attempt_at = Some(next_attempt_at);
                return Ok(Some(event.clone()));
            }
        }
        Ok(None)
    }

    pub async fn get_event(&self, id: Uuid) -> Result<Option<EventRow>> {
        Ok(self.events.read().get(&id).cloned())
    }

    pub async fn list_outstanding_events(&self, document_id: Uuid) -> Result<Vec<EventRow>> {
        let events = self.events.read();
        let mut result: Vec<_> = events
            .values()
            .filter(|e| {
                e.document_id == document_id
                    && matches!(e.status.as_str(), "pending" | "processing" | "failed")
            })
            .cloned()
            .collect();
        result.sort_by_key(|e| (e.created_at, e.id));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn document(db: &InMemoryDatabase) -> Uuid {
        db.create_document(CreateDocument {
            name: "Test Document".to_string(),
        })
        .await
        .unwrap()
        .id
    }

    fn cell_update(document_id: Uuid) -> CreateEvent {
        CreateEvent {
            document_id,
            event_type: "cell_update".to_string(),
            payload: serde_json::json!({"rowIndex": 0, "colIndex": 0, "content": "x"}),
        }
    }

    #[tokio::test]
    async fn test_upsert_cell_last_write_wins() {
        let db = InMemoryDatabase::new();
        let doc = document(&db).await;

        db.upsert_cell(doc, 0, 0, "first").await.unwrap();
        db.upsert_cell(doc, 0, 0, "second").await.unwrap();

        let cells = db.list_cells(doc).await.unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].content, "second");
    }

    #[tokio::test]
    async fn test_claim_is_fifo() {
        let db = InMemoryDatabase::new();
        let doc = document(&db).await;

        let e1 = db.enqueue_event(cell_update(doc)).await.unwrap();
        let e2 = db.enqueue_event(cell_update(doc)).await.unwrap();
        let _e3 = db.enqueue_event(cell_update(doc)).await.unwrap();

        let claimed = db.claim_events(2).await.unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].id, e1.id);
        assert_eq!(claimed[1].id, e2.id);
        assert!(claimed.iter().all(|e| e.status == "processing"));
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_overlap() {
        let db = Arc::new(InMemoryDatabase::new());
        let doc = document(&db).await;
        for _ in 0..20 {
            db.enqueue_event(cell_update(doc)).await.unwrap();
        }

        let mut handles = vec![];
        for _ in 0..4 {
            let db = db.clone();
            handles.push(tokio::spawn(async move { db.claim_events(10).await.unwrap() }));
        }

        let mut seen = std::collections::HashSet::new();
        let mut total = 0;
        for handle in handles {
            for event in handle.await.unwrap() {
                assert!(seen.insert(event.id), "event claimed twice: {}", event.id);
                total += 1;
            }
        }
        assert_eq!(total, 20);
    }

    #[tokio::test]
    async fn test_completed_is_terminal() {
        let db = InMemoryDatabase::new();
        let doc = document(&db).await;
        let event = db.enqueue_event(cell_update(doc)).await.unwrap();

        db.claim_events(1).await.unwrap();
        let completed = db.mark_event_completed(event.id).await.unwrap().unwrap();
        assert_eq!(completed.status, "completed");

        // Subsequent terminal transitions are no-ops
        assert!(db.mark_event_failed(event.id, "late").await.unwrap().is_none());
        assert!(db.mark_event_completed(event.id).await.unwrap().is_none());

        let current = db.get_event(event.id).await.unwrap().unwrap();
        assert_eq!(current.status, "completed");
        assert!(current.last_error.is_none());
    }

    #[tokio::test]
    async fn test_reschedule_defers_next_claim() {
        let db = InMemoryDatabase::new();
        let doc = document(&db).await;
        let event = db.enqueue_event(cell_update(doc)).await.unwrap();

        db.claim_events(1).await.unwrap();
        let later = Utc::now() + chrono::Duration::seconds(60);
        let rescheduled = db
            .reschedule_event(event.id, "upstream 503", later)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rescheduled.status, "pending");
        assert_eq!(rescheduled.retry_count, 1);

        // Not due yet, so a claim finds nothing
        assert!(db.claim_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outstanding_includes_failed_for_visibility() {
        let db = InMemoryDatabase::new();
        let doc = document(&db).await;
        let event = db.enqueue_event(cell_update(doc)).await.unwrap();
        db.claim_events(1).await.unwrap();
        db.mark_event_failed(event.id, "boom").await.unwrap();

        let outstanding = db.list_outstanding_events(doc).await.unwrap();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].status, "failed");
        assert_eq!(outstanding[0].last_error.as_deref(), Some("boom"));
    }
}
