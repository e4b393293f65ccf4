// Document service for business logic
//
// Documents and columns are external collaborators of the pipeline: the
// queue only needs existence checks and the ordered column list. The CRUD
// here keeps the system exercisable end to end.

use anyhow::Result;
use gridflow_core::{Cell, Column, Document};
use gridflow_storage::{CreateColumn, CreateDocument, StorageBackend};
use uuid::Uuid;

pub struct DocumentService {
    storage: StorageBackend,
}

impl DocumentService {
    pub fn new(storage: StorageBackend) -> Self {
        Self { storage }
    }

    pub async fn create(&self, name: String) -> Result<Document> {
        let row = self.storage.create_document(CreateDocument { name }).await?;
        Ok(row.into())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.storage.get_document(id).await?.map(Into::into))
    }

    pub async fn list(&self) -> Result<Vec<Document>> {
        let rows = self.storage.list_documents().await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.storage.delete_document(id).await
    }

    /// Append a column; position defaults to the end of the current list.
    pub async fn add_column(
        &self,
        document_id: Uuid,
        title: String,
        position: Option<i32>,
    ) -> Result<Option<Column>> {
        if self.storage.get_document(document_id).await?.is_none() {
            return Ok(None);
        }
        let position = match position {
            Some(p) => p,
            None => self.storage.list_columns(document_id).await?.len() as i32,
        };
        let row = self
            .storage
            .create_column(CreateColumn {
                document_id,
                title,
                position,
            })
            .await?;
        Ok(Some(row.into()))
    }

    pub async fn columns(&self, document_id: Uuid) -> Result<Vec<Column>> {
        let rows = self.storage.list_columns(document_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn cells(&self, document_id: Uuid) -> Result<Option<Vec<Cell>>> {
        if self.storage.get_document(document_id).await?.is_none() {
            return Ok(None);
        }
        let rows = self.storage.list_cells(document_id).await?;
        Ok(Some(rows.into_iter().map(Into::into).collect()))
    }

    /// Direct cell write, bypassing enrichment. Same atomic upsert the
    /// handlers use.
    pub async fn put_cell(
        &self,
        document_id: Uuid,
        row_index: i32,
        col_index: i32,
        content: &str,
    ) -> Result<Option<Cell>> {
        if self.storage.get_document(document_id).await?.is_none() {
            return Ok(None);
        }
        let row = self
            .storage
            .upsert_cell(document_id, row_index, col_index, content)
            .await?;
        Ok(Some(row.into()))
    }
}
