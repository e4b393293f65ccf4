// Export service: read-only grid materialization

use anyhow::Result;
use gridflow_core::{Cell, Document, Grid, GridColumn};
use gridflow_storage::StorageBackend;
use uuid::Uuid;

pub struct ExportService {
    storage: StorageBackend,
}

impl ExportService {
    pub fn new(storage: StorageBackend) -> Self {
        Self { storage }
    }

    /// Materialize a document's full grid.
    /// Returns None when the document does not exist.
    pub async fn grid(&self, document_id: Uuid) -> Result<Option<(Document, Grid)>> {
        let document = match self.storage.get_document(document_id).await? {
            Some(row) => Document::from(row),
            None => return Ok(None),
        };

        let columns: Vec<GridColumn> = self
            .storage
            .list_columns(document_id)
            .await?
            .into_iter()
            .map(|c| GridColumn {
                title: c.title,
                position: c.position,
            })
            .collect();

        let cells: Vec<Cell> = self
            .storage
            .list_cells(document_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        Ok(Some((document, Grid::materialize(columns, &cells))))
    }
}
