// Event handlers
//
// CellUpdateHandler implements the pipeline's design convention for
// enrichment output: the result is written into the column immediately to
// the right of the source column, same row. The source cell itself is
// upserted with the raw edit first so grid reads reflect the user's input
// even while enrichment is in flight.

use std::sync::Arc;

use async_trait::async_trait;
use gridflow_core::{
    CellStatus, CellUpdateNotice, CellUpdatePayload, Enricher, Event, EventHandler, GridflowError,
    Result, StatusBroadcaster, StreamMessage, EVENT_TYPE_CELL_UPDATE,
};
use gridflow_storage::StorageBackend;

pub struct CellUpdateHandler {
    storage: StorageBackend,
    broadcaster: Arc<StatusBroadcaster>,
    enricher: Arc<dyn Enricher>,
}

impl CellUpdateHandler {
    pub fn new(
        storage: StorageBackend,
        broadcaster: Arc<StatusBroadcaster>,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        Self {
            storage,
            broadcaster,
            enricher,
        }
    }

    fn notify(&self, event: &Event, notice: CellUpdateNotice) {
        self.broadcaster
            .publish(event.document_id, StreamMessage::cell_update(notice));
    }
}

#[async_trait]
impl EventHandler for CellUpdateHandler {
    fn event_type(&self) -> &str {
        EVENT_TYPE_CELL_UPDATE
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let payload = CellUpdatePayload::from_event(event)?;
        let out_col = payload.col_index + 1;

        self.notify(
            event,
            CellUpdateNotice {
                row_index: payload.row_index,
                col_index: out_col,
                status: CellStatus::Processing,
                content: None,
                progress: Some(0),
                message: None,
            },
        );

        // Record the raw edit in the source cell
        self.storage
            .upsert_cell(
                event.document_id,
                payload.row_index,
                payload.col_index,
                &payload.content,
            )
            .await
            .map_err(|e| GridflowError::storage(e.to_string()))?;

        let enriched = match self.enricher.enrich(&payload.content).await {
            Ok(content) => content,
            Err(e) => {
                self.notify(
                    event,
                    CellUpdateNotice {
                        row_index: payload.row_index,
                        col_index: out_col,
                        status: CellStatus::Error,
                        content: None,
                        progress: None,
                        message: Some(e.to_string()),
                    },
                );
                return Err(e);
            }
        };

        self.storage
            .upsert_cell(event.document_id, payload.row_index, out_col, &enriched)
            .await
            .map_err(|e| GridflowError::storage(e.to_string()))?;

        self.notify(
            event,
            CellUpdateNotice {
                row_index: payload.row_index,
                col_index: out_col,
                status: CellStatus::Completed,
                content: Some(enriched),
                progress: Some(100),
                message: None,
            },
        );

        Ok(())
    }
}
