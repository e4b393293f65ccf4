// Event service for business logic
//
// Central entry point for queue ingestion and the status stream. Enqueue
// and the stream snapshot both go through here so the first status_update
// a subscriber sees matches what a direct queue query would report.

use std::sync::Arc;

use anyhow::Result;
use gridflow_core::{Event, QueueSnapshot, StatusBroadcaster, StreamMessage};
use gridflow_storage::{CreateEvent, StorageBackend};
use gridflow_worker::{EventProcessor, ProcessReport};
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct EventService {
    storage: StorageBackend,
    broadcaster: Arc<StatusBroadcaster>,
    processor: Arc<EventProcessor>,
}

impl EventService {
    pub fn new(
        storage: StorageBackend,
        broadcaster: Arc<StatusBroadcaster>,
        processor: Arc<EventProcessor>,
    ) -> Self {
        Self {
            storage,
            broadcaster,
            processor,
        }
    }

    /// Enqueue a mutation-intent for a document.
    /// Returns None when the document does not exist.
    pub async fn enqueue(
        &self,
        document_id: Uuid,
        event_type: String,
        payload: serde_json::Value,
    ) -> Result<Option<Event>> {
        if self.storage.get_document(document_id).await?.is_none() {
            return Ok(None);
        }

        let row = self
            .storage
            .enqueue_event(CreateEvent {
                document_id,
                event_type,
                payload,
            })
            .await?;
        let event = Event::from(row);

        tracing::info!(event_id = %event.id, document_id = %document_id, "Event enqueued");

        // Viewers see the new pending entry without waiting for a poll
        self.publish_snapshot(document_id).await;

        Ok(Some(event))
    }

    /// Outstanding events of a document, FIFO. Reporting only.
    pub async fn list(&self, document_id: Uuid) -> Result<Option<Vec<Event>>> {
        if self.storage.get_document(document_id).await?.is_none() {
            return Ok(None);
        }
        let rows = self.storage.list_outstanding_events(document_id).await?;
        Ok(Some(rows.into_iter().map(Event::from).collect()))
    }

    /// Run one processing batch synchronously ("process now").
    pub async fn process_now(&self) -> gridflow_core::Result<ProcessReport> {
        self.processor.run_once().await
    }

    /// Current queue snapshot for a document.
    pub async fn snapshot(&self, document_id: Uuid) -> Result<QueueSnapshot> {
        let rows = self.storage.list_outstanding_events(document_id).await?;
        let events: Vec<Event> = rows.into_iter().map(Event::from).collect();
        Ok(QueueSnapshot::from_events(&events))
    }

    /// Open a status stream for a document: the initial `connected` +
    /// `status_update` pair, then the live receiver.
    ///
    /// The receiver is subscribed before the snapshot is taken so no
    /// transition between the two can be missed (duplicates are fine,
    /// snapshots are idempotently re-derivable).
    ///
    /// Returns None when the document does not exist.
    pub async fn open_stream(
        &self,
        document_id: Uuid,
    ) -> Result<Option<(Vec<StreamMessage>, broadcast::Receiver<StreamMessage>)>> {
        if self.storage.get_document(document_id).await?.is_none() {
            return Ok(None);
        }

        let receiver = self.broadcaster.subscribe(document_id);
        let snapshot = self.snapshot(document_id).await?;
        let initial = vec![
            StreamMessage::connected(),
            StreamMessage::status_update(snapshot),
        ];
        Ok(Some((initial, receiver)))
    }

    async fn publish_snapshot(&self, document_id: Uuid) {
        match self.snapshot(document_id).await {
            Ok(snapshot) => {
                self.broadcaster
                    .publish(document_id, StreamMessage::status_update(snapshot));
            }
            Err(e) => {
                tracing::warn!(document_id = %document_id, "Queue snapshot failed: {}", e);
            }
        }
    }
}
