// Status stream messages and the per-document broadcaster
//
// Viewers subscribe to a document and receive a one-way sequence of JSON
// messages until they disconnect. The broadcaster decides WHAT to push and
// is independent of the transport; the SSE layer in gridflow-api only
// adapts messages onto the wire. Slow receivers that fall behind get a
// `Lagged` error and miss messages - delivery is at-most-once best effort,
// and a reconnecting viewer starts from a fresh snapshot instead of a
// replay.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::event::Event;

/// Message kind on the status stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Connected,
    StatusUpdate,
    CellUpdate,
    Error,
}

impl StreamKind {
    /// Wire name, also used as the SSE event name
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Connected => "connected",
            StreamKind::StatusUpdate => "status_update",
            StreamKind::CellUpdate => "cell_update",
            StreamKind::Error => "error",
        }
    }
}

/// Cell status as seen by viewers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

/// Queue-facing summary of an event, as carried in `data.pendingEvents`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: Uuid,
    pub event_type: String,
    pub status: crate::event::EventStatus,
    pub retry_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> Self {
        EventSummary {
            id: event.id,
            event_type: event.event_type.clone(),
            status: event.status,
            retry_count: event.retry_count,
            last_error: event.last_error.clone(),
            created_at: event.created_at,
        }
    }
}

/// Snapshot of a document's outstanding queue work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub pending_count: usize,
    pub processing_count: usize,
    pub pending_events: Vec<EventSummary>,
}

impl QueueSnapshot {
    /// Build a snapshot from the outstanding (pending + processing) events
    /// of a document, preserving their FIFO order.
    pub fn from_events(events: &[Event]) -> Self {
        use crate::event::EventStatus;
        QueueSnapshot {
            pending_count: events
                .iter()
                .filter(|e| e.status == EventStatus::Pending)
                .count(),
            processing_count: events
                .iter()
                .filter(|e| e.status == EventStatus::Processing)
                .count(),
            pending_events: events.iter().map(EventSummary::from).collect(),
        }
    }
}

/// A single cell's new state, as carried in `data.cellUpdate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CellUpdateNotice {
    pub row_index: i32,
    pub col_index: i32,
    pub status: CellStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of a stream message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct StreamData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_events: Option<Vec<EventSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_update: Option<CellUpdateNotice>,
}

/// One message on the status stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub kind: StreamKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StreamData>,
}

impl StreamMessage {
    pub fn connected() -> Self {
        StreamMessage {
            kind: StreamKind::Connected,
            timestamp: Utc::now(),
            message: Some("connected".to_string()),
            data: None,
        }
    }

    pub fn status_update(snapshot: QueueSnapshot) -> Self {
        StreamMessage {
            kind: StreamKind::StatusUpdate,
            timestamp: Utc::now(),
            message: None,
            data: Some(StreamData {
                pending_count: Some(snapshot.pending_count),
                processing_count: Some(snapshot.processing_count),
                pending_events: Some(snapshot.pending_events),
                cell_update: None,
            }),
        }
    }

    pub fn cell_update(notice: CellUpdateNotice) -> Self {
        StreamMessage {
            kind: StreamKind::CellUpdate,
            timestamp: Utc::now(),
            message: None,
            data: Some(StreamData {
                cell_update: Some(notice),
                ..StreamData::default()
            }),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamMessage {
            kind: StreamKind::Error,
            timestamp: Utc::now(),
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Per-document fan-out channel for status messages.
///
/// Each document gets its own `tokio::sync::broadcast` channel, created
/// lazily on first subscribe or publish. Channels whose last receiver has
/// disconnected are pruned on the next publish, so idle documents do not
/// accumulate senders.
pub struct StatusBroadcaster {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<StreamMessage>>>,
    capacity: usize,
}

impl StatusBroadcaster {
    /// Create a broadcaster with the given per-document buffer capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        StatusBroadcaster {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to a document's status stream.
    pub fn subscribe(&self, document_id: Uuid) -> broadcast::Receiver<StreamMessage> {
        let mut channels = self.channels.write();
        channels
            .entry(document_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish a message to every subscriber of a document.
    ///
    /// Messages for documents with no subscribers are dropped silently and
    /// the idle channel is released.
    pub fn publish(&self, document_id: Uuid, message: StreamMessage) {
        let delivered = {
            let channels = self.channels.read();
            match channels.get(&document_id) {
                Some(tx) => tx.send(message).is_ok(),
                None => return,
            }
        };
        if !delivered {
            let mut channels = self.channels.write();
            if let Some(tx) = channels.get(&document_id) {
                if tx.receiver_count() == 0 {
                    channels.remove(&document_id);
                }
            }
            tracing::debug!(document_id = %document_id, "No subscribers, channel released");
        }
    }

    /// Number of live subscribers for a document.
    pub fn subscriber_count(&self, document_id: Uuid) -> usize {
        self.channels
            .read()
            .get(&document_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of documents with an open channel.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventStatus;

    fn pending_event(document_id: Uuid) -> Event {
        Event {
            id: Uuid::now_v7(),
            document_id,
            event_type: "cell_update".to_string(),
            payload: serde_json::json!({}),
            status: EventStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = StatusBroadcaster::new(32);
        let doc = Uuid::now_v7();
        let mut rx1 = bus.subscribe(doc);
        let mut rx2 = bus.subscribe(doc);

        bus.publish(doc, StreamMessage::connected());

        assert_eq!(rx1.recv().await.unwrap().kind, StreamKind::Connected);
        assert_eq!(rx2.recv().await.unwrap().kind, StreamKind::Connected);
    }

    #[tokio::test]
    async fn test_documents_are_isolated() {
        let bus = StatusBroadcaster::new(32);
        let doc_a = Uuid::now_v7();
        let doc_b = Uuid::now_v7();
        let mut rx_a = bus.subscribe(doc_a);
        let _rx_b = bus.subscribe(doc_b);

        bus.publish(doc_b, StreamMessage::connected());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fifo_per_subscription() {
        let bus = StatusBroadcaster::new(32);
        let doc = Uuid::now_v7();
        let mut rx = bus.subscribe(doc);

        for progress in [10u8, 50, 100] {
            bus.publish(
                doc,
                StreamMessage::cell_update(CellUpdateNotice {
                    row_index: 0,
                    col_index: 1,
                    status: CellStatus::Processing,
                    content: None,
                    progress: Some(progress),
                    message: None,
                }),
            );
        }

        for expected in [10u8, 50, 100] {
            let msg = rx.recv().await.unwrap();
            let progress = msg.data.unwrap().cell_update.unwrap().progress;
            assert_eq!(progress, Some(expected));
        }
    }

    #[tokio::test]
    async fn test_idle_channel_pruned_after_disconnect() {
        let bus = StatusBroadcaster::new(32);
        let doc = Uuid::now_v7();
        let rx = bus.subscribe(doc);
        assert_eq!(bus.channel_count(), 1);

        drop(rx);
        bus.publish(doc, StreamMessage::connected());
        assert_eq!(bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = StatusBroadcaster::new(32);
        bus.publish(Uuid::now_v7(), StreamMessage::connected());
        assert_eq!(bus.channel_count(), 0);
    }

    #[test]
    fn test_snapshot_counts() {
        let doc = Uuid::now_v7();
        let mut events = vec![pending_event(doc), pending_event(doc)];
        events[1].status = EventStatus::Processing;

        let snapshot = QueueSnapshot::from_events(&events);
        assert_eq!(snapshot.pending_count, 1);
        assert_eq!(snapshot.processing_count, 1);
        assert_eq!(snapshot.pending_events.len(), 2);
    }

    #[test]
    fn test_wire_format() {
        let msg = StreamMessage::status_update(QueueSnapshot {
            pending_count: 2,
            processing_count: 1,
            pending_events: vec![],
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "status_update");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["data"]["pendingCount"], 2);
        assert_eq!(json["data"]["processingCount"], 1);
        assert!(json["data"].get("cellUpdate").is_none());

        let msg = StreamMessage::cell_update(CellUpdateNotice {
            row_index: 0,
            col_index: 1,
            status: CellStatus::Completed,
            content: Some("sunny".to_string()),
            progress: None,
            message: None,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "cell_update");
        assert_eq!(json["data"]["cellUpdate"]["rowIndex"], 0);
        assert_eq!(json["data"]["cellUpdate"]["colIndex"], 1);
        assert_eq!(json["data"]["cellUpdate"]["status"], "completed");
        assert_eq!(json["data"]["cellUpdate"]["content"], "sunny");
        assert!(json["data"]["cellUpdate"].get("progress").is_none());
    }
}
