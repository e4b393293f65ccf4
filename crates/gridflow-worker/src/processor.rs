// Event processor: claims, dispatches, retries
//
// A single logical worker drains the queue. Overlapping invocations are
// harmless because the claim statement hands out each event exactly once,
// but the poll loop itself never runs twice - start() is idempotent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use gridflow_core::{
    Event, EventHandler, GridflowError, QueueSnapshot, Result, StatusBroadcaster, StreamMessage,
};
use gridflow_storage::StorageBackend;

/// Processor configuration
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Maximum events claimed per batch
    pub batch_size: i64,

    /// Minimum poll interval (when work was found)
    pub min_poll_interval: Duration,

    /// Maximum poll interval (when idle)
    pub max_poll_interval: Duration,

    /// Backoff multiplier applied when a poll finds nothing
    pub poll_backoff_multiplier: f64,

    /// Deadline for a single handler invocation
    pub handler_timeout: Duration,

    /// Total attempts before an event is permanently failed
    pub max_attempts: i32,

    /// Base delay of the retry backoff (doubles per attempt)
    pub retry_backoff_base: Duration,

    /// Upper bound on the retry backoff delay
    pub retry_backoff_cap: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            min_poll_interval: Duration::from_millis(100),
            max_poll_interval: Duration::from_secs(5),
            poll_backoff_multiplier: 1.5,
            handler_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_backoff_base: Duration::from_secs(1),
            retry_backoff_cap: Duration::from_secs(60),
        }
    }
}

impl ProcessorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, size: i64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: i32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.retry_backoff_base = base;
        self.retry_backoff_cap = cap;
        self
    }

    /// Backoff delay before attempt `n + 1`, given `n` recorded failures
    fn retry_delay(&self, failures: i32) -> Duration {
        let exp = failures.saturating_sub(1).clamp(0, 30) as u32;
        let delay = self.retry_backoff_base.saturating_mul(1u32 << exp);
        delay.min(self.retry_backoff_cap)
    }
}

/// Outcome of one processing batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessReport {
    /// Events claimed and driven to a transition this batch
    pub processed_count: usize,
}

/// Singleton background processor.
///
/// Constructed once by the application entry point, shared by Arc. Handlers
/// are registered before the processor starts; `run_once` can be called
/// synchronously (tests, the process-now trigger) without the poll loop.
pub struct EventProcessor {
    storage: StorageBackend,
    broadcaster: Arc<StatusBroadcaster>,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    config: ProcessorConfig,
    started: AtomicBool,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventProcessor {
    pub fn new(
        storage: StorageBackend,
        broadcaster: Arc<StatusBroadcaster>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            storage,
            broadcaster,
            handlers: HashMap::new(),
            config,
            started: AtomicBool::new(false),
            shutdown_tx: Mutex::new(None),
            loop_handle: Mutex::new(None),
        }
    }

    /// Register a handler under its event type tag
    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .insert(handler.event_type().to_string(), handler);
    }

    /// Claim one batch and process every claimed event.
    ///
    /// Individual handler failures are isolated - the loop continues to the
    /// next claimed event. Only a storage failure during the claim aborts
    /// the batch and surfaces to the caller.
    pub async fn run_once(&self) -> Result<ProcessReport> {
        let claimed = self
            .storage
            .claim_events(self.config.batch_size)
            .await
            .map_err(|e| GridflowError::storage(e.to_string()))?;

        if claimed.is_empty() {
            return Ok(ProcessReport { processed_count: 0 });
        }

        tracing::debug!(count = claimed.len(), "Claimed events");

        let mut processed = 0;
        for row in claimed {
            let event = Event::from(row);
            self.process_event(event).await;
            processed += 1;
        }

        Ok(ProcessReport {
            processed_count: processed,
        })
    }

    /// Idempotent start: spawns the poll loop once; later calls log and
    /// return.
    pub fn start(self: Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::info!("Event processor already started");
            return;
        }

        let (tx, rx) = watch::channel(false);
        *self.shutdown_tx.lock() = Some(tx);

        let processor = Arc::clone(&self);
        let handle = tokio::spawn(async move { processor.poll_loop(rx).await });
        *self.loop_handle.lock() = Some(handle);

        tracing::info!(
            batch_size = self.config.batch_size,
            "Event processor started"
        );
    }

    /// Signal the poll loop to exit and wait for the in-flight batch.
    /// Idempotent; a stopped processor can be started again.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }

        let tx = self.shutdown_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(true);
        }

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Poll loop join failed: {}", e);
            }
        }
        tracing::info!("Event processor stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn poll_loop(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = self.config.min_poll_interval;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.run_once().await {
                Ok(report) if report.processed_count > 0 => {
                    interval = self.config.min_poll_interval;
                }
                Ok(_) => {
                    interval = interval
                        .mul_f64(self.config.poll_backoff_multiplier)
                        .min(self.config.max_poll_interval);
                }
                Err(e) => {
                    tracing::error!("Batch failed: {}", e);
                    interval = interval
                        .mul_f64(self.config.poll_backoff_multiplier)
                        .min(self.config.max_poll_interval);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Poll loop exited");
    }

    /// Dispatch one claimed event and record its transition. Never
    /// propagates handler errors; they land on the event record.
    async fn process_event(&self, event: Event) {
        let document_id = event.document_id;

        let outcome = match self.handlers.get(&event.event_type) {
            Some(handler) => {
                match tokio::time::timeout(self.config.handler_timeout, handler.handle(&event))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(GridflowError::HandlerTimeout(
                        self.config.handler_timeout.as_secs(),
                    )),
                }
            }
            None => Err(GridflowError::UnknownEventType(event.event_type.clone())),
        };

        match outcome {
            Ok(()) => {
                if let Err(e) = self.storage.mark_event_completed(event.id).await {
                    tracing::error!(event_id = %event.id, "Failed to mark completed: {}", e);
                }
            }
            Err(err) => {
                tracing::warn!(event_id = %event.id, "Handler failed: {}", err);
                self.record_failure(&event, &err.to_string()).await;
            }
        }

        self.broadcast_snapshot(document_id).await;
    }

    /// Apply the bounded retry policy: requeue with exponential backoff
    /// while attempts remain, otherwise permanently fail.
    async fn record_failure(&self, event: &Event, error: &str) {
        let failures = event.retry_count + 1;
        let result = if failures < self.config.max_attempts {
            let delay = self.config.retry_delay(failures);
            let next_attempt_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            tracing::debug!(
                event_id = %event.id,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "Rescheduling event"
            );
            self.storage
                .reschedule_event(event.id, error, next_attempt_at)
                .await
        } else {
            tracing::warn!(event_id = %event.id, attempts = failures, "Retries exhausted");
            self.storage.mark_event_failed(event.id, error).await
        };

        if let Err(e) = result {
            tracing::error!(event_id = %event.id, "Failed to record failure: {}", e);
        }
    }

    /// Push a fresh queue snapshot to the document's subscribers.
    /// Delivery problems never surface into processing.
    async fn broadcast_snapshot(&self, document_id: Uuid) {
        match self.storage.list_outstanding_events(document_id).await {
            Ok(rows) => {
                let events: Vec<Event> = rows.into_iter().map(Event::from).collect();
                self.broadcaster.publish(
                    document_id,
                    StreamMessage::status_update(QueueSnapshot::from_events(&events)),
                );
            }
            Err(e) => {
                tracing::warn!(document_id = %document_id, "Queue snapshot failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::EchoEnricher;
    use crate::handlers::CellUpdateHandler;
    use async_trait::async_trait;
    use gridflow_core::{CellStatus, StreamKind, EVENT_TYPE_CELL_UPDATE};
    use gridflow_storage::{CreateDocument, CreateEvent};

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        fn event_type(&self) -> &str {
            EVENT_TYPE_CELL_UPDATE
        }

        async fn handle(&self, _event: &Event) -> Result<()> {
            Err(GridflowError::handler("always fails"))
        }
    }

    struct HangingHandler;

    #[async_trait]
    impl EventHandler for HangingHandler {
        fn event_type(&self) -> &str {
            EVENT_TYPE_CELL_UPDATE
        }

        async fn handle(&self, _event: &Event) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    async fn setup(config: ProcessorConfig) -> (Arc<EventProcessor>, StorageBackend, Uuid) {
        let storage = StorageBackend::in_memory();
        let broadcaster = Arc::new(StatusBroadcaster::new(32));
        let doc = storage
            .create_document(CreateDocument {
                name: "Test".to_string(),
            })
            .await
            .unwrap()
            .id;

        let mut processor =
            EventProcessor::new(storage.clone(), broadcaster.clone(), config);
        processor.register_handler(Arc::new(CellUpdateHandler::new(
            storage.clone(),
            broadcaster,
            Arc::new(EchoEnricher),
        )));
        (Arc::new(processor), storage, doc)
    }

    fn cell_update(document_id: Uuid, row: i32, col: i32, content: &str) -> CreateEvent {
        CreateEvent {
            document_id,
            event_type: EVENT_TYPE_CELL_UPDATE.to_string(),
            payload: serde_json::json!({
                "rowIndex": row,
                "colIndex": col,
                "content": content,
            }),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_enrichment() {
        let (processor, storage, doc) = setup(ProcessorConfig::default()).await;

        let event = storage
            .enqueue_event(cell_update(doc, 0, 0, "weather NYC"))
            .await
            .unwrap();

        let report = processor.run_once().await.unwrap();
        assert_eq!(report.processed_count, 1);

        let stored = storage.get_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "completed");
        assert!(stored.processed_at.is_some());

        let output = storage.get_cell(doc, 0, 1).await.unwrap().unwrap();
        assert!(!output.content.is_empty());
    }

    #[tokio::test]
    async fn test_subscriber_observes_completion() {
        let storage = StorageBackend::in_memory();
        let broadcaster = Arc::new(StatusBroadcaster::new(32));
        let doc = storage
            .create_document(CreateDocument {
                name: "Test".to_string(),
            })
            .await
            .unwrap()
            .id;

        let mut processor = EventProcessor::new(
            storage.clone(),
            broadcaster.clone(),
            ProcessorConfig::default(),
        );
        processor.register_handler(Arc::new(CellUpdateHandler::new(
            storage.clone(),
            broadcaster.clone(),
            Arc::new(EchoEnricher),
        )));

        // Subscribe before processing
        let mut rx = broadcaster.subscribe(doc);

        storage
            .enqueue_event(cell_update(doc, 0, 0, "weather NYC"))
            .await
            .unwrap();
        processor.run_once().await.unwrap();

        let mut saw_completed_cell = false;
        while let Ok(msg) = rx.try_recv() {
            if msg.kind == StreamKind::CellUpdate {
                let notice = msg.data.unwrap().cell_update.unwrap();
                if notice.status == CellStatus::Completed {
                    assert_eq!(notice.row_index, 0);
                    assert_eq!(notice.col_index, 1);
                    saw_completed_cell = true;
                }
            }
        }
        assert!(saw_completed_cell);
    }

    #[tokio::test]
    async fn test_batch_processes_multiple_events() {
        let (processor, storage, doc) = setup(ProcessorConfig::default()).await;

        let e1 = storage
            .enqueue_event(cell_update(doc, 0, 0, "first"))
            .await
            .unwrap();
        let e2 = storage
            .enqueue_event(cell_update(doc, 1, 0, "second"))
            .await
            .unwrap();

        let report = processor.run_once().await.unwrap();
        assert_eq!(report.processed_count, 2);

        for id in [e1.id, e2.id] {
            let stored = storage.get_event(id).await.unwrap().unwrap();
            assert_eq!(stored.status, "completed");
        }
        assert!(storage.get_cell(doc, 0, 1).await.unwrap().is_some());
        assert!(storage.get_cell(doc, 1, 1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let (processor, storage, doc) = setup(ProcessorConfig::default()).await;

        // Malformed payload fails its handler; the healthy event still runs
        let bad = storage
            .enqueue_event(CreateEvent {
                document_id: doc,
                event_type: EVENT_TYPE_CELL_UPDATE.to_string(),
                payload: serde_json::json!({"bogus": true}),
            })
            .await
            .unwrap();
        let good = storage
            .enqueue_event(cell_update(doc, 0, 0, "ok"))
            .await
            .unwrap();

        let report = processor.run_once().await.unwrap();
        assert_eq!(report.processed_count, 2);

        let good_row = storage.get_event(good.id).await.unwrap().unwrap();
        assert_eq!(good_row.status, "completed");

        // The malformed event was requeued for a retry with its error recorded
        let bad_row = storage.get_event(bad.id).await.unwrap().unwrap();
        assert_eq!(bad_row.status, "pending");
        assert_eq!(bad_row.retry_count, 1);
        assert!(bad_row.last_error.unwrap().contains("payload"));
    }

    #[tokio::test]
    async fn test_retries_exhaust_to_permanent_failure() {
        let storage = StorageBackend::in_memory();
        let broadcaster = Arc::new(StatusBroadcaster::new(32));
        let doc = storage
            .create_document(CreateDocument {
                name: "Test".to_string(),
            })
            .await
            .unwrap()
            .id;

        let config = ProcessorConfig::default()
            .with_max_attempts(3)
            .with_retry_backoff(Duration::ZERO, Duration::ZERO);
        let mut processor = EventProcessor::new(storage.clone(), broadcaster, config);
        processor.register_handler(Arc::new(FailingHandler));

        let event = storage
            .enqueue_event(cell_update(doc, 0, 0, "q"))
            .await
            .unwrap();

        for _ in 0..3 {
            processor.run_once().await.unwrap();
        }

        let stored = storage.get_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "failed");
        assert_eq!(stored.retry_count, 3);
        assert!(stored.last_error.unwrap().contains("always fails"));

        // Permanently failed: nothing left to claim
        let report = processor.run_once().await.unwrap();
        assert_eq!(report.processed_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_event_type_failure_is_recorded() {
        let (processor, storage, doc) = setup(ProcessorConfig::default()).await;

        let event = storage
            .enqueue_event(CreateEvent {
                document_id: doc,
                event_type: "unsupported".to_string(),
                payload: serde_json::json!({}),
            })
            .await
            .unwrap();

        processor.run_once().await.unwrap();

        let stored = storage.get_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "pending"); // first attempt requeued
        assert!(stored
            .last_error
            .unwrap()
            .contains("No handler registered"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_handler_is_timed_out() {
        let storage = StorageBackend::in_memory();
        let broadcaster = Arc::new(StatusBroadcaster::new(32));
        let doc = storage
            .create_document(CreateDocument {
                name: "Test".to_string(),
            })
            .await
            .unwrap()
            .id;

        let config = ProcessorConfig::default()
            .with_handler_timeout(Duration::from_millis(50))
            .with_max_attempts(1);
        let mut processor = EventProcessor::new(storage.clone(), broadcaster, config);
        processor.register_handler(Arc::new(HangingHandler));

        let event = storage
            .enqueue_event(cell_update(doc, 0, 0, "q"))
            .await
            .unwrap();

        processor.run_once().await.unwrap();

        let stored = storage.get_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "failed");
        assert!(stored.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_joins() {
        let (processor, storage, doc) = setup(ProcessorConfig::default()).await;

        processor.clone().start();
        processor.clone().start(); // second start is a no-op
        assert!(processor.is_started());

        storage
            .enqueue_event(cell_update(doc, 0, 0, "polled"))
            .await
            .unwrap();

        // The poll loop picks the event up without an explicit trigger
        let mut done = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if storage.get_cell(doc, 0, 1).await.unwrap().is_some() {
                done = true;
                break;
            }
        }
        assert!(done, "poll loop never processed the event");

        processor.stop().await;
        assert!(!processor.is_started());
        processor.stop().await; // idempotent
    }
}
