// Pluggable seams of the pipeline
//
// EventHandler is the per-event-type processing capability the background
// processor dispatches to; Enricher is the outbound lookup a cell_update
// handler performs. Both are async traits so implementations can do I/O.

use async_trait::async_trait;

use crate::error::Result;
use crate::event::Event;

/// Processing capability for one event type.
///
/// Handlers run on the processor's own execution context and must not
/// assume a request is waiting for them. Errors are recorded on the event
/// record, not propagated to the caller that enqueued it.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Event type tag this handler is registered under
    fn event_type(&self) -> &str;

    /// Process one claimed event to completion
    async fn handle(&self, event: &Event) -> Result<()>;
}

/// Outbound enrichment lookup (web search, AI call, ...).
///
/// The pipeline never depends on what enrichment actually does; the
/// processor only bounds it with a timeout and records the outcome.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Produce enrichment content for a raw cell value
    async fn enrich(&self, query: &str) -> Result<String>;
}
