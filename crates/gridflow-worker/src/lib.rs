// Background processor for Gridflow
//
// Drives the event queue to empty without operator intervention: claims
// pending events in small batches, dispatches each to the handler
// registered for its type, applies the bounded retry policy, and pushes
// queue/cell state changes through the status broadcaster.

pub mod enrich;
pub mod handlers;
pub mod processor;

pub use enrich::{EchoEnricher, HttpEnricher};
pub use handlers::CellUpdateHandler;
pub use processor::{EventProcessor, ProcessReport, ProcessorConfig};
