// Gridflow core domain types
//
// This crate defines the runtime abstractions shared by the API and worker:
// the queued Event model and its state machine, cell/grid types, the
// status broadcaster, and the pluggable handler/enricher traits.
// It has NO dependency on storage - persistence lives in gridflow-storage.

pub mod cell;
pub mod error;
pub mod event;
pub mod handler;
pub mod stream;

pub use cell::{Cell, Column, Document, Grid, GridColumn};
pub use error::{GridflowError, Result};
pub use event::{CellUpdatePayload, Event, EventStatus, EVENT_TYPE_CELL_UPDATE};
pub use handler::{Enricher, EventHandler};
pub use stream::{
    CellStatus, CellUpdateNotice, EventSummary, QueueSnapshot, StatusBroadcaster, StreamData,
    StreamKind, StreamMessage,
};
