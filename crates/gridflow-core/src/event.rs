// Event domain types
//
// An Event is one unit of queued asynchronous work targeting a single cell
// mutation. Events move through a small state machine:
//
//   pending -> processing -> { completed | failed }
//
// with a bounded-retry edge processing -> pending while attempts remain.
// Used by both API and worker crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::error::{GridflowError, Result};

/// Event type tag for cell mutation events
pub const EVENT_TYPE_CELL_UPDATE: &str = "cell_update";

/// Queue status of an event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EventStatus {
    /// True once the event can no longer transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Failed)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Pending => write!(f, "pending"),
            EventStatus::Processing => write!(f, "processing"),
            EventStatus::Completed => write!(f, "completed"),
            EventStatus::Failed => write!(f, "failed"),
        }
    }
}

impl From<&str> for EventStatus {
    fn from(s: &str) -> Self {
        match s {
            "processing" => EventStatus::Processing,
            "completed" => EventStatus::Completed,
            "failed" => EventStatus::Failed,
            _ => EventStatus::Pending,
        }
    }
}

/// A queued mutation-intent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub document_id: Uuid,
    pub event_type: String,
    /// Handler-specific payload; opaque to the queue
    pub payload: serde_json::Value,
    pub status: EventStatus,
    pub retry_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

/// Payload of a `cell_update` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CellUpdatePayload {
    pub row_index: i32,
    pub col_index: i32,
    /// Raw content the user typed into the cell
    pub content: String,
}

impl CellUpdatePayload {
    /// Parse a cell_update payload out of an event's opaque payload
    pub fn from_event(event: &Event) -> Result<Self> {
        serde_json::from_value(event.payload.clone())
            .map_err(|e| GridflowError::payload(format!("cell_update payload: {}", e)))
    }
}
