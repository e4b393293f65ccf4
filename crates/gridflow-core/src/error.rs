// Error types for the cell-update pipeline

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, GridflowError>;

/// Errors that can occur while running the pipeline
#[derive(Debug, Error)]
pub enum GridflowError {
    /// Storage layer error (queue or cell store unavailable)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Event handler execution error
    #[error("Handler error: {0}")]
    Handler(String),

    /// No handler registered for an event type
    #[error("No handler registered for event type: {0}")]
    UnknownEventType(String),

    /// Handler exceeded its execution deadline
    #[error("Handler timed out after {0} seconds")]
    HandlerTimeout(u64),

    /// Event payload did not match the handler's expected shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Document lookup failed
    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    /// Enrichment call failed
    #[error("Enrichment error: {0}")]
    Enrichment(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GridflowError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        GridflowError::Storage(msg.into())
    }

    /// Create a handler error
    pub fn handler(msg: impl Into<String>) -> Self {
        GridflowError::Handler(msg.into())
    }

    /// Create an invalid-payload error
    pub fn payload(msg: impl Into<String>) -> Self {
        GridflowError::InvalidPayload(msg.into())
    }

    /// Create an enrichment error
    pub fn enrichment(msg: impl Into<String>) -> Self {
        GridflowError::Enrichment(msg.into())
    }
}
