// Gridflow API library
// Decision: Shared library for the server binary and router-level tests

// API routes and types (shared for OpenAPI generation)
pub mod api;

// Services layer
pub mod services;

use std::sync::Arc;

use axum::Router;
use gridflow_core::StatusBroadcaster;
use gridflow_storage::StorageBackend;
use gridflow_worker::EventProcessor;

/// Build the full API router from shared dependencies.
///
/// Extracted from the binary so tests can drive the exact production
/// routes against an in-memory backend.
pub fn build_app(
    storage: StorageBackend,
    broadcaster: Arc<StatusBroadcaster>,
    processor: Arc<EventProcessor>,
) -> Router {
    let documents_state = api::documents::AppState::new(storage.clone());
    let events_state = api::events::AppState::new(storage.clone(), broadcaster, processor);
    let export_state = api::export::AppState::new(storage);

    Router::new()
        .merge(api::documents::routes(documents_state))
        .merge(api::events::routes(events_state))
        .merge(api::export::routes(export_state))
}
