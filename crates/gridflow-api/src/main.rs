// Gridflow API server
// Decision: Storage backend chosen at startup (DATABASE_URL -> PostgreSQL, otherwise in-memory dev mode)
// Decision: The event processor is constructed and started here, once, and shared by handle

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use gridflow_api::{api, build_app};
use gridflow_core::{
    Cell, CellStatus, CellUpdateNotice, CellUpdatePayload, Column, Document, Enricher, Event,
    EventStatus, EventSummary, Grid, GridColumn, QueueSnapshot, StatusBroadcaster, StreamData,
    StreamKind, StreamMessage,
};
use gridflow_storage::StorageBackend;
use gridflow_worker::{CellUpdateHandler, EchoEnricher, EventProcessor, HttpEnricher, ProcessorConfig};

use api::ListResponse;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    storage_mode: String,
}

/// State for health endpoint
#[derive(Clone)]
struct HealthState {
    storage_mode: String,
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        storage_mode: state.storage_mode.clone(),
    })
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        api::documents::create_document,
        api::documents::list_documents,
        api::documents::get_document,
        api::documents::delete_document,
        api::documents::create_column,
        api::documents::list_columns,
        api::documents::list_cells,
        api::documents::put_cell,
        api::events::enqueue_event,
        api::events::list_events,
        api::events::process_events,
        api::events::stream_status,
        api::export::export_grid,
    ),
    components(
        schemas(
            Document, Column, Cell,
            Grid, GridColumn,
            Event, EventStatus, CellUpdatePayload,
            StreamMessage, StreamKind, StreamData,
            CellStatus, CellUpdateNotice, EventSummary, QueueSnapshot,
            api::documents::CreateDocumentRequest,
            api::documents::CreateColumnRequest,
            api::documents::PutCellRequest,
            api::events::EnqueueEventRequest,
            api::events::ProcessResponse,
            api::common::ErrorResponse,
            ListResponse<Document>,
            ListResponse<Column>,
            ListResponse<Cell>,
            ListResponse<Event>,
        )
    ),
    tags(
        (name = "documents", description = "Document, column, and cell endpoints"),
        (name = "events", description = "Event queue and status stream endpoints"),
        (name = "export", description = "Grid export endpoints")
    ),
    info(
        title = "Gridflow API",
        version = "0.2.0",
        description = "API for queueing cell mutations, processing them, and streaming status",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridflow=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("gridflow-api starting...");

    // Select the storage backend
    let storage = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let backend = StorageBackend::postgres(&url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Connected to database");
            backend
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage (dev mode)");
            StorageBackend::in_memory()
        }
    };
    let storage_mode = if storage.is_dev_mode() {
        "in-memory".to_string()
    } else {
        "postgres".to_string()
    };

    let broadcaster = Arc::new(StatusBroadcaster::new(256));

    // Enrichment capability: HTTP-backed when configured, echo otherwise
    let enricher: Arc<dyn Enricher> = match std::env::var("ENRICHMENT_URL") {
        Ok(url) => {
            tracing::info!(url = %url, "Using HTTP enricher");
            Arc::new(HttpEnricher::new(url, Duration::from_secs(20))?)
        }
        Err(_) => {
            tracing::warn!("ENRICHMENT_URL not set, using echo enricher (dev mode)");
            Arc::new(EchoEnricher)
        }
    };

    // Construct and start the singleton processor
    let mut processor = EventProcessor::new(
        storage.clone(),
        broadcaster.clone(),
        ProcessorConfig::default(),
    );
    processor.register_handler(Arc::new(CellUpdateHandler::new(
        storage.clone(),
        broadcaster.clone(),
        enricher,
    )));
    let processor = Arc::new(processor);
    processor.clone().start();

    // Load API prefix from environment (default: empty)
    // Example: API_PREFIX="/api" results in routes like /api/v1/documents
    let api_prefix = std::env::var("API_PREFIX").unwrap_or_default();
    if !api_prefix.is_empty() {
        tracing::info!(prefix = %api_prefix, "API prefix configured");
    }

    // Load CORS allowed origins from environment (optional)
    // Only needed when the UI is served from a different origin than the API
    let cors_origins: Vec<HeaderValue> = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| s.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();

    if cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
    }

    let api_routes = build_app(storage, broadcaster, processor.clone());

    let health_state = HealthState { storage_mode };
    let mut app = Router::new().route("/health", get(health).with_state(health_state));
    app = app.merge(build_router_with_prefix(api_routes, &api_prefix));

    // Add Swagger UI
    let app =
        app.merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    // Add CORS layer only if origins are configured
    let app = if !cors_origins.is_empty() {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::CACHE_CONTROL,
                ]),
        )
    } else {
        app
    };

    // Add tracing
    let app = app.layer(TraceLayer::new_for_http());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:9000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Build router with optional API prefix (extracted for testing)
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
