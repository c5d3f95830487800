//! HTTP API for triggering extractions.
//!
//! A thin JSON layer over [`KnowledgeExtractor`]: request handlers that
//! receive "form submitted", "file uploaded" or "message sent" events call
//! these routes, and an admin UI reads back knowledge items and queue
//! state. Every request builds an extractor bound to the path's project.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/projects/{project_id}/extract/project` | Extract project metadata |
//! | `POST` | `/projects/{project_id}/extract/form-responses/{id}` | Extract a form response |
//! | `POST` | `/projects/{project_id}/extract/applet-interactions/{id}` | Extract an applet interaction |
//! | `POST` | `/projects/{project_id}/extract/files/{id}` | Extract an uploaded file |
//! | `POST` | `/projects/{project_id}/extract/chat-messages/{id}` | Extract a chat message |
//! | `GET`  | `/projects/{project_id}/queue` | List queue entries |
//! | `POST` | `/projects/{project_id}/queue` | Enqueue an extraction |
//! | `POST` | `/projects/{project_id}/queue/process` | Run one queue batch |
//! | `POST` | `/projects/{project_id}/website` | Queue a website extraction |
//! | `GET`  | `/projects/{project_id}/knowledge` | List knowledge items |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "form response not found: r1" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::adapters::applet::AppletRegistry;
use crate::config::{Config, ExtractionConfig};
use crate::error::ExtractorError;
use crate::extractor::KnowledgeExtractor;
use crate::migrate::run_migrations;
use crate::models::{ItemFilter, KnowledgeItem, QueueEntry, SourceType};
use crate::queue::QueueRunReport;
use crate::storage::{DefaultStorage, ObjectStorage};
use crate::store::{SqliteStore, Store};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
    applets: Arc<AppletRegistry>,
    extraction: ExtractionConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn ObjectStorage>,
        extraction: ExtractionConfig,
    ) -> Self {
        Self {
            store,
            storage,
            applets: Arc::new(AppletRegistry::with_builtins()),
            extraction,
        }
    }

    fn extractor(&self, project_id: String) -> KnowledgeExtractor {
        KnowledgeExtractor::new(
            project_id,
            self.store.clone(),
            self.storage.clone(),
            self.extraction.clone(),
        )
        .with_applets(self.applets.clone())
    }
}

/// Builds the router. Exposed separately from [`run_server`] so tests and
/// embedding applications can mount it themselves.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/projects/{project_id}/extract/project",
            post(handle_extract_project),
        )
        .route(
            "/projects/{project_id}/extract/form-responses/{id}",
            post(handle_extract_form_response),
        )
        .route(
            "/projects/{project_id}/extract/applet-interactions/{id}",
            post(handle_extract_applet_interaction),
        )
        .route(
            "/projects/{project_id}/extract/files/{id}",
            post(handle_extract_file),
        )
        .route(
            "/projects/{project_id}/extract/chat-messages/{id}",
            post(handle_extract_chat_message),
        )
        .route(
            "/projects/{project_id}/queue",
            get(handle_list_queue).post(handle_enqueue),
        )
        .route(
            "/projects/{project_id}/queue/process",
            post(handle_process_queue),
        )
        .route("/projects/{project_id}/website", post(handle_queue_website))
        .route("/projects/{project_id}/knowledge", get(handle_list_knowledge))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` against the configured SQLite
/// database. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::connect(config).await?;
    run_migrations(store.pool()).await?;
    let storage = DefaultStorage::new(&config.storage)?;
    let state = AppState::new(
        Arc::new(store),
        Arc::new(storage),
        config.extraction.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "knowledge pipeline listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<ExtractorError> for AppError {
    fn from(err: ExtractorError) -> Self {
        let (status, code) = match &err {
            ExtractorError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            ExtractorError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ExtractorError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        ExtractorError::Store(err).into()
    }
}

fn parse_source_type(raw: &str) -> Result<SourceType, AppError> {
    raw.parse::<SourceType>()
        .map_err(|e| bad_request(e.to_string()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /projects/{project_id}/extract/* ============

#[derive(Serialize)]
struct ItemsResponse {
    count: usize,
    items: Vec<KnowledgeItem>,
}

impl From<Vec<KnowledgeItem>> for ItemsResponse {
    fn from(items: Vec<KnowledgeItem>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

async fn handle_extract_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ItemsResponse>, AppError> {
    let items = state
        .extractor(project_id)
        .extract_from_project(None)
        .await?;
    Ok(Json(items.into()))
}

async fn handle_extract_form_response(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<Json<ItemsResponse>, AppError> {
    let items = state
        .extractor(project_id)
        .extract_from_form_response(&id)
        .await?;
    Ok(Json(items.into()))
}

async fn handle_extract_applet_interaction(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<Json<ItemsResponse>, AppError> {
    let items = state
        .extractor(project_id)
        .extract_from_applet_interaction(&id)
        .await?;
    Ok(Json(items.into()))
}

async fn handle_extract_chat_message(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<Json<ItemsResponse>, AppError> {
    let items = state
        .extractor(project_id)
        .extract_from_chat_message(&id)
        .await?;
    Ok(Json(items.into()))
}

#[derive(Serialize)]
struct FileResponse {
    item: Option<KnowledgeItem>,
}

async fn handle_extract_file(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<Json<FileResponse>, AppError> {
    let item = state.extractor(project_id).extract_from_file(&id).await?;
    Ok(Json(FileResponse { item }))
}

// ============ /projects/{project_id}/queue ============

#[derive(Deserialize)]
struct EnqueueRequest {
    source_type: String,
    source_id: String,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    source_url: Option<String>,
}

#[derive(Serialize)]
struct EnqueueResponse {
    created: bool,
}

/// Default priority for explicitly enqueued work.
const DEFAULT_PRIORITY: i64 = 5;

async fn handle_enqueue(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, AppError> {
    let source_type = parse_source_type(&req.source_type)?;
    if req.source_id.trim().is_empty() {
        return Err(bad_request("source_id must not be empty"));
    }
    let created = state
        .extractor(project_id)
        .enqueue(
            source_type,
            req.source_id.trim(),
            req.priority.unwrap_or(DEFAULT_PRIORITY),
            req.source_url,
        )
        .await?;
    Ok(Json(EnqueueResponse { created }))
}

#[derive(Serialize)]
struct QueueListResponse {
    entries: Vec<QueueEntry>,
}

async fn handle_list_queue(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<QueueListResponse>, AppError> {
    let entries = state.store.list_queue(&project_id).await?;
    Ok(Json(QueueListResponse { entries }))
}

async fn handle_process_queue(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<QueueRunReport>, AppError> {
    let report = state
        .extractor(project_id)
        .process_extraction_queue()
        .await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
struct WebsiteRequest {
    url: String,
}

async fn handle_queue_website(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(req): Json<WebsiteRequest>,
) -> Result<Json<EnqueueResponse>, AppError> {
    let created = state
        .extractor(project_id)
        .queue_website_extraction(&req.url)
        .await?;
    Ok(Json(EnqueueResponse { created }))
}

// ============ GET /projects/{project_id}/knowledge ============

#[derive(Deserialize)]
struct KnowledgeQuery {
    #[serde(default)]
    source_type: Option<String>,
    #[serde(default)]
    source_id: Option<String>,
    /// Include superseded items.
    #[serde(default)]
    all: bool,
}

async fn handle_list_knowledge(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<KnowledgeQuery>,
) -> Result<Json<ItemsResponse>, AppError> {
    let filter = ItemFilter {
        source_type: query
            .source_type
            .as_deref()
            .map(parse_source_type)
            .transpose()?,
        source_id: query.source_id,
        include_stale: query.all,
    };
    let items = state.store.list_items(&project_id, &filter).await?;
    Ok(Json(items.into()))
}
