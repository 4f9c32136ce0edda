//! HTTP API server.
//!
//! Exposes the upload and search boundaries plus project/document CRUD as
//! a JSON API. Validation failures return `400 {"error": ...}`, missing
//! resources `404`, and storage/search failures `500`, all with the same
//! flat error body. CORS is fully open to support browser dashboards.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/projects` | Create a project |
//! | `GET`  | `/projects?companyId=` | List projects with document stats |
//! | `GET`  | `/projects/{id}` | Fetch a project |
//! | `DELETE` | `/projects/{id}` | Delete a project and everything in it |
//! | `GET`  | `/projects/{id}/documents` | List documents (status polling) |
//! | `GET`  | `/documents/{id}` | Fetch a document |
//! | `DELETE` | `/documents/{id}` | Delete a document, its chunks and bytes |
//! | `POST` | `/documents/upload` | Multipart upload (`file`, `projectId`, `companyId`) |
//! | `POST` | `/rag/search` | Similarity search over a project |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::blob::{BlobStore, FsBlobStore};
use crate::config::Config;
use crate::db;
use crate::embedding::{Embedder, EmbeddingClient};
use crate::ingest::{Ingestor, UploadError, UploadRequest, MAX_FILE_SIZE};
use crate::migrate;
use crate::models::Project;
use crate::search::SearchService;
use crate::store::{SqliteStore, Store};

/// Shared application state. Every collaborator is injected, so tests can
/// assemble the same router over fakes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub blobs: Arc<dyn BlobStore>,
    pub ingestor: Arc<Ingestor>,
    pub search: Arc<SearchService>,
    pub default_limit: usize,
}

/// Starts the API server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.storage.root.clone()));
    let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::new(&config.embedding)?);

    let state = AppState {
        store: Arc::clone(&store),
        blobs: Arc::clone(&blobs),
        ingestor: Arc::new(Ingestor::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            Arc::clone(&embedder),
            config.chunking.clone(),
        )),
        search: Arc::new(SearchService::new(
            store,
            embedder,
            config.search.match_threshold,
        )),
        default_limit: config.search.default_limit,
    };

    let app = router(state);

    tracing::info!(bind = %config.server.bind, "API server listening");
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/projects", post(handle_create_project).get(handle_list_projects))
        .route(
            "/projects/{id}",
            get(handle_get_project).delete(handle_delete_project),
        )
        .route("/projects/{id}/documents", get(handle_list_documents))
        .route(
            "/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/documents/upload", post(handle_upload))
        .route("/rag/search", post(handle_search))
        // Uploads run up to the 10 MiB file cap plus multipart framing.
        .layer(DefaultBodyLimit::max(MAX_FILE_SIZE + 64 * 1024))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// Error that renders as `{"error": message}` with a status code.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

// ============ GET /health ============

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============ Projects ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectRequest {
    company_id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
}

async fn handle_create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.company_id.trim().is_empty() || req.name.trim().is_empty() {
        return Err(bad_request("Missing required fields: companyId, name"));
    }

    let now = chrono::Utc::now().timestamp();
    let project = Project {
        id: Uuid::new_v4().to_string(),
        company_id: req.company_id,
        name: req.name,
        description: req.description,
        created_at: now,
        updated_at: now,
    };
    state
        .store
        .create_project(&project)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(json!({ "success": true, "project": project })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListProjectsQuery {
    company_id: Option<String>,
}

async fn handle_list_projects(
    State(state): State<AppState>,
    Query(query): Query<ListProjectsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let company_id = query
        .company_id
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| bad_request("Missing companyId parameter"))?;

    let projects = state
        .store
        .list_projects(&company_id)
        .await
        .map_err(|e| internal(e.to_string()))?;

    let mut out = Vec::with_capacity(projects.len());
    for project in projects {
        let stats = state
            .store
            .project_stats(&project.id)
            .await
            .unwrap_or_default();
        let mut value = serde_json::to_value(&project).map_err(|e| internal(e.to_string()))?;
        value["documentCount"] = json!(stats.document_count);
        value["readyDocuments"] = json!(stats.ready_documents);
        out.push(value);
    }

    Ok(Json(json!({ "success": true, "projects": out })))
}

async fn handle_get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project = state
        .store
        .get_project(&id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found(format!("Project not found: {}", id)))?;
    Ok(Json(json!({ "success": true, "project": project })))
}

/// Destructive and irreversible: removes the project, its documents, their
/// chunks, and their stored bytes.
async fn handle_delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let documents = state
        .store
        .list_documents(&id)
        .await
        .map_err(|e| internal(e.to_string()))?;

    for doc in &documents {
        if let Some(path) = &doc.file_path {
            if let Err(e) = state.blobs.delete(path).await {
                // Database deletion proceeds; stale objects are logged.
                tracing::warn!(document_id = %doc.id, error = %e, "failed to delete stored bytes");
            }
        }
    }

    state
        .store
        .delete_project(&id)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(json!({ "success": true })))
}

// ============ Documents ============

async fn handle_list_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let documents = state
        .store
        .list_documents(&id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(json!({ "success": true, "documents": documents })))
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let document = state
        .store
        .get_document(&id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found(format!("Document not found: {}", id)))?;
    Ok(Json(json!({ "success": true, "document": document })))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let document = state
        .store
        .get_document(&id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found(format!("Document not found: {}", id)))?;

    if let Some(path) = &document.file_path {
        if let Err(e) = state.blobs.delete(path).await {
            tracing::warn!(document_id = %document.id, error = %e, "failed to delete stored bytes");
        }
    }

    state
        .store
        .delete_document(&id)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(json!({ "success": true })))
}

// ============ POST /documents/upload ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut file_name = String::new();
    let mut content_type = None;
    let mut bytes = Vec::new();
    let mut project_id = String::new();
    let mut company_id = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().unwrap_or("").to_string();
                content_type = field.content_type().map(|ct| ct.to_string());
                bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(e.to_string()))?
                    .to_vec();
            }
            "projectId" => {
                project_id = field.text().await.map_err(|e| bad_request(e.to_string()))?;
            }
            "companyId" => {
                company_id = field.text().await.map_err(|e| bad_request(e.to_string()))?;
            }
            _ => {}
        }
    }

    let req = UploadRequest {
        file_name,
        content_type,
        bytes,
        project_id,
        company_id,
    };

    let document = state.ingestor.clone().upload(req).await.map_err(|e| match e {
        UploadError::Invalid(_) => bad_request(e.to_string()),
        UploadError::Store(_) | UploadError::Storage(_) => internal(e.to_string()),
    })?;

    Ok(Json(json!({
        "success": true,
        "document": {
            "id": document.id,
            "name": document.name,
            "status": document.status.as_str(),
        },
    })))
}

// ============ POST /rag/search ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    limit: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.query.trim().is_empty() || req.project_id.trim().is_empty() {
        return Err(bad_request("Missing required fields: query, projectId"));
    }

    let limit = req.limit.unwrap_or(state.default_limit);
    let results = state
        .search
        .search(&req.query, &req.project_id, limit)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "count": results.len(),
        "results": results,
    })))
}
