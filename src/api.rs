//! HTTP surface: document upload and inspection, message exchange and history.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{IngestError, QueryError, StorageError};
use crate::ingest::{IngestionPipeline, IngestionReport};
use crate::models::{Document, Message, Page};
use crate::router::{Exchange, ResponseRouter};
use crate::storage::Store;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Query router.
    pub router: Arc<ResponseRouter>,
    /// Ingestion pipeline for uploads.
    pub pipeline: Arc<IngestionPipeline>,
    /// Store used for document inspection.
    pub store: Arc<dyn Store>,
    /// Directory uploads are saved under.
    pub upload_dir: PathBuf,
}

/// JSON error payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub message: String,
    /// Stable error code, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Document row created before the failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
}

/// Body of `POST /messages`.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    /// User query text.
    pub content: String,
}

/// Body of `GET /documents/{id}`.
#[derive(Debug, Serialize)]
pub struct DocumentStatus {
    /// Document row.
    #[serde(flatten)]
    pub document: Document,
    /// Pages in page-number order.
    pub pages: Vec<PageStatus>,
}

/// Per-page processing status.
#[derive(Debug, Serialize)]
pub struct PageStatus {
    /// 1-based page number.
    pub page_number: u32,
    /// True once the page's embedding is indexed.
    pub is_processed: bool,
    /// Extracted text length in characters.
    pub chars: usize,
}

impl From<Page> for PageStatus {
    fn from(page: Page) -> Self {
        Self {
            page_number: page.page_number,
            is_processed: page.is_processed,
            chars: page.content.chars().count(),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Builds the axum router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/documents", post(upload_document))
        .route("/documents/:id", get(get_document))
        .route("/messages", post(create_message).get(list_messages))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Welcome to the pagewise API" }))
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IngestionReport>), ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("invalid multipart body: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string).unwrap_or_default();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| bad_request(format!("failed to read upload: {err}")))?;
        upload = Some((file_name, bytes));
        break;
    }
    let (file_name, bytes) = upload.ok_or_else(|| bad_request("missing multipart field `file`"))?;
    let file_name =
        sanitize_file_name(&file_name).ok_or_else(|| bad_request("Only PDF files are allowed."))?;

    let path = save_upload(state.upload_dir.clone(), file_name.clone(), bytes.clone())
        .await
        .map_err(|err| {
            error!(file = %file_name, error = %err, "failed to save upload");
            internal_error("Failed to save the uploaded file.", None)
        })?;
    info!(file = %file_name, path = %path.display(), bytes = bytes.len(), "upload saved");

    let file_path = path.to_string_lossy().into_owned();
    let report = match state
        .pipeline
        .ingest(&file_name, &file_path, bytes.to_vec())
        .await
    {
        Ok(report) => report,
        Err(err) => {
            // no document row references the file unless extraction succeeded
            if matches!(err, IngestError::Extraction(_)) {
                if let Err(io) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %io, "failed to remove rejected upload");
                }
            }
            return Err(ingest_error(err));
        }
    };
    let status = if report.processed {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(report)))
}

async fn get_document(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<i64>,
) -> Result<Json<DocumentStatus>, ApiError> {
    let document = state
        .store
        .get_document(id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found(format!("document {id} not found")))?;
    let pages = state.store.list_pages(id).await.map_err(storage_error)?;
    Ok(Json(DocumentStatus {
        document,
        pages: pages.into_iter().map(PageStatus::from).collect(),
    }))
}

async fn create_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<Exchange>, ApiError> {
    if request.content.trim().is_empty() {
        return Err(bad_request("Message content cannot be empty."));
    }
    let exchange = state
        .router
        .handle(&request.content)
        .await
        .map_err(query_error)?;
    Ok(Json(exchange))
}

async fn list_messages(State(state): State<AppState>) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.router.history().await.map_err(storage_error)?;
    Ok(Json(messages))
}

/// Strips directories from an uploaded name; `None` unless it names a `.pdf`.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next()?.trim();
    if base.is_empty() || base.starts_with('.') {
        return None;
    }
    if !base.to_ascii_lowercase().ends_with(".pdf") {
        return None;
    }
    Some(base.to_string())
}

/// Writes the upload under a fresh `<uuid>-<name>` so earlier uploads of the
/// same name are never overwritten.
async fn save_upload(dir: PathBuf, file_name: String, bytes: Bytes) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(stored_file_name(&file_name));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

fn stored_file_name(file_name: &str) -> String {
    format!("{}-{file_name}", uuid::Uuid::new_v4().simple())
}

fn ingest_error(err: IngestError) -> ApiError {
    let status = match &err {
        IngestError::Extraction(_) => StatusCode::BAD_REQUEST,
        IngestError::Index { .. } => StatusCode::SERVICE_UNAVAILABLE,
        IngestError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(code = err.error_code(), document_id = ?err.document_id(), error = %err, "upload failed");
    (
        status,
        Json(ErrorBody {
            message: err.user_message(),
            code: Some(err.error_code().to_string()),
            document_id: err.document_id(),
        }),
    )
}

fn query_error(err: QueryError) -> ApiError {
    error!(code = err.error_code(), error = %err, "message handling failed");
    let status = match err {
        QueryError::Index(_) => StatusCode::SERVICE_UNAVAILABLE,
        QueryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            message: "An unexpected error occurred while processing the message.".to_string(),
            code: Some(err.error_code().to_string()),
            document_id: None,
        }),
    )
}

fn storage_error(err: StorageError) -> ApiError {
    error!(error = %err, "storage read failed");
    internal_error("An unexpected storage error occurred.", Some("STORAGE_ERROR"))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            message: message.into(),
            code: None,
            document_id: None,
        }),
    )
}

fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            message: message.into(),
            code: None,
            document_id: None,
        }),
    )
}

fn internal_error(message: impl Into<String>, code: Option<&str>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            message: message.into(),
            code: code.map(str::to_string),
            document_id: None,
        }),
    )
}
