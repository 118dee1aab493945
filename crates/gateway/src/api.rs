//! Request handlers and their wire types.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Json;
use depo_core::error::Error;
use depo_core::strategy::StrategyKind;
use depo_core::trace::FeedbackRecord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::SharedState;

/// Stored name for uploads that arrive without a usable filename.
pub const DEFAULT_UPLOAD_NAME: &str = "document.txt";

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

/// Map a turn failure to its HTTP status.
fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::Provider(_) => StatusCode::BAD_GATEWAY,
        Error::Config { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ── Health / frameworks ───────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".into() })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FrameworksResponse {
    pub active: String,
    pub supported: Vec<String>,
}

pub async fn frameworks_handler(State(state): State<SharedState>) -> Json<FrameworksResponse> {
    Json(FrameworksResponse {
        active: state.strategy.to_string(),
        supported: StrategyKind::supported().into_iter().map(String::from).collect(),
    })
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: String,
    pub message: String,
    /// Stored name of an earlier upload to bind before the turn.
    #[serde(default)]
    pub document_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub assistant_message: String,
    pub span_id: Option<String>,
    pub root_span_id: Option<String>,
}

/// Reduce a client-supplied name to its final path component.
pub fn sanitize_filename(name: Option<&str>) -> String {
    name.and_then(|n| Path::new(n.trim()).file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(String::from)
        .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string())
}

/// Path of an uploaded document if it exists under `uploads_dir`.
async fn resolve_upload(uploads_dir: &Path, document_id: &str) -> Option<PathBuf> {
    let name = Path::new(document_id).file_name()?;
    let path = uploads_dir.join(name);
    match tokio::fs::try_exists(&path).await {
        Ok(true) => Some(path),
        _ => None,
    }
}

pub async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.conversation_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "conversation_id must not be empty"));
    }
    if payload.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }
    info!(conversation_id = %payload.conversation_id, "Chat request");

    if let Some(document_id) = payload.document_id.as_deref().filter(|d| !d.is_empty()) {
        match resolve_upload(&state.uploads_dir, document_id).await {
            Some(path) => {
                let path = path.display().to_string();
                state
                    .sessions
                    .update_document_ref(&payload.conversation_id, &path)
                    .await
                    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            }
            None => warn!(document_id, "Ignoring unknown document_id"),
        }
    }

    let outcome = state
        .orchestrator
        .handle_turn(&payload.conversation_id, &payload.message)
        .await
        .map_err(|e| {
            error!(conversation_id = %payload.conversation_id, error = %e, "Chat turn failed");
            api_error(status_for(&e), e.to_string())
        })?;

    Ok(Json(ChatResponse {
        conversation_id: outcome.conversation_id,
        assistant_message: outcome.assistant_message,
        span_id: outcome.span_id,
        root_span_id: outcome.root_span_id,
    }))
}

// ── Upload ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub conversation_id: String,
    pub document_id: String,
}

pub async fn upload_handler(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut conversation_id = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        match field.name() {
            Some("conversation_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
                conversation_id = Some(text.trim().to_string());
            }
            Some("file") => {
                let name = sanitize_filename(field.file_name());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
                file = Some((name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let conversation_id = conversation_id
        .filter(|c| !c.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "conversation_id is required"))?;
    let (name, bytes) = file.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "file is required"))?;

    let document_id = format!("{}_{name}", uuid::Uuid::new_v4());
    let path = state.uploads_dir.join(&document_id);
    let write = async {
        tokio::fs::create_dir_all(&state.uploads_dir).await?;
        tokio::fs::write(&path, &bytes).await
    };
    write.await.map_err(|e| {
        error!(path = %path.display(), error = %e, "Could not store upload");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "could not store upload")
    })?;

    state
        .sessions
        .update_document_ref(&conversation_id, &path.display().to_string())
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(conversation_id = %conversation_id, document_id = %document_id, bytes = bytes.len(), "Document uploaded");
    Ok(Json(UploadResponse {
        status: "ok".into(),
        conversation_id,
        document_id,
    }))
}

// ── Feedback ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Up,
    Down,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub span_id: String,
    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Translate a request into the sink's feedback record.
pub fn feedback_record(request: FeedbackRequest) -> Result<FeedbackRecord, &'static str> {
    let comment = request.comment.filter(|c| !c.trim().is_empty());
    if request.rating.is_none() && comment.is_none() {
        return Err("rating or comment must be provided");
    }
    let (scores, tags) = match request.rating {
        Some(rating) => {
            let (score, tag) = match rating {
                Rating::Up => (1.0, "thumbs_up"),
                Rating::Down => (0.0, "thumbs_down"),
            };
            let mut scores = serde_json::Map::new();
            scores.insert("thumbs_up".into(), serde_json::json!(score));
            (Some(scores), Some(vec![tag.to_string()]))
        }
        None => (None, None),
    };
    Ok(FeedbackRecord {
        span_id: request.span_id,
        scores,
        comment,
        tags,
    })
}

pub async fn feedback_handler(
    State(state): State<SharedState>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    if payload.span_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "span_id must not be empty"));
    }
    let record = feedback_record(payload).map_err(|msg| api_error(StatusCode::BAD_REQUEST, msg))?;
    let span_id = record.span_id.clone();
    // Trace delivery never changes the response; only validation does.
    match state.trace.log_feedback(record) {
        Ok(()) => info!(span_id = %span_id, "Feedback recorded"),
        Err(e) => warn!(span_id = %span_id, error = %e, "Could not record feedback"),
    }
    Ok(Json(StatusResponse { status: "ok".into() }))
}
