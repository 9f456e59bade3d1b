//! 会话接口：上传、移除、预览、重置、解读、导出
//!
//! 每个 handler 先由 cookie 会话取得 [`SharedSession`]，再调用同名的无框架函数，
//! 后者可在测试中直接调用

use std::path::PathBuf;

use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tower_sessions::Session;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::model::{SessionError, SessionSnapshot, UploadedImage};
use crate::pipeline::{messages, RenderedOutcome, SharedSession};
use crate::util::logging::standards::events;
use crate::util::report::ExportArtifact;
use crate::util::ApiError;
use crate::AppState;

const SESSION_ID_KEY: &str = "lab.session_id";

/// 上传的一个文件部分
#[derive(Debug, Clone)]
pub struct IncomingPart {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InterpretSessionResponse {
    pub outcome: RenderedOutcome,
    /// false 表示运行期间图片被清空，结果未保留
    pub applied: bool,
    pub session: SessionSnapshot,
}

async fn resolve_session(app_state: &AppState, session: &Session) -> Result<SharedSession, ApiError> {
    let existing = session.get::<String>(SESSION_ID_KEY).await.map_err(|e| {
        error!(event = events::REQUEST_ERROR, error = %e, "读取会话失败");
        ApiError::internal(messages::SESSION_UNAVAILABLE)
    })?;
    let session_id = match existing {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4().to_string();
            session.insert(SESSION_ID_KEY, &id).await.map_err(|e| {
                error!(event = events::REQUEST_ERROR, error = %e, "写入会话失败");
                ApiError::internal(messages::SESSION_UNAVAILABLE)
            })?;
            id
        }
    };
    Ok(app_state.sessions.get_or_create(&session_id))
}

/// 声明类型优先，缺失时按文件名推断
pub fn resolve_content_type(declared: Option<&str>, file_name: Option<&str>) -> Option<String> {
    declared
        .map(str::trim)
        .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
        .map(|ct| ct.to_ascii_lowercase())
        .or_else(|| {
            file_name
                .and_then(|name| mime_guess::from_path(name).first())
                .map(|mime| mime.essence_str().to_string())
        })
}

// ---- handlers ----

pub async fn get_session(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let shared = resolve_session(&app_state, &session).await?;
    let snapshot = shared.lock().snapshot();
    Ok(Json(snapshot))
}

pub async fn upload_images(
    State(app_state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let shared = resolve_session(&app_state, &session).await?;

    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.file_name().is_none() && field.content_type().is_none() {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
        parts.push(IncomingPart {
            bytes: bytes.to_vec(),
            content_type,
            file_name,
        });
    }

    ingest_parts(&app_state, &shared, parts).await.map(Json)
}

pub async fn delete_image(
    State(app_state): State<AppState>,
    session: Session,
    Path(index): Path<usize>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let shared = resolve_session(&app_state, &session).await?;
    remove_image(&shared, index).map(Json)
}

pub async fn get_preview(
    State(app_state): State<AppState>,
    session: Session,
    Path(index): Path<usize>,
) -> Result<Response, ApiError> {
    let shared = resolve_session(&app_state, &session).await?;
    let (content_type, bytes) = preview_image(&shared, index)?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

pub async fn reset_session(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let shared = resolve_session(&app_state, &session).await?;
    Ok(Json(reset(&shared)))
}

pub async fn interpret_session(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<Json<InterpretSessionResponse>, ApiError> {
    let shared = resolve_session(&app_state, &session).await?;
    run_interpretation(&app_state, &shared).await.map(Json)
}

pub async fn export_session(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<Response, ApiError> {
    let shared = resolve_session(&app_state, &session).await?;
    let artifact = export_result(&app_state, &shared).await?;
    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);
    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}

// ---- operations ----

/// 按顺序接收各部分；遇到第一个失败即停止，之前接收的保留
pub async fn ingest_parts(
    app_state: &AppState,
    shared: &SharedSession,
    parts: Vec<IncomingPart>,
) -> Result<SessionSnapshot, ApiError> {
    let preview_side = app_state.config.session.preview_max_side;
    let preview_dir = app_state.config.session.preview_dir.clone().map(PathBuf::from);

    for part in parts {
        let content_type =
            resolve_content_type(part.content_type.as_deref(), part.file_name.as_deref())
                .filter(|ct| ct.starts_with("image/"));
        let Some(content_type) = content_type else {
            warn!(
                event = events::IMAGE_REJECTED,
                reason = "unsupported_media",
                declared = part.content_type.as_deref().unwrap_or(""),
                file_name = part.file_name.as_deref().unwrap_or("")
            );
            return Err(SessionError::UnsupportedMedia(
                part.content_type.unwrap_or_else(|| "unknown".to_string()),
            )
            .into());
        };

        // 先检查配额，避免为注定被拒的图片生成预览
        let quota = shared.lock().store().quota();
        if quota.is_full() {
            warn!(event = events::IMAGE_REJECTED, reason = "quota", max = quota.max());
            return Err(SessionError::QuotaExceeded { max: quota.max() }.into());
        }

        let size = part.bytes.len();
        let dir = preview_dir.clone();
        let file_name = part.file_name;
        let bytes = part.bytes;
        let image = tokio::task::spawn_blocking(move || {
            UploadedImage::ingest(bytes, content_type, file_name, preview_side, dir.as_deref())
        })
        .await
        .map_err(|e| {
            error!(event = events::IMAGE_REJECTED, error = %e);
            ApiError::internal(messages::UPLOAD_FAILED)
        })?
        .map_err(SessionError::from)?;

        let index = shared.lock().ingest(image)?;
        info!(event = events::IMAGE_INGESTED, index, size);
    }

    Ok(shared.lock().snapshot())
}

pub fn remove_image(shared: &SharedSession, index: usize) -> Result<SessionSnapshot, ApiError> {
    let mut state = shared.lock();
    state.remove(index)?;
    info!(event = events::IMAGE_REMOVED, index, remaining = state.store().len());
    Ok(state.snapshot())
}

pub fn preview_image(
    shared: &SharedSession,
    index: usize,
) -> Result<(&'static str, Vec<u8>), ApiError> {
    let state = shared.lock();
    let image = state.store().get(index).ok_or(SessionError::IndexOutOfRange {
        index,
        len: state.store().len(),
    })?;
    let bytes = image.preview().read().map_err(SessionError::from)?;
    Ok((image.preview().content_type(), bytes))
}

pub fn reset(shared: &SharedSession) -> SessionSnapshot {
    let mut state = shared.lock();
    state.reset();
    info!(event = events::SESSION_RESET);
    state.snapshot()
}

pub async fn run_interpretation(
    app_state: &AppState,
    shared: &SharedSession,
) -> Result<InterpretSessionResponse, ApiError> {
    let report = app_state.runner.run(shared).await?;
    let snapshot = shared.lock().snapshot();
    Ok(InterpretSessionResponse {
        outcome: report.outcome,
        applied: report.applied,
        session: snapshot,
    })
}

/// 导出失败时结果保留在会话中
pub async fn export_result(
    app_state: &AppState,
    shared: &SharedSession,
) -> Result<ExportArtifact, ApiError> {
    let interpretation = shared.lock().exportable()?.to_string();
    let artifact = app_state.exporter.export(&interpretation).await?;
    Ok(artifact)
}
