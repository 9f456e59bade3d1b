mod health;
pub mod interpreter;
mod middleware;
pub mod session;

use std::time::Duration as StdDuration;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::{info, warn};

use crate::model::SessionError;
use crate::pipeline::{messages, PipelineError};
use crate::util::report::ExportError;
use crate::util::ApiError;
use crate::AppState;

/// 创建CORS配置，允许的源来自 LAB_CORS_ALLOWED_ORIGINS
fn create_cors_layer(port: u16) -> CorsLayer {
    let allowed_origins = std::env::var("LAB_CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| format!("http://localhost:{port},http://127.0.0.1:{port}"));

    info!("[global] CORS配置 - 允许的源: {}", allowed_origins);

    CorsLayer::new()
        .allow_origin(
            allowed_origins
                .split(',')
                .filter_map(|s| match s.trim().parse() {
                    Ok(origin) => Some(origin),
                    Err(e) => {
                        warn!("无效的CORS源: {} - {}", s, e);
                        None
                    }
                })
                .collect::<Vec<_>>(),
        )
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true)
}

pub fn routes(app_state: AppState) -> Router {
    let config = app_state.config.clone();
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(
            config.session.idle_timeout_secs as i64,
        )))
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true);

    let body_limit = config.server.body_limit_mb.max(1) * 1024 * 1024;

    Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/api/interpreter",
            post(interpreter::interpret_text).fallback(interpreter::method_not_allowed),
        )
        .route("/api/session", get(session::get_session))
        .route("/api/session/images", post(session::upload_images))
        .route("/api/session/images/:index", delete(session::delete_image))
        .route(
            "/api/session/images/:index/preview",
            get(session::get_preview),
        )
        .route("/api/session/reset", post(session::reset_session))
        .route("/api/session/interpret", post(session::interpret_session))
        .route("/api/session/export", get(session::export_session))
        .with_state(app_state)
        .layer(from_fn(middleware::request_logging_middleware))
        .layer(session_layer)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(StdDuration::from_secs(
            config.server.request_timeout_secs.max(1),
        )))
        .layer(create_cors_layer(config.server.port))
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::QuotaExceeded { .. } => ApiError::conflict(messages::QUOTA_EXCEEDED),
            SessionError::IndexOutOfRange { .. } => ApiError::not_found(messages::IMAGE_NOT_FOUND),
            SessionError::UnsupportedMedia(_) => ApiError::bad_request(messages::UNSUPPORTED_MEDIA),
            SessionError::Preview(_) => ApiError::internal(messages::UPLOAD_FAILED),
            SessionError::NoResult => ApiError::conflict(messages::NO_RESULT),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Busy => ApiError::conflict(messages::BUSY),
            PipelineError::NoImages => ApiError::bad_request(messages::NO_IMAGES),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(_: ExportError) -> Self {
        ApiError::internal(messages::EXPORT_FAILED)
    }
}
