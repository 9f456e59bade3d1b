use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

use crate::util::logging::standards::events;

/// 健康检查和预览图轮询不记录成功日志
fn is_quiet_path(path: &str) -> bool {
    path == "/api/health" || path.ends_with("/preview")
}

/// 请求日志：每个请求一个 span（带 request_id），完成时按状态码分级记录
pub async fn request_logging_middleware(mut request: Request, next: Next) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let path = request.uri().path().to_string();
    let quiet = is_quiet_path(&path);
    request.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        target: "server.http",
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %path
    );

    async move {
        if !quiet {
            tracing::debug!(target: "server.http", event = events::REQUEST_START);
        }

        let response = next.run(request).await;
        let status = response.status().as_u16();
        let duration_ms = started.elapsed().as_millis() as u64;

        if response.status().is_server_error() {
            tracing::error!(target: "server.http", event = events::REQUEST_ERROR, status, duration_ms);
        } else if response.status().is_client_error() {
            tracing::warn!(target: "server.http", event = events::REQUEST_ERROR, status, duration_ms);
        } else if !quiet {
            tracing::info!(target: "server.http", event = events::REQUEST_COMPLETE, status, duration_ms);
        }
        response
    }
    .instrument(span)
    .await
}
