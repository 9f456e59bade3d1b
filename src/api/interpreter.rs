//! POST /api/interpreter：文本直接送解读服务

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::pipeline::{messages, InterpretError};
use crate::util::logging::standards::events;
use crate::util::ApiError;
use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct InterpretRequest {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretResponse {
    pub result: String,
}

pub async fn interpret_text(
    State(app_state): State<AppState>,
    payload: Result<Json<InterpretRequest>, JsonRejection>,
) -> Result<Json<InterpretResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(event = events::REQUEST_ERROR, reason = %rejection.body_text());
        ApiError::bad_request(messages::MISSING_CONTENT)
    })?;
    let content = request.content.unwrap_or_default();

    match app_state.runner.dispatcher().interpret(&content).await {
        Ok(result) => Ok(Json(InterpretResponse { result })),
        Err(InterpretError::EmptyInput) => Err(ApiError::bad_request(messages::MISSING_CONTENT)),
        Err(InterpretError::Service(e)) => {
            error!(target: "pipeline.dispatch", event = events::DISPATCH_ERROR, error = %e);
            Err(ApiError::internal(messages::SERVICE_FAILURE))
        }
    }
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed(messages::METHOD_NOT_ALLOWED)
}
