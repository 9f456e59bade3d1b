use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::build_info::{self, BuildInfo};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub build: BuildInfo,
    pub uptime_secs: u64,
    pub active_sessions: usize,
    pub timestamp: String,
}

pub async fn health(State(app_state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        build: build_info::current(),
        uptime_secs: app_state.uptime().as_secs(),
        active_sessions: app_state.sessions.len(),
        timestamp: chrono::Local::now().to_rfc3339(),
    })
}
