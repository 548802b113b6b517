use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub active_sessions: usize,
}

/// `GET /health`
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = if state.sessions.is_shutting_down() {
        "draining"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        timestamp: OffsetDateTime::now_utc(),
        active_sessions: state.sessions.active_sessions(),
    })
}
