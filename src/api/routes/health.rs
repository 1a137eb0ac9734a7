//! Health check endpoint

use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /api/v1/health
///
/// The hub answers even when its storage does not; the storage state is
/// reported alongside.
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let (storage_healthy, storage) = match state.backend.health_check().await {
        Ok(health) => (health.healthy, health.message),
        Err(e) => (false, e.to_string()),
    };

    let storage_stats = state.backend.get_stats().await.ok();

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage_healthy,
        storage,
        storage_stats,
    })
}
