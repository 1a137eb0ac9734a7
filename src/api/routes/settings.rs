//! Settings endpoints

use axum::{Json, extract::State};

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{ReloadResponse, SettingsView},
};
use crate::settings::{MonitoringSettings, SettingsUpdate};

pub(crate) async fn settings_view(state: &ApiState) -> SettingsView {
    let settings = state.settings();
    SettingsView {
        in_effect: (*settings.current()).clone(),
        persisted: settings.persisted().await.ok(),
        reload_error: settings.last_reload_error(),
    }
}

/// GET /api/v1/settings
pub async fn get_settings(State(state): State<ApiState>) -> Json<SettingsView> {
    Json(settings_view(&state).await)
}

/// PUT /api/v1/settings
///
/// Persists a partial update; it takes effect with the next cycle or an
/// explicit reload.
pub async fn update_settings(
    State(state): State<ApiState>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<MonitoringSettings>> {
    let saved = state.settings().update(update).await?;
    Ok(Json(saved))
}

/// POST /api/v1/settings/reload
pub async fn reload_settings(State(state): State<ApiState>) -> ApiResult<Json<ReloadResponse>> {
    let version = state.monitor.reload_settings().await?;
    Ok(Json(ReloadResponse { version }))
}
