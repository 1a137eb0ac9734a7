//! Monitor status, manual cycles and report history

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde::Deserialize;

use crate::api::{
    error::ApiResult,
    routes::settings::settings_view,
    state::ApiState,
    types::{ReportsResponse, StatusResponse},
};
use crate::monitors::system::CycleOutcome;

const DEFAULT_REPORT_LIMIT: usize = 50;
const MAX_REPORT_LIMIT: usize = 1000;

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> ApiResult<Json<StatusResponse>> {
    Ok(Json(StatusResponse {
        timestamp: Utc::now(),
        monitor: state.monitor.monitor().status(),
        active_alerts: state.alerts().active_alerts().await,
        settings: settings_view(&state).await,
    }))
}

/// POST /api/v1/monitor/run
///
/// Goes through the same guards as a tick, so the outcome may be a skip
pub async fn run_cycle(State(state): State<ApiState>) -> ApiResult<Json<CycleOutcome>> {
    Ok(Json(state.monitor.run_now().await?))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    limit: Option<usize>,
}

/// GET /api/v1/reports?limit=N
pub async fn list_reports(
    State(state): State<ApiState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<ReportsResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_REPORT_LIMIT)
        .min(MAX_REPORT_LIMIT);
    let reports = state.history.query_latest_reports(limit).await?;

    Ok(Json(ReportsResponse {
        count: reports.len(),
        reports,
    }))
}
