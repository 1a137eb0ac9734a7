//! Lifecycle endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{TimeDelta, Utc};
use serde::Deserialize;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{RegisterEntityRequest, RenewRequest},
};
use crate::lifecycle::{LifecycleEntity, LifecycleSummary, ScanSummary};

/// Horizon for "due soon" when none is given
const DEFAULT_HORIZON_HOURS: i64 = 7 * 24;

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    horizon_hours: Option<i64>,
}

/// GET /api/v1/lifecycle?horizon_hours=N
pub async fn get_summary(
    State(state): State<ApiState>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<Json<LifecycleSummary>> {
    let hours = query.horizon_hours.unwrap_or(DEFAULT_HORIZON_HOURS);
    if hours < 0 {
        return Err(ApiError::InvalidRequest(
            "horizon_hours must not be negative".to_string(),
        ));
    }
    let horizon = TimeDelta::try_hours(hours).ok_or_else(|| {
        ApiError::InvalidRequest(format!("horizon_hours {hours} is out of range"))
    })?;

    let summary = state.scheduler().summary(Utc::now(), horizon).await?;
    Ok(Json(summary))
}

/// POST /api/v1/lifecycle/scan
pub async fn scan_now(State(state): State<ApiState>) -> ApiResult<Json<ScanSummary>> {
    Ok(Json(state.lifecycle.scan_now().await?))
}

/// PUT /api/v1/lifecycle/{id}
pub async fn register(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<RegisterEntityRequest>,
) -> ApiResult<Json<LifecycleEntity>> {
    if id.trim().is_empty() {
        return Err(ApiError::InvalidRequest("entity id must not be empty".to_string()));
    }

    let mut entity = LifecycleEntity::new(id, request.label, request.expires_at);
    if let Some(recipient) = request.recipient {
        entity = entity.with_recipient(recipient);
    }

    Ok(Json(state.scheduler().register(entity).await?))
}

/// POST /api/v1/lifecycle/{id}/renew
pub async fn renew(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<RenewRequest>,
) -> ApiResult<Json<LifecycleEntity>> {
    Ok(Json(state.scheduler().renew(&id, request.expires_at).await?))
}
