//! Dashboard analytics endpoints

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{DailyRequestCount, StatusCount, WorkflowStore};

#[derive(Deserialize)]
#[serde(default)]
pub struct VolumeQuery {
    pub days: usize,
}

impl Default for VolumeQuery {
    fn default() -> Self {
        Self { days: 30 }
    }
}

/// GET /analytics/request-volume
/// Requests per calendar day, newest day first.
pub async fn request_volume<S>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<VolumeQuery>,
) -> Result<Json<Vec<DailyRequestCount>>, ApiError>
where
    S: WorkflowStore,
{
    Ok(Json(state.store.request_volume_by_day(query.days)?))
}

/// GET /analytics/status-breakdown
/// Request count per status.
pub async fn status_breakdown<S>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<StatusCount>>, ApiError>
where
    S: WorkflowStore,
{
    Ok(Json(state.store.request_status_breakdown()?))
}
