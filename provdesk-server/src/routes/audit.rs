//! Audit-trail endpoint

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use provdesk_core::model::AuditEntry;

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;
use crate::store::{DirectoryStore, Page, WorkflowStore};

/// GET /audit-logs (admin only), newest-first
pub async fn list_audit_logs<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Query(page): Query<Page>,
) -> Result<Json<Vec<AuditEntry>>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    identity::require_admin(caller.as_ref())?;
    Ok(Json(state.store.list_audit(page)?))
}
