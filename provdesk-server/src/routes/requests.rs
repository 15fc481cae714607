//! Request lifecycle endpoints

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use provdesk_core::event::DashboardEvent;
use provdesk_core::model::{
    FormId, ProvisionRequest, RequestId, RequestStatus, Role, TempAccount, TempAccountId,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;
use crate::store::{DirectoryStore, NewRequest, Page, WorkflowStore};

#[derive(Deserialize)]
pub struct CreateRequestRequest {
    pub form_definition_id: FormId,
    pub form_data: Value,
}

/// POST /requests
/// Submit an access request (manager only). Broadcasts `new_request`.
pub async fn create_request<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateRequestRequest>,
) -> Result<Json<ProvisionRequest>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    let manager = identity::require_manager(caller.as_ref())?;

    if state.store.get_form_definition(req.form_definition_id)?.is_none() {
        return Err(ApiError::FormNotFound);
    }

    let request = state.store.create_request(NewRequest {
        form_definition_id: Some(req.form_definition_id),
        form_data: req.form_data,
        submitted_by_manager_id: manager.id,
    })?;

    state.events.broadcast(&DashboardEvent::new_request(&request));
    tracing::info!(request = request.id.0, manager = manager.id.0, "Request submitted");

    Ok(Json(request))
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ListRequestsQuery {
    pub skip: usize,
    pub limit: usize,
    pub service: Option<String>,
}

impl Default for ListRequestsQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 100,
            service: None,
        }
    }
}

/// GET /requests
/// Newest-first. Managers see only their own service's requests; admins and
/// anonymous callers may filter with `?service=`.
pub async fn list_requests<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<Vec<ProvisionRequest>>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    let scope = match &caller {
        Some(user) if user.role == Role::Manager => user.service.clone(),
        _ => query.service,
    };

    let page = Page {
        skip: query.skip,
        limit: query.limit,
    };
    Ok(Json(state.store.list_requests(page, scope.as_deref())?))
}

/// GET /requests/:id
pub async fn get_request<S>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<ProvisionRequest>, ApiError>
where
    S: WorkflowStore,
{
    state
        .store
        .get_request(RequestId(id))?
        .map(Json)
        .ok_or(ApiError::RequestNotFound)
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: RequestStatus,
}

/// PUT /requests/:id/status (admin only)
/// Applies the transition, writes one audit entry, broadcasts
/// `status_update`.
pub async fn update_status<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ProvisionRequest>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    let admin = identity::require_admin(caller.as_ref())?;

    let request_id = RequestId(id);
    let (prior, updated) = state
        .store
        .set_request_status(request_id, req.status, admin.id)?;

    state.store.append_audit(
        admin.id,
        "request_status_changed",
        json!({
            "request_id": request_id,
            "from_status": prior,
            "to_status": updated.status,
        }),
    )?;
    state
        .events
        .broadcast(&DashboardEvent::status_update(request_id, updated.status));
    tracing::info!(
        request = request_id.0,
        from = %prior,
        to = %updated.status,
        "Request status changed"
    );

    Ok(Json(updated))
}

/// PUT /requests/:id/walkthrough (admin only)
/// Replaces the stored checklist progress wholesale.
pub async fn update_walkthrough<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(progress): Json<Value>,
) -> Result<Json<ProvisionRequest>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    identity::require_admin(caller.as_ref())?;

    let updated = state.store.set_walkthrough_state(RequestId(id), progress)?;
    Ok(Json(updated))
}

#[derive(Deserialize)]
pub struct AssignTempAccountRequest {
    pub temp_account_id: TempAccountId,
}

#[derive(Serialize)]
pub struct AssignmentResponse {
    pub request: ProvisionRequest,
    pub account: TempAccount,
}

/// POST /requests/:id/assign-temp-account (admin only)
/// Flag flip and request link are one transaction; a conflict leaves both
/// sides untouched.
pub async fn assign_temp_account<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<AssignTempAccountRequest>,
) -> Result<Json<AssignmentResponse>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    let admin = identity::require_admin(caller.as_ref())?;

    let (request, account) = state
        .store
        .assign_temp_account(RequestId(id), req.temp_account_id)?;

    state.store.append_audit(
        admin.id,
        "temp_account_assigned",
        json!({
            "request_id": request.id,
            "temp_account_id": account.id,
            "user_principal_name": account.user_principal_name,
        }),
    )?;
    tracing::info!(
        request = request.id.0,
        account = account.id.0,
        "Temp account assigned"
    );

    Ok(Json(AssignmentResponse { request, account }))
}
