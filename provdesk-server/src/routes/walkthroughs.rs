//! Walkthrough-template endpoints

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use provdesk_core::model::{TemplateId, WalkthroughTemplate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;
use crate::store::{
    DirectoryStore, NewWalkthroughTemplate, Page, WalkthroughTemplateUpdate, WorkflowStore,
};

#[derive(Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub description: String,
    pub steps: Value,
    pub tools: Option<Value>,
}

/// POST /walkthrough-templates (admin only)
pub async fn create_template<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<Json<WalkthroughTemplate>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    identity::require_admin(caller.as_ref())?;

    let template = state.store.create_walkthrough_template(NewWalkthroughTemplate {
        name: req.name,
        description: req.description,
        steps: req.steps,
        tools: req.tools,
    })?;

    Ok(Json(template))
}

/// GET /walkthrough-templates
pub async fn list_templates<S>(
    State(state): State<Arc<AppState<S>>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<WalkthroughTemplate>>, ApiError>
where
    S: WorkflowStore,
{
    Ok(Json(state.store.list_walkthrough_templates(page)?))
}

/// GET /walkthrough-templates/:id
pub async fn get_template<S>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<WalkthroughTemplate>, ApiError>
where
    S: WorkflowStore,
{
    state
        .store
        .get_walkthrough_template(TemplateId(id))?
        .map(Json)
        .ok_or(ApiError::TemplateNotFound)
}

/// PUT /walkthrough-templates/:id (admin only)
/// Partial update: unset fields are kept.
pub async fn update_template<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(update): Json<WalkthroughTemplateUpdate>,
) -> Result<Json<WalkthroughTemplate>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    identity::require_admin(caller.as_ref())?;

    let template = state
        .store
        .update_walkthrough_template(TemplateId(id), update)?;
    Ok(Json(template))
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// DELETE /walkthrough-templates/:id (admin only)
pub async fn delete_template<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    identity::require_admin(caller.as_ref())?;

    state.store.delete_walkthrough_template(TemplateId(id))?;
    Ok(Json(DeleteResponse { success: true }))
}
