//! Form-definition endpoints
//!
//! Form definitions are immutable once created; there is no update route.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use provdesk_core::model::{FormDefinition, FormId, TemplateId};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;
use crate::store::{DirectoryStore, NewFormDefinition, Page, WorkflowStore};

#[derive(Deserialize)]
pub struct CreateFormDefinitionRequest {
    pub name: String,
    pub description: Option<String>,
    /// The form builder's JSON output
    pub schema: Value,
    pub suggested_walkthrough_id: Option<TemplateId>,
}

/// POST /form-definitions (admin only)
pub async fn create_form_definition<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateFormDefinitionRequest>,
) -> Result<Json<FormDefinition>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    let admin = identity::require_admin(caller.as_ref())?;

    if let Some(template_id) = req.suggested_walkthrough_id {
        if state.store.get_walkthrough_template(template_id)?.is_none() {
            return Err(ApiError::TemplateNotFound);
        }
    }

    let form = state.store.create_form_definition(
        NewFormDefinition {
            name: req.name,
            description: req.description,
            schema: req.schema,
            suggested_walkthrough_id: req.suggested_walkthrough_id,
        },
        admin.id,
    )?;

    Ok(Json(form))
}

/// GET /form-definitions
pub async fn list_form_definitions<S>(
    State(state): State<Arc<AppState<S>>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<FormDefinition>>, ApiError>
where
    S: WorkflowStore,
{
    Ok(Json(state.store.list_form_definitions(page)?))
}

/// GET /form-definitions/:id
pub async fn get_form_definition<S>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<FormDefinition>, ApiError>
where
    S: WorkflowStore,
{
    state
        .store
        .get_form_definition(FormId(id))?
        .map(Json)
        .ok_or(ApiError::FormNotFound)
}
