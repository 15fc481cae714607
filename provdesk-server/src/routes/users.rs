//! Directory user endpoints

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use provdesk_core::model::{Role, User, UserId};
use provdesk_core::{import, remediation, ImportSummary};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;
use crate::store::{DirectoryStore, NewUser, Page};

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub service: Option<String>,
}

#[derive(Serialize)]
pub struct CreatedUserResponse {
    #[serde(flatten)]
    pub user: User,
    /// Command the operator runs against the external directory
    pub remediation_command: String,
}

/// POST /users
/// Register a directory user (admin only)
pub async fn create_user<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<CreatedUserResponse>, ApiError>
where
    S: DirectoryStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    identity::require_admin(caller.as_ref())?;

    let user = state.store.create_user(NewUser {
        full_name: req.full_name,
        email: req.email,
        role: req.role,
        service: req.service,
    })?;

    let remediation_command = remediation::new_user_command(&user.full_name, &user.email);
    tracing::info!(user = user.id.0, email = %user.email, "Directory user created");

    Ok(Json(CreatedUserResponse {
        user,
        remediation_command,
    }))
}

/// GET /users
pub async fn list_users<S>(
    State(state): State<Arc<AppState<S>>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<User>>, ApiError>
where
    S: DirectoryStore,
{
    Ok(Json(state.store.list_users(page)?))
}

/// GET /users/:id
/// Resolve one user; the dashboard session uses this as its login lookup.
pub async fn get_user<S>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError>
where
    S: DirectoryStore,
{
    state
        .store
        .get_user(UserId(id))?
        .map(Json)
        .ok_or(ApiError::UserNotFound)
}

/// POST /users/import
/// CSV upsert keyed by email: create if absent, else update name/service.
pub async fn import_users<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<ImportSummary>, ApiError>
where
    S: DirectoryStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    identity::require_admin(caller.as_ref())?;

    let (rows, skipped) =
        import::user_rows(&body).map_err(|e| ApiError::Validation(e.to_string()))?;

    let mut summary = ImportSummary {
        skipped,
        ..Default::default()
    };
    for row in rows {
        match state.store.get_user_by_email(&row.email)? {
            Some(existing) => {
                state
                    .store
                    .update_user(existing.id, &row.full_name, row.service.as_deref())?;
                summary.updated += 1;
            }
            None => {
                state.store.create_user(NewUser {
                    full_name: row.full_name,
                    email: row.email,
                    role: row.role,
                    service: row.service,
                })?;
                summary.created += 1;
            }
        }
    }

    tracing::info!(
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "User import complete"
    );
    Ok(Json(summary))
}
