//! Temp-account pool endpoints

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use provdesk_core::model::{TempAccount, TempAccountId};
use provdesk_core::{import, remediation, ImportSummary};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;
use crate::store::{DirectoryStore, NewTempAccount, Page, WorkflowStore};

#[derive(Deserialize)]
pub struct CreateTempAccountRequest {
    pub user_principal_name: String,
    pub display_name: String,
    #[serde(default)]
    pub is_in_use: bool,
}

/// POST /temp-accounts (admin only)
pub async fn create_temp_account<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateTempAccountRequest>,
) -> Result<Json<TempAccount>, ApiError>
where
    S: DirectoryStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    identity::require_admin(caller.as_ref())?;

    let account = state.store.create_temp_account(NewTempAccount {
        user_principal_name: req.user_principal_name,
        display_name: req.display_name,
        is_in_use: req.is_in_use,
    })?;

    Ok(Json(account))
}

/// GET /temp-accounts
pub async fn list_temp_accounts<S>(
    State(state): State<Arc<AppState<S>>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<TempAccount>>, ApiError>
where
    S: DirectoryStore,
{
    Ok(Json(state.store.list_temp_accounts(page)?))
}

#[derive(Deserialize)]
pub struct UpdateTempAccountStatusRequest {
    pub is_in_use: bool,
}

#[derive(Serialize)]
pub struct TempAccountStatusResponse {
    #[serde(flatten)]
    pub account: TempAccount,
    /// Command the operator runs against the external directory
    pub remediation_command: String,
}

/// PUT /temp-accounts/:id/status (admin only)
/// Manual reconciliation override of the in-use flag. Audited with the
/// before/after state and the remediation command.
pub async fn update_status<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTempAccountStatusRequest>,
) -> Result<Json<TempAccountStatusResponse>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    let admin = identity::require_admin(caller.as_ref())?;

    let (prior, account) = state
        .store
        .set_temp_account_status(TempAccountId(id), req.is_in_use)?;

    let remediation_command =
        remediation::temp_account_status_command(&account.user_principal_name, account.is_in_use);
    state.store.append_audit(
        admin.id,
        "temp_account_status_changed",
        json!({
            "temp_account_id": account.id,
            "user_principal_name": account.user_principal_name,
            "from_in_use": prior,
            "to_in_use": account.is_in_use,
            "remediation_command": remediation_command,
        }),
    )?;
    tracing::info!(
        account = account.id.0,
        from = prior,
        to = account.is_in_use,
        "Temp account status overridden"
    );

    Ok(Json(TempAccountStatusResponse {
        account,
        remediation_command,
    }))
}

/// POST /temp-accounts/import (admin only)
/// CSV upsert keyed by principal name: create if absent, else update the
/// display name.
pub async fn import_temp_accounts<S>(
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
        import::temp_account_rows(&body).map_err(|e| ApiError::Validation(e.to_string()))?;

    let mut summary = ImportSummary {
        skipped,
        ..Default::default()
    };
    for row in rows {
        match state
            .store
            .get_temp_account_by_principal(&row.user_principal_name)?
        {
            Some(existing) => {
                state
                    .store
                    .rename_temp_account(existing.id, &row.display_name)?;
                summary.updated += 1;
            }
            None => {
                state.store.create_temp_account(NewTempAccount {
                    user_principal_name: row.user_principal_name,
                    display_name: row.display_name,
                    is_in_use: false,
                })?;
                summary.created += 1;
            }
        }
    }

    tracing::info!(
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "Temp-account import complete"
    );
    Ok(Json(summary))
}
