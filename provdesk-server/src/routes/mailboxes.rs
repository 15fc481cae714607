//! Shared-mailbox and permission-graph endpoints

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use provdesk_core::event::{DashboardEvent, MAILBOX_MODIFICATION};
use provdesk_core::model::{MailboxId, ProvisionRequest, Role, SharedMailbox, UserId};
use provdesk_core::{import, remediation, ImportSummary};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;
use crate::store::{DirectoryStore, MailboxGrant, NewMailbox, NewRequest, Page, WorkflowStore};

#[derive(Deserialize)]
pub struct CreateMailboxRequest {
    pub display_name: String,
    pub primary_smtp_address: String,
    pub full_access_users: Option<String>,
}

/// POST /mailboxes (admin only)
pub async fn create_mailbox<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateMailboxRequest>,
) -> Result<Json<SharedMailbox>, ApiError>
where
    S: DirectoryStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    identity::require_admin(caller.as_ref())?;

    let mailbox = state.store.create_mailbox(NewMailbox {
        display_name: req.display_name,
        primary_smtp_address: req.primary_smtp_address,
        full_access_users: req.full_access_users,
    })?;

    Ok(Json(mailbox))
}

/// GET /mailboxes
pub async fn list_mailboxes<S>(
    State(state): State<Arc<AppState<S>>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<SharedMailbox>>, ApiError>
where
    S: DirectoryStore,
{
    Ok(Json(state.store.list_mailboxes(page)?))
}

/// GET /mailboxes/visible
/// Mailboxes visible to the calling manager.
pub async fn visible_mailboxes<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<Vec<SharedMailbox>>, ApiError>
where
    S: DirectoryStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    let manager = identity::require_manager(caller.as_ref())?;
    Ok(Json(state.store.visible_mailboxes(manager.id)?))
}

#[derive(Deserialize)]
pub struct GrantRequest {
    pub manager_id: UserId,
}

#[derive(Serialize)]
pub struct GrantResponse {
    pub success: bool,
}

/// POST /mailboxes/:id/grant (admin only)
/// Insert a manager -> mailbox visibility edge.
pub async fn grant<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<GrantRequest>,
) -> Result<Json<GrantResponse>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    let admin = identity::require_admin(caller.as_ref())?;

    let mailbox_id = MailboxId(id);
    let mailbox = state
        .store
        .get_mailbox(mailbox_id)?
        .ok_or(ApiError::MailboxNotFound)?;
    let target = state
        .store
        .get_user(req.manager_id)?
        .ok_or(ApiError::UserNotFound)?;
    if target.role != Role::Manager {
        return Err(ApiError::TargetNotManager);
    }

    state.store.grant_mailbox(target.id, mailbox_id)?;
    state.store.append_audit(
        admin.id,
        "mailbox_access_granted",
        json!({
            "manager_id": target.id,
            "mailbox_id": mailbox_id,
            "primary_smtp_address": mailbox.primary_smtp_address,
        }),
    )?;

    Ok(Json(GrantResponse { success: true }))
}

/// POST /mailboxes/:id/revoke (admin only)
/// Remove a manager -> mailbox visibility edge.
pub async fn revoke<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<GrantRequest>,
) -> Result<Json<GrantResponse>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    let admin = identity::require_admin(caller.as_ref())?;

    let mailbox_id = MailboxId(id);
    let mailbox = state
        .store
        .get_mailbox(mailbox_id)?
        .ok_or(ApiError::MailboxNotFound)?;
    let target = state
        .store
        .get_user(req.manager_id)?
        .ok_or(ApiError::UserNotFound)?;

    state.store.revoke_mailbox(target.id, mailbox_id)?;
    state.store.append_audit(
        admin.id,
        "mailbox_access_revoked",
        json!({
            "manager_id": target.id,
            "mailbox_id": mailbox_id,
            "primary_smtp_address": mailbox.primary_smtp_address,
        }),
    )?;

    Ok(Json(GrantResponse { success: true }))
}

/// GET /mailbox-grants (admin only)
/// Every manager -> mailbox edge, for administrative display.
pub async fn list_grants<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<Vec<MailboxGrant>>, ApiError>
where
    S: DirectoryStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    identity::require_admin(caller.as_ref())?;
    Ok(Json(state.store.list_mailbox_grants()?))
}

#[derive(Deserialize)]
pub struct MailboxChange {
    pub mailbox_id: MailboxId,
    #[serde(default)]
    pub add_users: Vec<String>,
    #[serde(default)]
    pub remove_users: Vec<String>,
}

#[derive(Deserialize)]
pub struct ModificationRequest {
    pub changes: Vec<MailboxChange>,
}

#[derive(Serialize)]
pub struct ModificationResponse {
    pub request: ProvisionRequest,
    /// Formatted directory commands for the admin queue
    pub commands: Vec<String>,
}

/// POST /mailbox-requests (manager only)
/// Batch access-list modification. Every referenced mailbox must already be
/// in the caller's visible set or the whole submission is rejected before
/// any persistence. Accepted as an opaque request record for later admin
/// processing, not applied to the mailboxes directly.
pub async fn submit_modification_request<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<ModificationRequest>,
) -> Result<Json<ModificationResponse>, ApiError>
where
    S: DirectoryStore + WorkflowStore,
{
    let caller = identity::current_user(&headers, &state.store)?;
    let manager = identity::require_manager(caller.as_ref())?;

    if req.changes.is_empty() {
        return Err(ApiError::Validation("changes must not be empty".to_string()));
    }

    // Authorize the whole batch before touching anything
    let mut resolved = Vec::with_capacity(req.changes.len());
    for change in &req.changes {
        if !state.store.is_mailbox_visible(manager.id, change.mailbox_id)? {
            return Err(ApiError::MailboxNotManaged);
        }
        let mailbox = state
            .store
            .get_mailbox(change.mailbox_id)?
            .ok_or(ApiError::MailboxNotFound)?;
        resolved.push(mailbox);
    }

    let mut commands = Vec::new();
    let mut entries = Vec::with_capacity(req.changes.len());
    for (change, mailbox) in req.changes.iter().zip(&resolved) {
        for user in &change.add_users {
            commands.push(remediation::mailbox_access_command(
                &mailbox.primary_smtp_address,
                user,
                true,
            ));
        }
        for user in &change.remove_users {
            commands.push(remediation::mailbox_access_command(
                &mailbox.primary_smtp_address,
                user,
                false,
            ));
        }
        entries.push(json!({
            "mailbox_id": mailbox.id,
            "primary_smtp_address": mailbox.primary_smtp_address,
            "add_users": change.add_users,
            "remove_users": change.remove_users,
        }));
    }

    let request = state.store.create_request(NewRequest {
        form_definition_id: None,
        form_data: json!({
            "type": MAILBOX_MODIFICATION,
            "changes": entries,
        }),
        submitted_by_manager_id: manager.id,
    })?;

    state
        .events
        .broadcast(&DashboardEvent::mailbox_modification(&request));
    tracing::info!(
        request = request.id.0,
        manager = manager.id.0,
        mailboxes = resolved.len(),
        "Mailbox modification request submitted"
    );

    Ok(Json(ModificationResponse { request, commands }))
}

/// POST /mailboxes/import (admin only)
/// CSV upsert keyed by SMTP address: create if absent, else update the
/// display name.
pub async fn import_mailboxes<S>(
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
        import::mailbox_rows(&body).map_err(|e| ApiError::Validation(e.to_string()))?;

    let mut summary = ImportSummary {
        skipped,
        ..Default::default()
    };
    for row in rows {
        match state
            .store
            .get_mailbox_by_address(&row.primary_smtp_address)?
        {
            Some(existing) => {
                state.store.rename_mailbox(existing.id, &row.display_name)?;
                summary.updated += 1;
            }
            None => {
                state.store.create_mailbox(NewMailbox {
                    display_name: row.display_name,
                    primary_smtp_address: row.primary_smtp_address,
                    full_access_users: row.full_access_users,
                })?;
                summary.created += 1;
            }
        }
    }

    tracing::info!(
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "Mailbox import complete"
    );
    Ok(Json(summary))
}
