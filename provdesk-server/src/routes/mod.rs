//! HTTP routes for the provisioning backend

mod analytics;
mod audit;
mod events;
mod forms;
mod mailboxes;
mod requests;
mod temp_accounts;
mod users;
mod walkthroughs;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::store::{DirectoryStore, WorkflowStore};

#[derive(Serialize)]
struct ServiceInfo {
    message: &'static str,
}

/// GET /
async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "provdesk backend",
    })
}

/// Create the router with all routes
pub fn create_router<S>(state: Arc<AppState<S>>) -> Router
where
    S: DirectoryStore + WorkflowStore + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/ws", get(events::dashboard_socket))
        .route("/users", post(users::create_user).get(users::list_users))
        .route("/users/import", post(users::import_users))
        .route("/users/:id", get(users::get_user))
        .route(
            "/form-definitions",
            post(forms::create_form_definition).get(forms::list_form_definitions),
        )
        .route("/form-definitions/:id", get(forms::get_form_definition))
        .route(
            "/requests",
            post(requests::create_request).get(requests::list_requests),
        )
        .route("/requests/:id", get(requests::get_request))
        .route("/requests/:id/status", put(requests::update_status))
        .route("/requests/:id/walkthrough", put(requests::update_walkthrough))
        .route(
            "/requests/:id/assign-temp-account",
            post(requests::assign_temp_account),
        )
        .route(
            "/temp-accounts",
            post(temp_accounts::create_temp_account).get(temp_accounts::list_temp_accounts),
        )
        .route("/temp-accounts/import", post(temp_accounts::import_temp_accounts))
        .route("/temp-accounts/:id/status", put(temp_accounts::update_status))
        .route(
            "/mailboxes",
            post(mailboxes::create_mailbox).get(mailboxes::list_mailboxes),
        )
        .route("/mailboxes/import", post(mailboxes::import_mailboxes))
        .route("/mailboxes/visible", get(mailboxes::visible_mailboxes))
        .route("/mailboxes/:id/grant", post(mailboxes::grant))
        .route("/mailboxes/:id/revoke", post(mailboxes::revoke))
        .route("/mailbox-grants", get(mailboxes::list_grants))
        .route("/mailbox-requests", post(mailboxes::submit_modification_request))
        .route(
            "/walkthrough-templates",
            post(walkthroughs::create_template).get(walkthroughs::list_templates),
        )
        .route(
            "/walkthrough-templates/:id",
            get(walkthroughs::get_template)
                .put(walkthroughs::update_template)
                .delete(walkthroughs::delete_template),
        )
        .route("/audit-logs", get(audit::list_audit_logs))
        .route("/analytics/request-volume", get(analytics::request_volume))
        .route("/analytics/status-breakdown", get(analytics::status_breakdown))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
