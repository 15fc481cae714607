//! Server error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use provdesk_core::model::RequestStatus;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("User not found")]
    UserNotFound,

    #[error("Form definition not found")]
    FormNotFound,

    #[error("Request not found")]
    RequestNotFound,

    #[error("Temp account not found")]
    TempAccountNotFound,

    #[error("Shared mailbox not found")]
    MailboxNotFound,

    #[error("Walkthrough template not found")]
    TemplateNotFound,

    #[error("Mailbox grant not found")]
    GrantNotFound,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Form with this name already exists")]
    FormNameTaken,

    #[error("Walkthrough template with this name already exists")]
    TemplateNameTaken,

    #[error("Temp account with this principal name already exists")]
    PrincipalNameTaken,

    #[error("Mailbox with this address already exists")]
    AddressTaken,

    #[error("Temp account is already in use")]
    AccountInUse,

    #[error("Mailbox grant already exists")]
    GrantExists,

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("Administrator access required")]
    AdminRequired,

    #[error("Manager access required")]
    ManagerRequired,

    #[error("Target user is not a manager")]
    TargetNotManager,

    #[error("Mailbox is not in the caller's visible set")]
    MailboxNotManaged,

    #[error("Invalid user ID")]
    InvalidUserHeader,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UserNotFound
            | ApiError::FormNotFound
            | ApiError::RequestNotFound
            | ApiError::TempAccountNotFound
            | ApiError::MailboxNotFound
            | ApiError::TemplateNotFound
            | ApiError::GrantNotFound => StatusCode::NOT_FOUND,

            ApiError::EmailTaken
            | ApiError::FormNameTaken
            | ApiError::TemplateNameTaken
            | ApiError::PrincipalNameTaken
            | ApiError::AddressTaken
            | ApiError::AccountInUse
            | ApiError::GrantExists
            | ApiError::IllegalTransition { .. } => StatusCode::CONFLICT,

            ApiError::AdminRequired
            | ApiError::ManagerRequired
            | ApiError::TargetNotManager
            | ApiError::MailboxNotManaged => StatusCode::FORBIDDEN,

            ApiError::InvalidUserHeader => StatusCode::UNAUTHORIZED,

            ApiError::Validation(_) => StatusCode::BAD_REQUEST,

            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            // Don't leak internals to clients
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = json!({ "success": false, "reason": message });
        (status, axum::Json(body)).into_response()
    }
}
