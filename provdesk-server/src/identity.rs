//! Caller identity resolution and role guards
//!
//! Identity arrives as a resolved `user-id` header, not a credential; an
//! absent header is a valid anonymous caller for read paths. Every guard is
//! an explicit function over `Option<User>` so handlers name the capability
//! they need instead of reaching for ambient state.

use axum::http::HeaderMap;
use provdesk_core::model::{Role, User, UserId};

use crate::error::ApiError;
use crate::store::DirectoryStore;

const USER_ID_HEADER: &str = "user-id";

/// Resolve the caller from the `user-id` header.
///
/// Missing header: anonymous (`None`). Unparseable header: validation
/// error. Unknown id: 401.
pub fn current_user<S: DirectoryStore>(
    headers: &HeaderMap,
    store: &S,
) -> Result<Option<User>, ApiError> {
    let Some(raw) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };

    let id = raw
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| ApiError::Validation("user-id header must be an integer".to_string()))?;

    match store.get_user(UserId(id))? {
        Some(user) => Ok(Some(user)),
        None => Err(ApiError::InvalidUserHeader),
    }
}

pub fn require_admin(user: Option<&User>) -> Result<&User, ApiError> {
    match user {
        Some(user) if user.role == Role::Admin => Ok(user),
        _ => Err(ApiError::AdminRequired),
    }
}

pub fn require_manager(user: Option<&User>) -> Result<&User, ApiError> {
    match user {
        Some(user) if user.role == Role::Manager => Ok(user),
        _ => Err(ApiError::ManagerRequired),
    }
}

pub fn require_manager_or_admin(user: Option<&User>) -> Result<&User, ApiError> {
    match user {
        Some(user) => Ok(user),
        None => Err(ApiError::ManagerRequired),
    }
}
