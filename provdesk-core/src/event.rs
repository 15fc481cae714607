//! Dashboard event payloads
//!
//! Two event kinds are pushed to connected admin dashboards: a new request
//! was submitted, or a request changed status. Events are best-effort and
//! carry no backlog; a dashboard that connects late starts from silence.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::model::{FormId, ProvisionRequest, RequestId, RequestStatus, UserId};

/// Discriminator value carried by mailbox-modification submissions
pub const MAILBOX_MODIFICATION: &str = "mailbox_modification";

/// An event broadcast to every connected admin dashboard
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DashboardEvent {
    NewRequest {
        id: RequestId,
        status: RequestStatus,
        submitted_by_manager_id: UserId,
        form_definition_id: Option<FormId>,
        form_data: Value,
        /// Set for the mailbox-modification variant
        #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
        kind: Option<&'static str>,
        timestamp: DateTime<Utc>,
    },
    StatusUpdate {
        id: RequestId,
        status: RequestStatus,
    },
}

impl DashboardEvent {
    /// Event for a freshly submitted form-backed request
    pub fn new_request(request: &ProvisionRequest) -> Self {
        DashboardEvent::NewRequest {
            id: request.id,
            status: request.status,
            submitted_by_manager_id: request.submitted_by_manager_id,
            form_definition_id: request.form_definition_id,
            form_data: request.form_data.clone(),
            kind: None,
            timestamp: request.timestamp,
        }
    }

    /// Event for a freshly submitted mailbox-modification request
    pub fn mailbox_modification(request: &ProvisionRequest) -> Self {
        DashboardEvent::NewRequest {
            id: request.id,
            status: request.status,
            submitted_by_manager_id: request.submitted_by_manager_id,
            form_definition_id: request.form_definition_id,
            form_data: request.form_data.clone(),
            kind: Some(MAILBOX_MODIFICATION),
            timestamp: request.timestamp,
        }
    }

    pub fn status_update(id: RequestId, status: RequestStatus) -> Self {
        DashboardEvent::StatusUpdate { id, status }
    }
}
