//! Entities and identifiers for the provisioning workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Unique form-definition identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormId(pub i64);

/// Unique request identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub i64);

/// Unique temp-account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempAccountId(pub i64);

/// Unique shared-mailbox identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailboxId(pub i64);

/// Unique walkthrough-template identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub i64);

/// Unique audit-log entry identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditId(pub i64);

/// Role a directory user holds in the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Submits requests, manages the mailboxes granted to them
    Manager,
    /// Triages and fulfills requests
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manager" => Some(Role::Manager),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "in_progress" => Some(RequestStatus::InProgress),
            "completed" => Some(RequestStatus::Completed),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }

    /// Completed and rejected requests admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Rejected)
    }

    /// Transition table: pending -> {in_progress, completed, rejected},
    /// in_progress -> {completed, rejected}.
    pub fn can_transition_to(&self, target: RequestStatus) -> bool {
        match self {
            RequestStatus::Pending => target != RequestStatus::Pending,
            RequestStatus::InProgress => {
                matches!(target, RequestStatus::Completed | RequestStatus::Rejected)
            }
            RequestStatus::Completed | RequestStatus::Rejected => false,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directory user (manager or admin)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    /// Department/service tag used to scope which requests a manager sees
    pub service: Option<String>,
}

/// An admin-authored form schema managers submit requests against.
/// Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDefinition {
    pub id: FormId,
    pub name: String,
    pub description: Option<String>,
    /// Arbitrary schema document produced by the form builder
    pub schema: Value,
    pub created_by_admin_id: UserId,
    pub suggested_walkthrough_id: Option<TemplateId>,
}

/// A submitted access request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub id: RequestId,
    pub status: RequestStatus,
    /// The manager's answers, opaque to the workflow
    pub form_data: Value,
    /// Checklist progress, replaced wholesale on update
    pub walkthrough_state: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub submitted_by_manager_id: UserId,
    pub processed_by_admin_id: Option<UserId>,
    /// Absent for mailbox-modification requests
    pub form_definition_id: Option<FormId>,
    pub assigned_temp_account_id: Option<TempAccountId>,
}

/// A pooled temporary directory account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempAccount {
    pub id: TempAccountId,
    pub user_principal_name: String,
    pub display_name: String,
    pub is_in_use: bool,
}

/// A shared mailbox in the external directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedMailbox {
    pub id: MailboxId,
    pub display_name: String,
    pub primary_smtp_address: String,
    /// Semicolon-separated access list, denormalized from the directory
    pub full_access_users: Option<String>,
}

/// Append-only record of an administrative action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub timestamp: DateTime<Utc>,
    pub actor_id: UserId,
    pub event_type: String,
    pub details: Value,
}

/// A named fulfillment checklist with associated tool identifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkthroughTemplate {
    pub id: TemplateId,
    pub name: String,
    pub description: String,
    pub steps: Value,
    pub tools: Option<Value>,
}
