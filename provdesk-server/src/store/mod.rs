//! Storage abstractions for the provisioning workflow
//!
//! Two trait seams over one transactional backend: `DirectoryStore` for the
//! directory-shaped entities (users, temp accounts, shared mailboxes and
//! their visibility edges) and `WorkflowStore` for the request lifecycle
//! (form definitions, requests, walkthrough templates, audit trail,
//! analytics). Both backends implement both traits on the same struct, so
//! cross-entity mutations like temp-account assignment stay atomic.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use chrono::NaiveDate;
use provdesk_core::model::{
    AuditEntry, FormDefinition, FormId, MailboxId, ProvisionRequest, RequestId, RequestStatus,
    Role, SharedMailbox, TempAccount, TempAccountId, TemplateId, User, UserId,
    WalkthroughTemplate,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, ApiError>;

/// Offset pagination for list operations
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self { skip: 0, limit: 100 }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub service: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewFormDefinition {
    pub name: String,
    pub description: Option<String>,
    pub schema: Value,
    pub suggested_walkthrough_id: Option<TemplateId>,
}

#[derive(Debug, Clone)]
pub struct NewRequest {
    pub form_definition_id: Option<FormId>,
    pub form_data: Value,
    pub submitted_by_manager_id: UserId,
}

#[derive(Debug, Clone)]
pub struct NewTempAccount {
    pub user_principal_name: String,
    pub display_name: String,
    pub is_in_use: bool,
}

#[derive(Debug, Clone)]
pub struct NewMailbox {
    pub display_name: String,
    pub primary_smtp_address: String,
    pub full_access_users: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewWalkthroughTemplate {
    pub name: String,
    pub description: String,
    pub steps: Value,
    pub tools: Option<Value>,
}

/// Partial update for a walkthrough template; unset fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalkthroughTemplateUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub steps: Option<Value>,
    pub tools: Option<Value>,
}

/// One manager -> mailbox visibility edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MailboxGrant {
    pub manager_id: UserId,
    pub mailbox_id: MailboxId,
}

/// Requests submitted on one calendar day
#[derive(Debug, Clone, Serialize)]
pub struct DailyRequestCount {
    pub date: NaiveDate,
    pub count: i64,
}

/// Requests currently in one status
#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: RequestStatus,
    pub count: i64,
}

/// Trait for directory-shaped storage: users, temp accounts, shared
/// mailboxes, and the manager visibility edge set.
pub trait DirectoryStore: Send + Sync {
    /// Create a user; fails with `EmailTaken` on a duplicate email.
    fn create_user(&self, new: NewUser) -> StoreResult<User>;

    fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    fn list_users(&self, page: Page) -> StoreResult<Vec<User>>;

    /// Update name and service tag (bulk-import upsert path).
    fn update_user(&self, id: UserId, full_name: &str, service: Option<&str>) -> StoreResult<()>;

    /// Create a temp account; fails with `PrincipalNameTaken` on a duplicate
    /// principal name.
    fn create_temp_account(&self, new: NewTempAccount) -> StoreResult<TempAccount>;

    fn get_temp_account(&self, id: TempAccountId) -> StoreResult<Option<TempAccount>>;

    fn get_temp_account_by_principal(&self, upn: &str) -> StoreResult<Option<TempAccount>>;

    fn list_temp_accounts(&self, page: Page) -> StoreResult<Vec<TempAccount>>;

    /// Administrative override of the in-use flag. Returns the prior flag
    /// value alongside the updated account.
    fn set_temp_account_status(
        &self,
        id: TempAccountId,
        in_use: bool,
    ) -> StoreResult<(bool, TempAccount)>;

    /// Update the display name (bulk-import upsert path).
    fn rename_temp_account(&self, id: TempAccountId, display_name: &str) -> StoreResult<()>;

    /// Create a mailbox; fails with `AddressTaken` on a duplicate address.
    fn create_mailbox(&self, new: NewMailbox) -> StoreResult<SharedMailbox>;

    fn get_mailbox(&self, id: MailboxId) -> StoreResult<Option<SharedMailbox>>;

    fn get_mailbox_by_address(&self, address: &str) -> StoreResult<Option<SharedMailbox>>;

    fn list_mailboxes(&self, page: Page) -> StoreResult<Vec<SharedMailbox>>;

    /// Update the display name (bulk-import upsert path).
    fn rename_mailbox(&self, id: MailboxId, display_name: &str) -> StoreResult<()>;

    /// Insert a visibility edge; `GrantExists` if it is already present.
    /// Entity existence is the caller's concern only for role checks; absent
    /// ids fail with the matching NotFound.
    fn grant_mailbox(&self, manager_id: UserId, mailbox_id: MailboxId) -> StoreResult<()>;

    /// Remove a visibility edge; `GrantNotFound` if it is absent.
    fn revoke_mailbox(&self, manager_id: UserId, mailbox_id: MailboxId) -> StoreResult<()>;

    /// Mailboxes visible to one manager.
    fn visible_mailboxes(&self, manager_id: UserId) -> StoreResult<Vec<SharedMailbox>>;

    fn is_mailbox_visible(&self, manager_id: UserId, mailbox_id: MailboxId) -> StoreResult<bool>;

    /// Every visibility edge, for administrative display.
    fn list_mailbox_grants(&self) -> StoreResult<Vec<MailboxGrant>>;
}

/// Trait for the request lifecycle: form definitions, requests,
/// walkthrough templates, the audit trail, and dashboard analytics.
pub trait WorkflowStore: Send + Sync {
    /// Create a form definition; fails with `FormNameTaken` on a duplicate
    /// name. Immutable after creation.
    fn create_form_definition(
        &self,
        new: NewFormDefinition,
        created_by: UserId,
    ) -> StoreResult<FormDefinition>;

    fn get_form_definition(&self, id: FormId) -> StoreResult<Option<FormDefinition>>;

    fn list_form_definitions(&self, page: Page) -> StoreResult<Vec<FormDefinition>>;

    /// Create a request in `pending` with a server-assigned timestamp.
    fn create_request(&self, new: NewRequest) -> StoreResult<ProvisionRequest>;

    fn get_request(&self, id: RequestId) -> StoreResult<Option<ProvisionRequest>>;

    /// Newest-first. `service` filters by the submitting manager's
    /// department tag.
    fn list_requests(
        &self,
        page: Page,
        service: Option<&str>,
    ) -> StoreResult<Vec<ProvisionRequest>>;

    /// Apply a status transition, enforcing the transition table. Returns
    /// the prior status alongside the updated request.
    fn set_request_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        processed_by: UserId,
    ) -> StoreResult<(RequestStatus, ProvisionRequest)>;

    /// Replace the walkthrough progress document wholesale.
    fn set_walkthrough_state(&self, id: RequestId, state: Value) -> StoreResult<ProvisionRequest>;

    /// Atomically mark the account in use and link it to the request.
    /// `AccountInUse` if the flag is already set; partial application is
    /// never observable.
    fn assign_temp_account(
        &self,
        request_id: RequestId,
        account_id: TempAccountId,
    ) -> StoreResult<(ProvisionRequest, TempAccount)>;

    /// Create a template; fails with `TemplateNameTaken` on a duplicate name.
    fn create_walkthrough_template(
        &self,
        new: NewWalkthroughTemplate,
    ) -> StoreResult<WalkthroughTemplate>;

    fn get_walkthrough_template(&self, id: TemplateId) -> StoreResult<Option<WalkthroughTemplate>>;

    fn list_walkthrough_templates(&self, page: Page) -> StoreResult<Vec<WalkthroughTemplate>>;

    fn update_walkthrough_template(
        &self,
        id: TemplateId,
        update: WalkthroughTemplateUpdate,
    ) -> StoreResult<WalkthroughTemplate>;

    fn delete_walkthrough_template(&self, id: TemplateId) -> StoreResult<()>;

    /// Append an audit entry with a server-assigned timestamp.
    fn append_audit(
        &self,
        actor_id: UserId,
        event_type: &str,
        details: Value,
    ) -> StoreResult<AuditEntry>;

    /// Newest-first.
    fn list_audit(&self, page: Page) -> StoreResult<Vec<AuditEntry>>;

    /// Requests per calendar day, newest day first, at most `days` entries.
    fn request_volume_by_day(&self, days: usize) -> StoreResult<Vec<DailyRequestCount>>;

    /// Request count per status.
    fn request_status_breakdown(&self) -> StoreResult<Vec<StatusCount>>;
}
