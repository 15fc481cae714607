//! In-memory storage implementation
//!
//! Backs the integration tests and small deployments. Every table is its
//! own `RwLock`; multi-entity mutations take the locks they need for the
//! whole check-and-mutate sequence, so partial state is never observable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use chrono::Utc;
use provdesk_core::model::{
    AuditEntry, AuditId, FormDefinition, FormId, MailboxId, ProvisionRequest, RequestId,
    RequestStatus, SharedMailbox, TempAccount, TempAccountId, TemplateId, User, UserId,
    WalkthroughTemplate,
};
use serde_json::Value;

use super::{
    DailyRequestCount, DirectoryStore, MailboxGrant, NewFormDefinition, NewMailbox, NewRequest,
    NewTempAccount, NewUser, NewWalkthroughTemplate, Page, StatusCount, StoreResult,
    WalkthroughTemplateUpdate, WorkflowStore,
};
use crate::error::ApiError;

/// In-memory store implementing both `DirectoryStore` and `WorkflowStore`
pub struct InMemoryStore {
    users: RwLock<HashMap<UserId, User>>,
    forms: RwLock<HashMap<FormId, FormDefinition>>,
    requests: RwLock<HashMap<RequestId, ProvisionRequest>>,
    temp_accounts: RwLock<HashMap<TempAccountId, TempAccount>>,
    mailboxes: RwLock<HashMap<MailboxId, SharedMailbox>>,
    grants: RwLock<HashSet<(UserId, MailboxId)>>,
    templates: RwLock<HashMap<TemplateId, WalkthroughTemplate>>,
    audit: RwLock<Vec<AuditEntry>>,
    next_id: AtomicI64,
}

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items.into_iter().skip(page.skip).take(page.limit).collect()
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            forms: RwLock::new(HashMap::new()),
            requests: RwLock::new(HashMap::new()),
            temp_accounts: RwLock::new(HashMap::new()),
            mailboxes: RwLock::new(HashMap::new()),
            grants: RwLock::new(HashSet::new()),
            templates: RwLock::new(HashMap::new()),
            audit: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryStore for InMemoryStore {
    fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().unwrap();
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(ApiError::EmailTaken);
        }
        let user = User {
            id: UserId(self.next_id()),
            full_name: new.full_name,
            email: new.email,
            role: new.role,
            service: new.service,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.users.read().unwrap().get(&id).cloned())
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn list_users(&self, page: Page) -> StoreResult<Vec<User>> {
        let mut users: Vec<_> = self.users.read().unwrap().values().cloned().collect();
        users.sort_by_key(|u| u.id.0);
        Ok(paginate(users, page))
    }

    fn update_user(&self, id: UserId, full_name: &str, service: Option<&str>) -> StoreResult<()> {
        let mut users = self.users.write().unwrap();
        let user = users.get_mut(&id).ok_or(ApiError::UserNotFound)?;
        user.full_name = full_name.to_string();
        user.service = service.map(str::to_string);
        Ok(())
    }

    fn create_temp_account(&self, new: NewTempAccount) -> StoreResult<TempAccount> {
        let mut accounts = self.temp_accounts.write().unwrap();
        if accounts
            .values()
            .any(|a| a.user_principal_name.eq_ignore_ascii_case(&new.user_principal_name))
        {
            return Err(ApiError::PrincipalNameTaken);
        }
        let account = TempAccount {
            id: TempAccountId(self.next_id()),
            user_principal_name: new.user_principal_name,
            display_name: new.display_name,
            is_in_use: new.is_in_use,
        };
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    fn get_temp_account(&self, id: TempAccountId) -> StoreResult<Option<TempAccount>> {
        Ok(self.temp_accounts.read().unwrap().get(&id).cloned())
    }

    fn get_temp_account_by_principal(&self, upn: &str) -> StoreResult<Option<TempAccount>> {
        Ok(self
            .temp_accounts
            .read()
            .unwrap()
            .values()
            .find(|a| a.user_principal_name.eq_ignore_ascii_case(upn))
            .cloned())
    }

    fn list_temp_accounts(&self, page: Page) -> StoreResult<Vec<TempAccount>> {
        let mut accounts: Vec<_> = self.temp_accounts.read().unwrap().values().cloned().collect();
        accounts.sort_by_key(|a| a.id.0);
        Ok(paginate(accounts, page))
    }

    fn set_temp_account_status(
        &self,
        id: TempAccountId,
        in_use: bool,
    ) -> StoreResult<(bool, TempAccount)> {
        let mut accounts = self.temp_accounts.write().unwrap();
        let account = accounts.get_mut(&id).ok_or(ApiError::TempAccountNotFound)?;
        let prior = account.is_in_use;
        account.is_in_use = in_use;
        Ok((prior, account.clone()))
    }

    fn rename_temp_account(&self, id: TempAccountId, display_name: &str) -> StoreResult<()> {
        let mut accounts = self.temp_accounts.write().unwrap();
        let account = accounts.get_mut(&id).ok_or(ApiError::TempAccountNotFound)?;
        account.display_name = display_name.to_string();
        Ok(())
    }

    fn create_mailbox(&self, new: NewMailbox) -> StoreResult<SharedMailbox> {
        let mut mailboxes = self.mailboxes.write().unwrap();
        if mailboxes
            .values()
            .any(|m| m.primary_smtp_address.eq_ignore_ascii_case(&new.primary_smtp_address))
        {
            return Err(ApiError::AddressTaken);
        }
        let mailbox = SharedMailbox {
            id: MailboxId(self.next_id()),
            display_name: new.display_name,
            primary_smtp_address: new.primary_smtp_address,
            full_access_users: new.full_access_users,
        };
        mailboxes.insert(mailbox.id, mailbox.clone());
        Ok(mailbox)
    }

    fn get_mailbox(&self, id: MailboxId) -> StoreResult<Option<SharedMailbox>> {
        Ok(self.mailboxes.read().unwrap().get(&id).cloned())
    }

    fn get_mailbox_by_address(&self, address: &str) -> StoreResult<Option<SharedMailbox>> {
        Ok(self
            .mailboxes
            .read()
            .unwrap()
            .values()
            .find(|m| m.primary_smtp_address.eq_ignore_ascii_case(address))
            .cloned())
    }

    fn list_mailboxes(&self, page: Page) -> StoreResult<Vec<SharedMailbox>> {
        let mut mailboxes: Vec<_> = self.mailboxes.read().unwrap().values().cloned().collect();
        mailboxes.sort_by_key(|m| m.id.0);
        Ok(paginate(mailboxes, page))
    }

    fn rename_mailbox(&self, id: MailboxId, display_name: &str) -> StoreResult<()> {
        let mut mailboxes = self.mailboxes.write().unwrap();
        let mailbox = mailboxes.get_mut(&id).ok_or(ApiError::MailboxNotFound)?;
        mailbox.display_name = display_name.to_string();
        Ok(())
    }

    fn grant_mailbox(&self, manager_id: UserId, mailbox_id: MailboxId) -> StoreResult<()> {
        let mut grants = self.grants.write().unwrap();
        if !grants.insert((manager_id, mailbox_id)) {
            return Err(ApiError::GrantExists);
        }
        Ok(())
    }

    fn revoke_mailbox(&self, manager_id: UserId, mailbox_id: MailboxId) -> StoreResult<()> {
        let mut grants = self.grants.write().unwrap();
        if !grants.remove(&(manager_id, mailbox_id)) {
            return Err(ApiError::GrantNotFound);
        }
        Ok(())
    }

    fn visible_mailboxes(&self, manager_id: UserId) -> StoreResult<Vec<SharedMailbox>> {
        let grants = self.grants.read().unwrap();
        let mailboxes = self.mailboxes.read().unwrap();
        let mut visible: Vec<_> = grants
            .iter()
            .filter(|(m, _)| *m == manager_id)
            .filter_map(|(_, mailbox_id)| mailboxes.get(mailbox_id).cloned())
            .collect();
        visible.sort_by_key(|m| m.id.0);
        Ok(visible)
    }

    fn is_mailbox_visible(&self, manager_id: UserId, mailbox_id: MailboxId) -> StoreResult<bool> {
        Ok(self.grants.read().unwrap().contains(&(manager_id, mailbox_id)))
    }

    fn list_mailbox_grants(&self) -> StoreResult<Vec<MailboxGrant>> {
        let mut edges: Vec<_> = self
            .grants
            .read()
            .unwrap()
            .iter()
            .map(|&(manager_id, mailbox_id)| MailboxGrant {
                manager_id,
                mailbox_id,
            })
            .collect();
        edges.sort_by_key(|g| (g.manager_id.0, g.mailbox_id.0));
        Ok(edges)
    }
}

impl WorkflowStore for InMemoryStore {
    fn create_form_definition(
        &self,
        new: NewFormDefinition,
        created_by: UserId,
    ) -> StoreResult<FormDefinition> {
        let mut forms = self.forms.write().unwrap();
        if forms.values().any(|f| f.name == new.name) {
            return Err(ApiError::FormNameTaken);
        }
        let form = FormDefinition {
            id: FormId(self.next_id()),
            name: new.name,
            description: new.description,
            schema: new.schema,
            created_by_admin_id: created_by,
            suggested_walkthrough_id: new.suggested_walkthrough_id,
        };
        forms.insert(form.id, form.clone());
        Ok(form)
    }

    fn get_form_definition(&self, id: FormId) -> StoreResult<Option<FormDefinition>> {
        Ok(self.forms.read().unwrap().get(&id).cloned())
    }

    fn list_form_definitions(&self, page: Page) -> StoreResult<Vec<FormDefinition>> {
        let mut forms: Vec<_> = self.forms.read().unwrap().values().cloned().collect();
        forms.sort_by_key(|f| f.id.0);
        Ok(paginate(forms, page))
    }

    fn create_request(&self, new: NewRequest) -> StoreResult<ProvisionRequest> {
        let mut requests = self.requests.write().unwrap();
        let request = ProvisionRequest {
            id: RequestId(self.next_id()),
            status: RequestStatus::Pending,
            form_data: new.form_data,
            walkthrough_state: None,
            timestamp: Utc::now(),
            submitted_by_manager_id: new.submitted_by_manager_id,
            processed_by_admin_id: None,
            form_definition_id: new.form_definition_id,
            assigned_temp_account_id: None,
        };
        requests.insert(request.id, request.clone());
        Ok(request)
    }

    fn get_request(&self, id: RequestId) -> StoreResult<Option<ProvisionRequest>> {
        Ok(self.requests.read().unwrap().get(&id).cloned())
    }

    fn list_requests(
        &self,
        page: Page,
        service: Option<&str>,
    ) -> StoreResult<Vec<ProvisionRequest>> {
        let requests = self.requests.read().unwrap();
        let users = self.users.read().unwrap();
        let mut rows: Vec<_> = requests
            .values()
            .filter(|r| match service {
                Some(tag) => users
                    .get(&r.submitted_by_manager_id)
                    .and_then(|u| u.service.as_deref())
                    .is_some_and(|s| s == tag),
                None => true,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.0.cmp(&a.id.0)));
        Ok(paginate(rows, page))
    }

    fn set_request_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        processed_by: UserId,
    ) -> StoreResult<(RequestStatus, ProvisionRequest)> {
        let mut requests = self.requests.write().unwrap();
        let request = requests.get_mut(&id).ok_or(ApiError::RequestNotFound)?;
        let prior = request.status;
        if !prior.can_transition_to(status) {
            return Err(ApiError::IllegalTransition { from: prior, to: status });
        }
        request.status = status;
        request.processed_by_admin_id = Some(processed_by);
        Ok((prior, request.clone()))
    }

    fn set_walkthrough_state(&self, id: RequestId, state: Value) -> StoreResult<ProvisionRequest> {
        let mut requests = self.requests.write().unwrap();
        let request = requests.get_mut(&id).ok_or(ApiError::RequestNotFound)?;
        request.walkthrough_state = Some(state);
        Ok(request.clone())
    }

    fn assign_temp_account(
        &self,
        request_id: RequestId,
        account_id: TempAccountId,
    ) -> StoreResult<(ProvisionRequest, TempAccount)> {
        // Both locks held across check and mutate: all-or-nothing.
        let mut requests = self.requests.write().unwrap();
        let mut accounts = self.temp_accounts.write().unwrap();

        let request = requests.get_mut(&request_id).ok_or(ApiError::RequestNotFound)?;
        let account = accounts.get_mut(&account_id).ok_or(ApiError::TempAccountNotFound)?;
        if account.is_in_use {
            return Err(ApiError::AccountInUse);
        }

        account.is_in_use = true;
        request.assigned_temp_account_id = Some(account_id);
        Ok((request.clone(), account.clone()))
    }

    fn create_walkthrough_template(
        &self,
        new: NewWalkthroughTemplate,
    ) -> StoreResult<WalkthroughTemplate> {
        let mut templates = self.templates.write().unwrap();
        if templates.values().any(|t| t.name == new.name) {
            return Err(ApiError::TemplateNameTaken);
        }
        let template = WalkthroughTemplate {
            id: TemplateId(self.next_id()),
            name: new.name,
            description: new.description,
            steps: new.steps,
            tools: new.tools,
        };
        templates.insert(template.id, template.clone());
        Ok(template)
    }

    fn get_walkthrough_template(&self, id: TemplateId) -> StoreResult<Option<WalkthroughTemplate>> {
        Ok(self.templates.read().unwrap().get(&id).cloned())
    }

    fn list_walkthrough_templates(&self, page: Page) -> StoreResult<Vec<WalkthroughTemplate>> {
        let mut templates: Vec<_> = self.templates.read().unwrap().values().cloned().collect();
        templates.sort_by_key(|t| t.id.0);
        Ok(paginate(templates, page))
    }

    fn update_walkthrough_template(
        &self,
        id: TemplateId,
        update: WalkthroughTemplateUpdate,
    ) -> StoreResult<WalkthroughTemplate> {
        let mut templates = self.templates.write().unwrap();
        let template = templates.get_mut(&id).ok_or(ApiError::TemplateNotFound)?;
        if let Some(name) = update.name {
            template.name = name;
        }
        if let Some(description) = update.description {
            template.description = description;
        }
        if let Some(steps) = update.steps {
            template.steps = steps;
        }
        if let Some(tools) = update.tools {
            template.tools = Some(tools);
        }
        Ok(template.clone())
    }

    fn delete_walkthrough_template(&self, id: TemplateId) -> StoreResult<()> {
        self.templates
            .write()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(ApiError::TemplateNotFound)
    }

    fn append_audit(
        &self,
        actor_id: UserId,
        event_type: &str,
        details: Value,
    ) -> StoreResult<AuditEntry> {
        let mut audit = self.audit.write().unwrap();
        let entry = AuditEntry {
            id: AuditId(self.next_id()),
            timestamp: Utc::now(),
            actor_id,
            event_type: event_type.to_string(),
            details,
        };
        audit.push(entry.clone());
        Ok(entry)
    }

    fn list_audit(&self, page: Page) -> StoreResult<Vec<AuditEntry>> {
        let audit = self.audit.read().unwrap();
        Ok(paginate(audit.iter().rev().cloned().collect(), page))
    }

    fn request_volume_by_day(&self, days: usize) -> StoreResult<Vec<DailyRequestCount>> {
        let requests = self.requests.read().unwrap();
        let mut by_day: HashMap<chrono::NaiveDate, i64> = HashMap::new();
        for request in requests.values() {
            *by_day.entry(request.timestamp.date_naive()).or_default() += 1;
        }
        let mut counts: Vec<_> = by_day
            .into_iter()
            .map(|(date, count)| DailyRequestCount { date, count })
            .collect();
        counts.sort_by(|a, b| b.date.cmp(&a.date));
        counts.truncate(days);
        Ok(counts)
    }

    fn request_status_breakdown(&self) -> StoreResult<Vec<StatusCount>> {
        let requests = self.requests.read().unwrap();
        let statuses = [
            RequestStatus::Pending,
            RequestStatus::InProgress,
            RequestStatus::Completed,
            RequestStatus::Rejected,
        ];
        Ok(statuses
            .into_iter()
            .map(|status| StatusCount {
                status,
                count: requests.values().filter(|r| r.status == status).count() as i64,
            })
            .filter(|c| c.count > 0)
            .collect())
    }
}
