//! SQLite-based storage implementation

use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use provdesk_core::model::{
    AuditEntry, AuditId, FormDefinition, FormId, MailboxId, ProvisionRequest, RequestId,
    RequestStatus, Role, SharedMailbox, TempAccount, TempAccountId, TemplateId, User, UserId,
    WalkthroughTemplate,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use super::{
    DailyRequestCount, DirectoryStore, MailboxGrant, NewFormDefinition, NewMailbox, NewRequest,
    NewTempAccount, NewUser, NewWalkthroughTemplate, Page, StatusCount, StoreResult,
    WalkthroughTemplateUpdate, WorkflowStore,
};
use crate::error::ApiError;

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// SQLite store implementing both `DirectoryStore` and `WorkflowStore`
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> ApiError {
    ApiError::Internal(e.to_string())
}

/// Map a UNIQUE/constraint violation to the given conflict, everything else
/// to an internal error.
fn constraint(e: rusqlite::Error, conflict: ApiError) -> ApiError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return conflict;
        }
    }
    ApiError::Internal(e.to_string())
}

fn invalid_text(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unrecognized value: {raw}").into(),
    )
}

fn json_col(idx: usize, raw: String) -> rusqlite::Result<Value> {
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let role_raw: String = row.get(3)?;
    Ok(User {
        id: UserId(row.get(0)?),
        full_name: row.get(1)?,
        email: row.get(2)?,
        role: Role::from_str(&role_raw).ok_or_else(|| invalid_text(3, &role_raw))?,
        service: row.get(4)?,
    })
}

fn row_to_form(row: &Row) -> rusqlite::Result<FormDefinition> {
    Ok(FormDefinition {
        id: FormId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        schema: json_col(3, row.get(3)?)?,
        created_by_admin_id: UserId(row.get(4)?),
        suggested_walkthrough_id: row.get::<_, Option<i64>>(5)?.map(TemplateId),
    })
}

fn row_to_request(row: &Row) -> rusqlite::Result<ProvisionRequest> {
    let status_raw: String = row.get(1)?;
    let walkthrough: Option<String> = row.get(3)?;
    let timestamp: String = row.get(4)?;
    Ok(ProvisionRequest {
        id: RequestId(row.get(0)?),
        status: RequestStatus::from_str(&status_raw).ok_or_else(|| invalid_text(1, &status_raw))?,
        form_data: json_col(2, row.get(2)?)?,
        walkthrough_state: walkthrough.map(|raw| json_col(3, raw)).transpose()?,
        timestamp: parse_time(&timestamp),
        submitted_by_manager_id: UserId(row.get(5)?),
        processed_by_admin_id: row.get::<_, Option<i64>>(6)?.map(UserId),
        form_definition_id: row.get::<_, Option<i64>>(7)?.map(FormId),
        assigned_temp_account_id: row.get::<_, Option<i64>>(8)?.map(TempAccountId),
    })
}

fn row_to_temp_account(row: &Row) -> rusqlite::Result<TempAccount> {
    Ok(TempAccount {
        id: TempAccountId(row.get(0)?),
        user_principal_name: row.get(1)?,
        display_name: row.get(2)?,
        is_in_use: row.get::<_, i64>(3)? != 0,
    })
}

fn row_to_mailbox(row: &Row) -> rusqlite::Result<SharedMailbox> {
    Ok(SharedMailbox {
        id: MailboxId(row.get(0)?),
        display_name: row.get(1)?,
        primary_smtp_address: row.get(2)?,
        full_access_users: row.get(3)?,
    })
}

fn row_to_template(row: &Row) -> rusqlite::Result<WalkthroughTemplate> {
    let tools: Option<String> = row.get(4)?;
    Ok(WalkthroughTemplate {
        id: TemplateId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        steps: json_col(3, row.get(3)?)?,
        tools: tools.map(|raw| json_col(4, raw)).transpose()?,
    })
}

fn row_to_audit(row: &Row) -> rusqlite::Result<AuditEntry> {
    let timestamp: String = row.get(1)?;
    Ok(AuditEntry {
        id: AuditId(row.get(0)?),
        timestamp: parse_time(&timestamp),
        actor_id: UserId(row.get(2)?),
        event_type: row.get(3)?,
        details: json_col(4, row.get(4)?)?,
    })
}

const REQUEST_COLUMNS: &str = "id, status, form_data, walkthrough_state, timestamp, \
     submitted_by_manager_id, processed_by_admin_id, form_definition_id, assigned_temp_account_id";

impl SqliteStore {
    /// Open or create a SQLite database at the given path
    pub fn open(path: &str) -> Result<Self, ApiError> {
        let conn = Connection::open(path).map_err(db_err)?;

        // Enable foreign keys
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;

        // Run migrations
        Self::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run database migrations
    fn migrate(conn: &Connection) -> Result<(), ApiError> {
        let current_version = Self::get_schema_version(conn)?;

        if current_version < SCHEMA_VERSION {
            tracing::info!(
                current = current_version,
                target = SCHEMA_VERSION,
                "Running database migrations"
            );

            if current_version < 1 {
                Self::migrate_v1(conn)?;
            }

            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )
            .map_err(db_err)?;

            tracing::info!("Database migrations complete");
        }

        Ok(())
    }

    /// Get current schema version (0 if no schema exists)
    fn get_schema_version(conn: &Connection) -> Result<i32, ApiError> {
        let table_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
                [],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        if !table_exists {
            return Ok(0);
        }

        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0).map(|v| v.unwrap_or(0))
        })
        .map_err(db_err)
    }

    /// Migration to version 1: initial schema
    fn migrate_v1(conn: &Connection) -> Result<(), ApiError> {
        conn.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- Directory users (managers and admins)
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                role TEXT NOT NULL,
                service TEXT
            );

            -- Fulfillment checklists
            CREATE TABLE IF NOT EXISTS walkthrough_templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                steps TEXT NOT NULL,
                tools TEXT
            );

            -- Admin-authored form schemas
            CREATE TABLE IF NOT EXISTS form_definitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                schema TEXT NOT NULL,
                created_by_admin_id INTEGER NOT NULL REFERENCES users(id),
                suggested_walkthrough_id INTEGER REFERENCES walkthrough_templates(id)
            );

            -- Pooled temporary directory accounts
            CREATE TABLE IF NOT EXISTS temp_accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_principal_name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                display_name TEXT NOT NULL,
                is_in_use INTEGER NOT NULL DEFAULT 0
            );

            -- Access requests
            CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL,
                form_data TEXT NOT NULL,
                walkthrough_state TEXT,
                timestamp TEXT NOT NULL,
                submitted_by_manager_id INTEGER NOT NULL REFERENCES users(id),
                processed_by_admin_id INTEGER REFERENCES users(id),
                form_definition_id INTEGER REFERENCES form_definitions(id),
                assigned_temp_account_id INTEGER REFERENCES temp_accounts(id)
            );
            CREATE INDEX IF NOT EXISTS idx_requests_submitter ON requests(submitted_by_manager_id);

            -- Shared mailboxes
            CREATE TABLE IF NOT EXISTS shared_mailboxes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                display_name TEXT NOT NULL,
                primary_smtp_address TEXT NOT NULL UNIQUE COLLATE NOCASE,
                full_access_users TEXT
            );

            -- Manager -> mailbox visibility edges
            CREATE TABLE IF NOT EXISTS manager_mailbox (
                manager_id INTEGER NOT NULL REFERENCES users(id),
                mailbox_id INTEGER NOT NULL REFERENCES shared_mailboxes(id),
                PRIMARY KEY (manager_id, mailbox_id)
            );

            -- Append-only audit trail
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                actor_id INTEGER NOT NULL REFERENCES users(id),
                event_type TEXT NOT NULL,
                details TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_event_type ON audit_log(event_type);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn fetch_request(conn: &Connection, id: RequestId) -> StoreResult<Option<ProvisionRequest>> {
        conn.query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1"),
            params![id.0],
            row_to_request,
        )
        .optional()
        .map_err(db_err)
    }

    fn fetch_temp_account(
        conn: &Connection,
        id: TempAccountId,
    ) -> StoreResult<Option<TempAccount>> {
        conn.query_row(
            "SELECT id, user_principal_name, display_name, is_in_use FROM temp_accounts WHERE id = ?1",
            params![id.0],
            row_to_temp_account,
        )
        .optional()
        .map_err(db_err)
    }

    fn fetch_template(
        conn: &Connection,
        id: TemplateId,
    ) -> StoreResult<Option<WalkthroughTemplate>> {
        conn.query_row(
            "SELECT id, name, description, steps, tools FROM walkthrough_templates WHERE id = ?1",
            params![id.0],
            row_to_template,
        )
        .optional()
        .map_err(db_err)
    }
}

impl DirectoryStore for SqliteStore {
    fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (full_name, email, role, service) VALUES (?1, ?2, ?3, ?4)",
            params![new.full_name, new.email, new.role.as_str(), new.service],
        )
        .map_err(|e| constraint(e, ApiError::EmailTaken))?;

        Ok(User {
            id: UserId(conn.last_insert_rowid()),
            full_name: new.full_name,
            email: new.email,
            role: new.role,
            service: new.service,
        })
    }

    fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, full_name, email, role, service FROM users WHERE id = ?1",
            params![id.0],
            row_to_user,
        )
        .optional()
        .map_err(db_err)
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, full_name, email, role, service FROM users WHERE email = ?1",
            params![email],
            row_to_user,
        )
        .optional()
        .map_err(db_err)
    }

    fn list_users(&self, page: Page) -> StoreResult<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, full_name, email, role, service FROM users ORDER BY id LIMIT ?1 OFFSET ?2")
            .map_err(db_err)?;
        let users = stmt
            .query_map(params![page.limit as i64, page.skip as i64], row_to_user)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(users)
    }

    fn update_user(&self, id: UserId, full_name: &str, service: Option<&str>) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows_affected = conn
            .execute(
                "UPDATE users SET full_name = ?1, service = ?2 WHERE id = ?3",
                params![full_name, service, id.0],
            )
            .map_err(db_err)?;
        if rows_affected == 0 {
            return Err(ApiError::UserNotFound);
        }
        Ok(())
    }

    fn create_temp_account(&self, new: NewTempAccount) -> StoreResult<TempAccount> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO temp_accounts (user_principal_name, display_name, is_in_use) VALUES (?1, ?2, ?3)",
            params![new.user_principal_name, new.display_name, new.is_in_use as i64],
        )
        .map_err(|e| constraint(e, ApiError::PrincipalNameTaken))?;

        Ok(TempAccount {
            id: TempAccountId(conn.last_insert_rowid()),
            user_principal_name: new.user_principal_name,
            display_name: new.display_name,
            is_in_use: new.is_in_use,
        })
    }

    fn get_temp_account(&self, id: TempAccountId) -> StoreResult<Option<TempAccount>> {
        let conn = self.conn.lock().unwrap();
        Self::fetch_temp_account(&conn, id)
    }

    fn get_temp_account_by_principal(&self, upn: &str) -> StoreResult<Option<TempAccount>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, user_principal_name, display_name, is_in_use FROM temp_accounts WHERE user_principal_name = ?1",
            params![upn],
            row_to_temp_account,
        )
        .optional()
        .map_err(db_err)
    }

    fn list_temp_accounts(&self, page: Page) -> StoreResult<Vec<TempAccount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, user_principal_name, display_name, is_in_use FROM temp_accounts ORDER BY id LIMIT ?1 OFFSET ?2")
            .map_err(db_err)?;
        let accounts = stmt
            .query_map(params![page.limit as i64, page.skip as i64], row_to_temp_account)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(accounts)
    }

    fn set_temp_account_status(
        &self,
        id: TempAccountId,
        in_use: bool,
    ) -> StoreResult<(bool, TempAccount)> {
        let conn = self.conn.lock().unwrap();
        let prior = Self::fetch_temp_account(&conn, id)?
            .ok_or(ApiError::TempAccountNotFound)?
            .is_in_use;

        conn.execute(
            "UPDATE temp_accounts SET is_in_use = ?1 WHERE id = ?2",
            params![in_use as i64, id.0],
        )
        .map_err(db_err)?;

        let updated = Self::fetch_temp_account(&conn, id)?.ok_or(ApiError::TempAccountNotFound)?;
        Ok((prior, updated))
    }

    fn rename_temp_account(&self, id: TempAccountId, display_name: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows_affected = conn
            .execute(
                "UPDATE temp_accounts SET display_name = ?1 WHERE id = ?2",
                params![display_name, id.0],
            )
            .map_err(db_err)?;
        if rows_affected == 0 {
            return Err(ApiError::TempAccountNotFound);
        }
        Ok(())
    }

    fn create_mailbox(&self, new: NewMailbox) -> StoreResult<SharedMailbox> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO shared_mailboxes (display_name, primary_smtp_address, full_access_users) VALUES (?1, ?2, ?3)",
            params![new.display_name, new.primary_smtp_address, new.full_access_users],
        )
        .map_err(|e| constraint(e, ApiError::AddressTaken))?;

        Ok(SharedMailbox {
            id: MailboxId(conn.last_insert_rowid()),
            display_name: new.display_name,
            primary_smtp_address: new.primary_smtp_address,
            full_access_users: new.full_access_users,
        })
    }

    fn get_mailbox(&self, id: MailboxId) -> StoreResult<Option<SharedMailbox>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, display_name, primary_smtp_address, full_access_users FROM shared_mailboxes WHERE id = ?1",
            params![id.0],
            row_to_mailbox,
        )
        .optional()
        .map_err(db_err)
    }

    fn get_mailbox_by_address(&self, address: &str) -> StoreResult<Option<SharedMailbox>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, display_name, primary_smtp_address, full_access_users FROM shared_mailboxes WHERE primary_smtp_address = ?1",
            params![address],
            row_to_mailbox,
        )
        .optional()
        .map_err(db_err)
    }

    fn list_mailboxes(&self, page: Page) -> StoreResult<Vec<SharedMailbox>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, display_name, primary_smtp_address, full_access_users FROM shared_mailboxes ORDER BY id LIMIT ?1 OFFSET ?2")
            .map_err(db_err)?;
        let mailboxes = stmt
            .query_map(params![page.limit as i64, page.skip as i64], row_to_mailbox)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(mailboxes)
    }

    fn rename_mailbox(&self, id: MailboxId, display_name: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows_affected = conn
            .execute(
                "UPDATE shared_mailboxes SET display_name = ?1 WHERE id = ?2",
                params![display_name, id.0],
            )
            .map_err(db_err)?;
        if rows_affected == 0 {
            return Err(ApiError::MailboxNotFound);
        }
        Ok(())
    }

    fn grant_mailbox(&self, manager_id: UserId, mailbox_id: MailboxId) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO manager_mailbox (manager_id, mailbox_id) VALUES (?1, ?2)",
            params![manager_id.0, mailbox_id.0],
        )
        .map_err(|e| constraint(e, ApiError::GrantExists))?;
        Ok(())
    }

    fn revoke_mailbox(&self, manager_id: UserId, mailbox_id: MailboxId) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows_affected = conn
            .execute(
                "DELETE FROM manager_mailbox WHERE manager_id = ?1 AND mailbox_id = ?2",
                params![manager_id.0, mailbox_id.0],
            )
            .map_err(db_err)?;
        if rows_affected == 0 {
            return Err(ApiError::GrantNotFound);
        }
        Ok(())
    }

    fn visible_mailboxes(&self, manager_id: UserId) -> StoreResult<Vec<SharedMailbox>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT m.id, m.display_name, m.primary_smtp_address, m.full_access_users
                 FROM shared_mailboxes m
                 JOIN manager_mailbox g ON g.mailbox_id = m.id
                 WHERE g.manager_id = ?1
                 ORDER BY m.id",
            )
            .map_err(db_err)?;
        let mailboxes = stmt
            .query_map(params![manager_id.0], row_to_mailbox)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(mailboxes)
    }

    fn is_mailbox_visible(&self, manager_id: UserId, mailbox_id: MailboxId) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM manager_mailbox WHERE manager_id = ?1 AND mailbox_id = ?2)",
            params![manager_id.0, mailbox_id.0],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn list_mailbox_grants(&self) -> StoreResult<Vec<MailboxGrant>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT manager_id, mailbox_id FROM manager_mailbox ORDER BY manager_id, mailbox_id")
            .map_err(db_err)?;
        let grants = stmt
            .query_map([], |row| {
                Ok(MailboxGrant {
                    manager_id: UserId(row.get(0)?),
                    mailbox_id: MailboxId(row.get(1)?),
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(grants)
    }
}

impl WorkflowStore for SqliteStore {
    fn create_form_definition(
        &self,
        new: NewFormDefinition,
        created_by: UserId,
    ) -> StoreResult<FormDefinition> {
        let conn = self.conn.lock().unwrap();
        let schema =
            serde_json::to_string(&new.schema).map_err(|e| ApiError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO form_definitions (name, description, schema, created_by_admin_id, suggested_walkthrough_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.name,
                new.description,
                schema,
                created_by.0,
                new.suggested_walkthrough_id.map(|t| t.0)
            ],
        )
        .map_err(|e| constraint(e, ApiError::FormNameTaken))?;

        Ok(FormDefinition {
            id: FormId(conn.last_insert_rowid()),
            name: new.name,
            description: new.description,
            schema: new.schema,
            created_by_admin_id: created_by,
            suggested_walkthrough_id: new.suggested_walkthrough_id,
        })
    }

    fn get_form_definition(&self, id: FormId) -> StoreResult<Option<FormDefinition>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, description, schema, created_by_admin_id, suggested_walkthrough_id
             FROM form_definitions WHERE id = ?1",
            params![id.0],
            row_to_form,
        )
        .optional()
        .map_err(db_err)
    }

    fn list_form_definitions(&self, page: Page) -> StoreResult<Vec<FormDefinition>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, description, schema, created_by_admin_id, suggested_walkthrough_id
                 FROM form_definitions ORDER BY id LIMIT ?1 OFFSET ?2",
            )
            .map_err(db_err)?;
        let forms = stmt
            .query_map(params![page.limit as i64, page.skip as i64], row_to_form)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(forms)
    }

    fn create_request(&self, new: NewRequest) -> StoreResult<ProvisionRequest> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let form_data =
            serde_json::to_string(&new.form_data).map_err(|e| ApiError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO requests (status, form_data, timestamp, submitted_by_manager_id, form_definition_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                RequestStatus::Pending.as_str(),
                form_data,
                now.to_rfc3339(),
                new.submitted_by_manager_id.0,
                new.form_definition_id.map(|f| f.0)
            ],
        )
        .map_err(db_err)?;

        Ok(ProvisionRequest {
            id: RequestId(conn.last_insert_rowid()),
            status: RequestStatus::Pending,
            form_data: new.form_data,
            walkthrough_state: None,
            timestamp: now,
            submitted_by_manager_id: new.submitted_by_manager_id,
            processed_by_admin_id: None,
            form_definition_id: new.form_definition_id,
            assigned_temp_account_id: None,
        })
    }

    fn get_request(&self, id: RequestId) -> StoreResult<Option<ProvisionRequest>> {
        let conn = self.conn.lock().unwrap();
        Self::fetch_request(&conn, id)
    }

    fn list_requests(
        &self,
        page: Page,
        service: Option<&str>,
    ) -> StoreResult<Vec<ProvisionRequest>> {
        let conn = self.conn.lock().unwrap();
        let requests = match service {
            Some(tag) => {
                let mut stmt = conn
                    .prepare(
                        "SELECT r.id, r.status, r.form_data, r.walkthrough_state, r.timestamp,
                                r.submitted_by_manager_id, r.processed_by_admin_id,
                                r.form_definition_id, r.assigned_temp_account_id
                         FROM requests r
                         JOIN users u ON u.id = r.submitted_by_manager_id
                         WHERE u.service = ?1
                         ORDER BY r.timestamp DESC, r.id DESC LIMIT ?2 OFFSET ?3",
                    )
                    .map_err(db_err)?;
                let out = stmt
                    .query_map(
                        params![tag, page.limit as i64, page.skip as i64],
                        row_to_request,
                    )
                    .map_err(db_err)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(db_err)?;
                out
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {REQUEST_COLUMNS} FROM requests
                         ORDER BY timestamp DESC, id DESC LIMIT ?1 OFFSET ?2"
                    ))
                    .map_err(db_err)?;
                let out = stmt
                    .query_map(params![page.limit as i64, page.skip as i64], row_to_request)
                    .map_err(db_err)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(db_err)?;
                out
            }
        };
        Ok(requests)
    }

    fn set_request_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        processed_by: UserId,
    ) -> StoreResult<(RequestStatus, ProvisionRequest)> {
        let conn = self.conn.lock().unwrap();
        let prior = Self::fetch_request(&conn, id)?
            .ok_or(ApiError::RequestNotFound)?
            .status;
        if !prior.can_transition_to(status) {
            return Err(ApiError::IllegalTransition { from: prior, to: status });
        }

        conn.execute(
            "UPDATE requests SET status = ?1, processed_by_admin_id = ?2 WHERE id = ?3",
            params![status.as_str(), processed_by.0, id.0],
        )
        .map_err(db_err)?;

        let updated = Self::fetch_request(&conn, id)?.ok_or(ApiError::RequestNotFound)?;
        Ok((prior, updated))
    }

    fn set_walkthrough_state(&self, id: RequestId, state: Value) -> StoreResult<ProvisionRequest> {
        let conn = self.conn.lock().unwrap();
        let raw = serde_json::to_string(&state).map_err(|e| ApiError::Internal(e.to_string()))?;
        let rows_affected = conn
            .execute(
                "UPDATE requests SET walkthrough_state = ?1 WHERE id = ?2",
                params![raw, id.0],
            )
            .map_err(db_err)?;
        if rows_affected == 0 {
            return Err(ApiError::RequestNotFound);
        }
        Self::fetch_request(&conn, id)?.ok_or(ApiError::RequestNotFound)
    }

    fn assign_temp_account(
        &self,
        request_id: RequestId,
        account_id: TempAccountId,
    ) -> StoreResult<(ProvisionRequest, TempAccount)> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let request_exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM requests WHERE id = ?1)",
                params![request_id.0],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if !request_exists {
            return Err(ApiError::RequestNotFound);
        }

        let in_use: Option<bool> = tx
            .query_row(
                "SELECT is_in_use FROM temp_accounts WHERE id = ?1",
                params![account_id.0],
                |row| row.get::<_, i64>(0).map(|v| v != 0),
            )
            .optional()
            .map_err(db_err)?;
        match in_use {
            None => return Err(ApiError::TempAccountNotFound),
            Some(true) => return Err(ApiError::AccountInUse),
            Some(false) => {}
        }

        // Flag flip and request link commit together or not at all
        tx.execute(
            "UPDATE temp_accounts SET is_in_use = 1 WHERE id = ?1",
            params![account_id.0],
        )
        .map_err(db_err)?;
        tx.execute(
            "UPDATE requests SET assigned_temp_account_id = ?1 WHERE id = ?2",
            params![account_id.0, request_id.0],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        let request = Self::fetch_request(&conn, request_id)?.ok_or(ApiError::RequestNotFound)?;
        let account =
            Self::fetch_temp_account(&conn, account_id)?.ok_or(ApiError::TempAccountNotFound)?;
        Ok((request, account))
    }

    fn create_walkthrough_template(
        &self,
        new: NewWalkthroughTemplate,
    ) -> StoreResult<WalkthroughTemplate> {
        let conn = self.conn.lock().unwrap();
        let steps =
            serde_json::to_string(&new.steps).map_err(|e| ApiError::Internal(e.to_string()))?;
        let tools = new
            .tools
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO walkthrough_templates (name, description, steps, tools) VALUES (?1, ?2, ?3, ?4)",
            params![new.name, new.description, steps, tools],
        )
        .map_err(|e| constraint(e, ApiError::TemplateNameTaken))?;

        Ok(WalkthroughTemplate {
            id: TemplateId(conn.last_insert_rowid()),
            name: new.name,
            description: new.description,
            steps: new.steps,
            tools: new.tools,
        })
    }

    fn get_walkthrough_template(&self, id: TemplateId) -> StoreResult<Option<WalkthroughTemplate>> {
        let conn = self.conn.lock().unwrap();
        Self::fetch_template(&conn, id)
    }

    fn list_walkthrough_templates(&self, page: Page) -> StoreResult<Vec<WalkthroughTemplate>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, name, description, steps, tools FROM walkthrough_templates ORDER BY id LIMIT ?1 OFFSET ?2")
            .map_err(db_err)?;
        let templates = stmt
            .query_map(params![page.limit as i64, page.skip as i64], row_to_template)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(templates)
    }

    fn update_walkthrough_template(
        &self,
        id: TemplateId,
        update: WalkthroughTemplateUpdate,
    ) -> StoreResult<WalkthroughTemplate> {
        let conn = self.conn.lock().unwrap();
        let mut template = Self::fetch_template(&conn, id)?.ok_or(ApiError::TemplateNotFound)?;
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

        let steps = serde_json::to_string(&template.steps)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let tools = template
            .tools
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        conn.execute(
            "UPDATE walkthrough_templates SET name = ?1, description = ?2, steps = ?3, tools = ?4 WHERE id = ?5",
            params![template.name, template.description, steps, tools, id.0],
        )
        .map_err(|e| constraint(e, ApiError::TemplateNameTaken))?;

        Ok(template)
    }

    fn delete_walkthrough_template(&self, id: TemplateId) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows_affected = conn
            .execute("DELETE FROM walkthrough_templates WHERE id = ?1", params![id.0])
            .map_err(db_err)?;
        if rows_affected == 0 {
            return Err(ApiError::TemplateNotFound);
        }
        Ok(())
    }

    fn append_audit(
        &self,
        actor_id: UserId,
        event_type: &str,
        details: Value,
    ) -> StoreResult<AuditEntry> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let raw = serde_json::to_string(&details).map_err(|e| ApiError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO audit_log (timestamp, actor_id, event_type, details) VALUES (?1, ?2, ?3, ?4)",
            params![now.to_rfc3339(), actor_id.0, event_type, raw],
        )
        .map_err(db_err)?;

        Ok(AuditEntry {
            id: AuditId(conn.last_insert_rowid()),
            timestamp: now,
            actor_id,
            event_type: event_type.to_string(),
            details,
        })
    }

    fn list_audit(&self, page: Page) -> StoreResult<Vec<AuditEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, actor_id, event_type, details FROM audit_log
                 ORDER BY timestamp DESC, id DESC LIMIT ?1 OFFSET ?2",
            )
            .map_err(db_err)?;
        let entries = stmt
            .query_map(params![page.limit as i64, page.skip as i64], row_to_audit)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(entries)
    }

    fn request_volume_by_day(&self, days: usize) -> StoreResult<Vec<DailyRequestCount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT substr(timestamp, 1, 10) AS day, COUNT(*) FROM requests
                 GROUP BY day ORDER BY day DESC LIMIT ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![days as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(day, count)| {
                let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map_err(|e| ApiError::Internal(e.to_string()))?;
                Ok(DailyRequestCount { date, count })
            })
            .collect()
    }

    fn request_status_breakdown(&self) -> StoreResult<Vec<StatusCount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM requests GROUP BY status ORDER BY status")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                let status_raw: String = row.get(0)?;
                let status = RequestStatus::from_str(&status_raw)
                    .ok_or_else(|| invalid_text(0, &status_raw))?;
                Ok(StatusCount {
                    status,
                    count: row.get(1)?,
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn open_store() -> SqliteStore {
        SqliteStore::open(":memory:").unwrap()
    }

    fn seed_manager(store: &SqliteStore) -> User {
        store
            .create_user(NewUser {
                full_name: "Bob Manager".to_string(),
                email: "bob@example.com".to_string(),
                role: Role::Manager,
                service: Some("Sales".to_string()),
            })
            .unwrap()
    }

    #[test]
    fn test_schema_version_recorded() {
        let store = open_store();
        let conn = store.conn.lock().unwrap();
        let version = SqliteStore::get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_request_round_trip() {
        let store = open_store();
        let bob = seed_manager(&store);
        let created = store
            .create_request(NewRequest {
                form_definition_id: None,
                form_data: json!({"x": 1}),
                submitted_by_manager_id: bob.id,
            })
            .unwrap();

        let fetched = store.get_request(created.id).unwrap().unwrap();
        assert_eq!(fetched.status, RequestStatus::Pending);
        assert_eq!(fetched.form_data, json!({"x": 1}));
        assert_eq!(fetched.submitted_by_manager_id, bob.id);
    }

    #[test]
    fn test_assignment_conflict_leaves_request_unlinked() {
        let store = open_store();
        let bob = seed_manager(&store);
        let first = store
            .create_request(NewRequest {
                form_definition_id: None,
                form_data: json!({}),
                submitted_by_manager_id: bob.id,
            })
            .unwrap();
        let second = store
            .create_request(NewRequest {
                form_definition_id: None,
                form_data: json!({}),
                submitted_by_manager_id: bob.id,
            })
            .unwrap();
        let account = store
            .create_temp_account(NewTempAccount {
                user_principal_name: "temp001@example.com".to_string(),
                display_name: "Temp 001".to_string(),
                is_in_use: false,
            })
            .unwrap();

        store.assign_temp_account(first.id, account.id).unwrap();
        let err = store.assign_temp_account(second.id, account.id);
        assert!(matches!(err, Err(ApiError::AccountInUse)));

        let second = store.get_request(second.id).unwrap().unwrap();
        assert_eq!(second.assigned_temp_account_id, None);
    }

    #[test]
    fn test_duplicate_principal_name_maps_to_conflict() {
        let store = open_store();
        let new = NewTempAccount {
            user_principal_name: "temp001@example.com".to_string(),
            display_name: "Temp 001".to_string(),
            is_in_use: false,
        };
        store.create_temp_account(new.clone()).unwrap();
        assert!(matches!(
            store.create_temp_account(new),
            Err(ApiError::PrincipalNameTaken)
        ));
    }

    #[test]
    fn test_audit_listed_newest_first() {
        let store = open_store();
        let bob = seed_manager(&store);
        store.append_audit(bob.id, "first", json!({})).unwrap();
        store.append_audit(bob.id, "second", json!({})).unwrap();

        let entries = store.list_audit(Page::default()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event_type, "second");
    }
}
