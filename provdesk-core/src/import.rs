//! Bulk-import row extraction
//!
//! Uploaded CSV documents are matched against a recognized header set per
//! document kind. Rows missing a required field (or carrying an unknown
//! role) are skipped and counted, never an error; an unrecognized header
//! set rejects the whole document.

use serde::Serialize;
use thiserror::Error;

use crate::model::Role;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unrecognized header set, expected columns: {0}")]
    UnrecognizedHeader(&'static str),
}

/// Outcome counts of a bulk upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// One temp-account row, keyed by principal name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempAccountRow {
    pub user_principal_name: String,
    pub display_name: String,
}

/// One directory-user row, keyed by email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub service: Option<String>,
}

/// One shared-mailbox row, keyed by SMTP address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxRow {
    pub display_name: String,
    pub primary_smtp_address: String,
    pub full_access_users: Option<String>,
}

/// Split one CSV line into trimmed fields, honoring double quotes.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn column(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h.eq_ignore_ascii_case(name))
}

/// Non-empty field at `index`, if the row has one.
fn field(fields: &[String], index: usize) -> Option<String> {
    fields.get(index).filter(|s| !s.is_empty()).cloned()
}

fn lines_of(input: &str) -> impl Iterator<Item = &str> {
    input.lines().filter(|l| !l.trim().is_empty())
}

/// Extract temp-account rows. Returns the rows plus the skipped-row count.
pub fn temp_account_rows(input: &str) -> Result<(Vec<TempAccountRow>, usize), ImportError> {
    const EXPECTED: &str = "user_principal_name, display_name";
    let mut lines = lines_of(input);
    let header = split_line(lines.next().ok_or(ImportError::UnrecognizedHeader(EXPECTED))?);
    let (Some(upn), Some(name)) = (
        column(&header, "user_principal_name"),
        column(&header, "display_name"),
    ) else {
        return Err(ImportError::UnrecognizedHeader(EXPECTED));
    };

    let mut rows = Vec::new();
    let mut skipped = 0;
    for line in lines {
        let fields = split_line(line);
        match (field(&fields, upn), field(&fields, name)) {
            (Some(user_principal_name), Some(display_name)) => rows.push(TempAccountRow {
                user_principal_name,
                display_name,
            }),
            _ => skipped += 1,
        }
    }
    Ok((rows, skipped))
}

/// Extract directory-user rows. Rows with an unknown role are skipped.
pub fn user_rows(input: &str) -> Result<(Vec<UserRow>, usize), ImportError> {
    const EXPECTED: &str = "full_name, email, role[, service]";
    let mut lines = lines_of(input);
    let header = split_line(lines.next().ok_or(ImportError::UnrecognizedHeader(EXPECTED))?);
    let (Some(name), Some(email), Some(role)) = (
        column(&header, "full_name"),
        column(&header, "email"),
        column(&header, "role"),
    ) else {
        return Err(ImportError::UnrecognizedHeader(EXPECTED));
    };
    let service = column(&header, "service");

    let mut rows = Vec::new();
    let mut skipped = 0;
    for line in lines {
        let fields = split_line(line);
        let parsed_role = field(&fields, role).and_then(|r| Role::from_str(&r));
        match (field(&fields, name), field(&fields, email), parsed_role) {
            (Some(full_name), Some(email), Some(role)) => rows.push(UserRow {
                full_name,
                email,
                role,
                service: service.and_then(|i| field(&fields, i)),
            }),
            _ => skipped += 1,
        }
    }
    Ok((rows, skipped))
}

/// Extract shared-mailbox rows.
pub fn mailbox_rows(input: &str) -> Result<(Vec<MailboxRow>, usize), ImportError> {
    const EXPECTED: &str = "display_name, primary_smtp_address[, full_access_users]";
    let mut lines = lines_of(input);
    let header = split_line(lines.next().ok_or(ImportError::UnrecognizedHeader(EXPECTED))?);
    let (Some(name), Some(address)) = (
        column(&header, "display_name"),
        column(&header, "primary_smtp_address"),
    ) else {
        return Err(ImportError::UnrecognizedHeader(EXPECTED));
    };
    let access = column(&header, "full_access_users");

    let mut rows = Vec::new();
    let mut skipped = 0;
    for line in lines {
        let fields = split_line(line);
        match (field(&fields, name), field(&fields, address)) {
            (Some(display_name), Some(primary_smtp_address)) => rows.push(MailboxRow {
                display_name,
                primary_smtp_address,
                full_access_users: access.and_then(|i| field(&fields, i)),
            }),
            _ => skipped += 1,
        }
    }
    Ok((rows, skipped))
}
