//! Directory remediation command formatting
//!
//! Local state changes (a new user, a temp account flipped in or out of use,
//! a mailbox access change) correspond to changes an operator must apply in
//! the external directory. These formatters produce the matching command
//! strings; the workflow returns them to callers and records them in audit
//! details but never executes them.

/// Escape a value for embedding in a double-quoted PowerShell string.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('`', "``").replace('"', "`\""))
}

/// Command creating a directory account for a newly registered user.
pub fn new_user_command(full_name: &str, email: &str) -> String {
    format!(
        "New-ADUser -Name {} -EmailAddress {} -Enabled $true",
        quote(full_name),
        quote(email)
    )
}

/// Command reconciling a temp account's directory state with its in-use flag.
pub fn temp_account_status_command(user_principal_name: &str, in_use: bool) -> String {
    let verb = if in_use { "Enable-ADAccount" } else { "Disable-ADAccount" };
    format!("{} -Identity {}", verb, quote(user_principal_name))
}

/// Command granting or removing full access to a shared mailbox.
pub fn mailbox_access_command(mailbox_address: &str, user: &str, grant: bool) -> String {
    let verb = if grant { "Add-MailboxPermission" } else { "Remove-MailboxPermission" };
    format!(
        "{} -Identity {} -User {} -AccessRights FullAccess",
        verb,
        quote(mailbox_address),
        quote(user)
    )
}
