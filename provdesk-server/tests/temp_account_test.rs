//! Temp-account pool: assignment, conflicts, manual overrides

mod common;

use common::{
    as_user, create_form, create_test_server, seed_admin, seed_manager, seed_temp_account,
    submit_request,
};
use serde_json::{json, Value};

/// Assigning a free account flips its flag and links it to the request;
/// a second assignment of the same account conflicts and changes nothing.
#[tokio::test]
async fn test_assign_then_conflict() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let form = create_form(&server, admin, "F1").await;
    let first = submit_request(&server, manager, form, json!({})).await;
    let second = submit_request(&server, manager, form, json!({})).await;
    let account = seed_temp_account(&state, "temp001@example.com", false);

    let response = as_user(
        server.post(&format!("/requests/{}/assign-temp-account", first["id"])),
        admin,
    )
    .json(&json!({"temp_account_id": account}))
    .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["account"]["is_in_use"], true);
    assert_eq!(body["request"]["assigned_temp_account_id"], account);

    // Re-assigning the now in-use account conflicts
    let response = as_user(
        server.post(&format!("/requests/{}/assign-temp-account", second["id"])),
        admin,
    )
    .json(&json!({"temp_account_id": account}))
    .await;
    assert_eq!(response.status_code(), 409);

    // The losing request is untouched
    let response = server.get(&format!("/requests/{}", second["id"])).await;
    let body: Value = response.json();
    assert_eq!(body["assigned_temp_account_id"], Value::Null);
}

#[tokio::test]
async fn test_assign_missing_references() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let form = create_form(&server, admin, "F1").await;
    let request = submit_request(&server, manager, form, json!({})).await;
    let account = seed_temp_account(&state, "temp001@example.com", false);

    // Missing request
    let response = as_user(server.post("/requests/999/assign-temp-account"), admin)
        .json(&json!({"temp_account_id": account}))
        .await;
    assert_eq!(response.status_code(), 404);

    // Missing account
    let response = as_user(
        server.post(&format!("/requests/{}/assign-temp-account", request["id"])),
        admin,
    )
    .json(&json!({"temp_account_id": 999}))
    .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_assignment_requires_admin() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let form = create_form(&server, admin, "F1").await;
    let request = submit_request(&server, manager, form, json!({})).await;
    let account = seed_temp_account(&state, "temp001@example.com", false);

    let response = as_user(
        server.post(&format!("/requests/{}/assign-temp-account", request["id"])),
        manager,
    )
    .json(&json!({"temp_account_id": account}))
    .await;
    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn test_assignment_writes_audit_entry() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let form = create_form(&server, admin, "F1").await;
    let request = submit_request(&server, manager, form, json!({})).await;
    let account = seed_temp_account(&state, "temp001@example.com", false);

    as_user(
        server.post(&format!("/requests/{}/assign-temp-account", request["id"])),
        admin,
    )
    .json(&json!({"temp_account_id": account}))
    .await
    .assert_status_ok();

    let response = as_user(server.get("/audit-logs"), admin).await;
    let entries: Value = response.json();
    let assigned: Vec<_> = entries
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["event_type"] == "temp_account_assigned")
        .collect();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0]["details"]["temp_account_id"], account);
    assert_eq!(assigned[0]["actor_id"], admin);
}

/// Manual status override returns the remediation command and records the
/// before/after state in the audit trail.
#[tokio::test]
async fn test_manual_status_override() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let account = seed_temp_account(&state, "temp001@example.com", true);

    let response = as_user(
        server.put(&format!("/temp-accounts/{account}/status")),
        admin,
    )
    .json(&json!({"is_in_use": false}))
    .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["is_in_use"], false);
    assert_eq!(
        body["remediation_command"],
        "Disable-ADAccount -Identity \"temp001@example.com\""
    );

    let response = as_user(server.get("/audit-logs"), admin).await;
    let entries: Value = response.json();
    let entry = &entries[0];
    assert_eq!(entry["event_type"], "temp_account_status_changed");
    assert_eq!(entry["details"]["from_in_use"], true);
    assert_eq!(entry["details"]["to_in_use"], false);
    assert!(entry["details"]["remediation_command"]
        .as_str()
        .unwrap()
        .starts_with("Disable-ADAccount"));
}

#[tokio::test]
async fn test_create_duplicate_principal_name_conflicts() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    seed_temp_account(&state, "temp001@example.com", false);

    let response = as_user(server.post("/temp-accounts"), admin)
        .json(&json!({
            "user_principal_name": "temp001@example.com",
            "display_name": "Duplicate"
        }))
        .await;
    assert_eq!(response.status_code(), 409);
}

#[tokio::test]
async fn test_list_temp_accounts_is_public_read() {
    let (server, state) = create_test_server();
    seed_temp_account(&state, "temp001@example.com", false);
    seed_temp_account(&state, "temp002@example.com", true);

    let response = server.get("/temp-accounts").await;
    assert_eq!(response.status_code(), 200);
    let accounts: Value = response.json();
    assert_eq!(accounts.as_array().unwrap().len(), 2);
}
