//! Walkthrough templates and per-request checklist progress

mod common;

use common::{as_user, create_form, create_test_server, seed_admin, seed_manager, submit_request};
use serde_json::{json, Value};

async fn create_template(server: &axum_test::TestServer, admin: i64, name: &str) -> i64 {
    let response = as_user(server.post("/walkthrough-templates"), admin)
        .json(&json!({
            "name": name,
            "description": "Complete checklist for setting up a new employee",
            "steps": {"steps": [
                {"id": 1, "title": "Create directory account", "completed": false},
                {"id": 2, "title": "Assign mailbox", "completed": false}
            ]},
            "tools": ["new_user_form", "temp_account_assignment"]
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_template_crud_cycle() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let template = create_template(&server, admin, "New Employee Onboarding").await;

    // Reads are open
    let response = server.get(&format!("/walkthrough-templates/{template}")).await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["name"], "New Employee Onboarding");
    assert_eq!(body["tools"][0], "new_user_form");

    // Partial update keeps unset fields
    let response = as_user(server.put(&format!("/walkthrough-templates/{template}")), admin)
        .json(&json!({"description": "Updated checklist"}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["description"], "Updated checklist");
    assert_eq!(body["name"], "New Employee Onboarding");

    let response = as_user(
        server.delete(&format!("/walkthrough-templates/{template}")),
        admin,
    )
    .await;
    assert_eq!(response.status_code(), 200);

    let response = server.get(&format!("/walkthrough-templates/{template}")).await;
    assert_eq!(response.status_code(), 404);

    let response = as_user(
        server.delete(&format!("/walkthrough-templates/{template}")),
        admin,
    )
    .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_duplicate_template_name_conflicts() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    create_template(&server, admin, "Onboarding").await;

    let response = as_user(server.post("/walkthrough-templates"), admin)
        .json(&json!({"name": "Onboarding", "description": "again", "steps": []}))
        .await;
    assert_eq!(response.status_code(), 409);
}

#[tokio::test]
async fn test_template_mutations_require_admin() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let template = create_template(&server, admin, "Onboarding").await;

    let response = as_user(server.post("/walkthrough-templates"), manager)
        .json(&json!({"name": "Other", "description": "x", "steps": []}))
        .await;
    assert_eq!(response.status_code(), 403);

    let response = as_user(server.put(&format!("/walkthrough-templates/{template}")), manager)
        .json(&json!({"name": "Hijacked"}))
        .await;
    assert_eq!(response.status_code(), 403);
}

/// A form may suggest a walkthrough; the reference must resolve.
#[tokio::test]
async fn test_form_references_template() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let template = create_template(&server, admin, "Onboarding").await;

    let response = as_user(server.post("/form-definitions"), admin)
        .json(&json!({
            "name": "F1",
            "schema": {},
            "suggested_walkthrough_id": template
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["suggested_walkthrough_id"], template);

    let response = as_user(server.post("/form-definitions"), admin)
        .json(&json!({
            "name": "F2",
            "schema": {},
            "suggested_walkthrough_id": 999
        }))
        .await;
    assert_eq!(response.status_code(), 404);
}

/// Walkthrough progress on a request is replaced wholesale.
#[tokio::test]
async fn test_request_walkthrough_state_replaced_wholesale() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let form = create_form(&server, admin, "F1").await;
    let request = submit_request(&server, manager, form, json!({})).await;
    assert_eq!(request["walkthrough_state"], Value::Null);

    let first = json!({"steps": [{"id": 1, "completed": true}, {"id": 2, "completed": false}]});
    let response = as_user(
        server.put(&format!("/requests/{}/walkthrough", request["id"])),
        admin,
    )
    .json(&first)
    .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["walkthrough_state"], first);

    // No merge: the second document fully replaces the first
    let second = json!({"steps": [{"id": 2, "completed": true}]});
    let response = as_user(
        server.put(&format!("/requests/{}/walkthrough", request["id"])),
        admin,
    )
    .json(&second)
    .await;
    let body: Value = response.json();
    assert_eq!(body["walkthrough_state"], second);
}
