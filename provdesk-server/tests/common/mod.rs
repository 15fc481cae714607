//! Common test utilities for provdesk integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use provdesk_core::model::Role;
use provdesk_server::store::{DirectoryStore, NewMailbox, NewTempAccount, NewUser};
use provdesk_server::{routes, AppState, InMemoryStore};
use serde_json::{json, Value};

/// Create a test server over an in-memory store. The state handle is
/// returned so tests can seed data and subscribe to the event hub directly.
pub fn create_test_server() -> (TestServer, Arc<AppState<InMemoryStore>>) {
    let state = Arc::new(AppState::new(InMemoryStore::new()));
    let app = routes::create_router(state.clone());
    let server = TestServer::new(app).expect("Failed to create test server");
    (server, state)
}

/// Attach a caller identity to a request
pub fn as_user(request: TestRequest, user_id: i64) -> TestRequest {
    request.add_header(
        HeaderName::from_static("user-id"),
        HeaderValue::from_str(&user_id.to_string()).unwrap(),
    )
}

/// Seed an admin user, returning their id
pub fn seed_admin(state: &AppState<InMemoryStore>) -> i64 {
    state
        .store
        .create_user(NewUser {
            full_name: "Alice Administrator".to_string(),
            email: "alice.admin@example.com".to_string(),
            role: Role::Admin,
            service: Some("IT Department".to_string()),
        })
        .unwrap()
        .id
        .0
}

/// Seed a manager user, returning their id
pub fn seed_manager(state: &AppState<InMemoryStore>, email: &str, service: Option<&str>) -> i64 {
    state
        .store
        .create_user(NewUser {
            full_name: "Bob Manager".to_string(),
            email: email.to_string(),
            role: Role::Manager,
            service: service.map(str::to_string),
        })
        .unwrap()
        .id
        .0
}

/// Seed a temp account, returning its id
pub fn seed_temp_account(state: &AppState<InMemoryStore>, upn: &str, in_use: bool) -> i64 {
    state
        .store
        .create_temp_account(NewTempAccount {
            user_principal_name: upn.to_string(),
            display_name: format!("Temp account {upn}"),
            is_in_use: in_use,
        })
        .unwrap()
        .id
        .0
}

/// Seed a shared mailbox, returning its id
pub fn seed_mailbox(state: &AppState<InMemoryStore>, address: &str) -> i64 {
    state
        .store
        .create_mailbox(NewMailbox {
            display_name: format!("Mailbox {address}"),
            primary_smtp_address: address.to_string(),
            full_access_users: None,
        })
        .unwrap()
        .id
        .0
}

/// Create a form definition over HTTP, returning its id
pub async fn create_form(server: &TestServer, admin_id: i64, name: &str) -> i64 {
    let response = as_user(server.post("/form-definitions"), admin_id)
        .json(&json!({
            "name": name,
            "description": "Standard access request",
            "schema": {
                "title": name,
                "type": "object",
                "properties": {"x": {"type": "integer"}}
            }
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    body["id"].as_i64().unwrap()
}

/// Submit a request over HTTP, returning the created record
pub async fn submit_request(
    server: &TestServer,
    manager_id: i64,
    form_id: i64,
    form_data: Value,
) -> Value {
    let response = as_user(server.post("/requests"), manager_id)
        .json(&json!({
            "form_definition_id": form_id,
            "form_data": form_data,
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    response.json()
}
