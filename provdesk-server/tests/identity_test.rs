//! Header-derived identity resolution and role guards

mod common;

use common::{as_user, create_test_server, seed_admin, seed_manager};
use axum::http::{HeaderName, HeaderValue};
use serde_json::{json, Value};

#[tokio::test]
async fn test_anonymous_reads_allowed() {
    let (server, _state) = create_test_server();

    for path in ["/", "/users", "/requests", "/form-definitions", "/temp-accounts"] {
        let response = server.get(path).await;
        assert_eq!(response.status_code(), 200, "GET {path}");
    }
}

#[tokio::test]
async fn test_unknown_user_id_is_unauthorized() {
    let (server, _state) = create_test_server();

    let response = as_user(server.get("/users"), 999).await;
    assert_eq!(response.status_code(), 401);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["reason"], "Invalid user ID");
}

#[tokio::test]
async fn test_malformed_user_id_is_validation_error() {
    let (server, _state) = create_test_server();

    let response = server
        .get("/users")
        .add_header(
            HeaderName::from_static("user-id"),
            HeaderValue::from_static("not-a-number"),
        )
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_create_user_requires_admin() {
    let (server, state) = create_test_server();
    let manager = seed_manager(&state, "bob@example.com", None);

    let payload = json!({
        "full_name": "Dave Employee",
        "email": "dave@example.com",
        "role": "manager"
    });

    let response = server.post("/users").json(&payload).await;
    assert_eq!(response.status_code(), 403);

    let response = as_user(server.post("/users"), manager).json(&payload).await;
    assert_eq!(response.status_code(), 403);
    let body: Value = response.json();
    assert_eq!(body["reason"], "Administrator access required");
}

/// Creating a user returns the directory remediation command alongside the
/// record.
#[tokio::test]
async fn test_create_user_returns_remediation_command() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);

    let response = as_user(server.post("/users"), admin)
        .json(&json!({
            "full_name": "Dave Employee",
            "email": "dave@example.com",
            "role": "manager",
            "service": "Operations"
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["email"], "dave@example.com");
    assert_eq!(body["role"], "manager");
    assert_eq!(
        body["remediation_command"],
        "New-ADUser -Name \"Dave Employee\" -EmailAddress \"dave@example.com\" -Enabled $true"
    );
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    seed_manager(&state, "bob@example.com", None);

    let response = as_user(server.post("/users"), admin)
        .json(&json!({
            "full_name": "Bob Again",
            "email": "bob@example.com",
            "role": "manager"
        }))
        .await;
    assert_eq!(response.status_code(), 409);
}

/// The dashboard session resolves a login via GET /users/:id.
#[tokio::test]
async fn test_get_user_by_id() {
    let (server, state) = create_test_server();
    let manager = seed_manager(&state, "bob@example.com", Some("Sales"));

    let response = server.get(&format!("/users/{manager}")).await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["id"], manager);
    assert_eq!(body["service"], "Sales");

    let response = server.get("/users/999").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_visible_mailboxes_requires_manager_identity() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);

    let response = server.get("/mailboxes/visible").await;
    assert_eq!(response.status_code(), 403);

    let response = as_user(server.get("/mailboxes/visible"), admin).await;
    assert_eq!(response.status_code(), 403);
}
