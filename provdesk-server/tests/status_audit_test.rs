//! Status transitions, their audit trail, and status_update broadcasts

mod common;

use common::{as_user, create_form, create_test_server, seed_admin, seed_manager, submit_request};
use serde_json::{json, Value};

/// Completing a pending request writes exactly one audit entry with the
/// matching from/to pair and broadcasts {id, status}.
#[tokio::test]
async fn test_transition_audits_and_broadcasts() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let form = create_form(&server, admin, "F1").await;
    let request = submit_request(&server, manager, form, json!({"x": 1})).await;

    let (_id, mut events) = state.events.register();

    let response = as_user(server.put(&format!("/requests/{}/status", request["id"])), admin)
        .json(&json!({"status": "completed"}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["processed_by_admin_id"], admin);

    let response = as_user(server.get("/audit-logs"), admin).await;
    let entries: Value = response.json();
    let status_entries: Vec<_> = entries
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["event_type"] == "request_status_changed")
        .collect();
    assert_eq!(status_entries.len(), 1);
    assert_eq!(status_entries[0]["details"]["from_status"], "pending");
    assert_eq!(status_entries[0]["details"]["to_status"], "completed");
    assert_eq!(status_entries[0]["details"]["request_id"], request["id"]);

    let event: Value = serde_json::from_str(&events.try_recv().unwrap()).unwrap();
    assert_eq!(
        event,
        json!({"event": "status_update", "id": request["id"], "status": "completed"})
    );
}

#[tokio::test]
async fn test_full_lifecycle_produces_one_audit_entry_per_transition() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let form = create_form(&server, admin, "F1").await;
    let request = submit_request(&server, manager, form, json!({})).await;

    for status in ["in_progress", "completed"] {
        as_user(server.put(&format!("/requests/{}/status", request["id"])), admin)
            .json(&json!({"status": status}))
            .await
            .assert_status_ok();
    }

    let response = as_user(server.get("/audit-logs"), admin).await;
    let entries: Value = response.json();
    let transitions: Vec<_> = entries
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["event_type"] == "request_status_changed")
        .collect();
    assert_eq!(transitions.len(), 2);
    // Newest first
    assert_eq!(transitions[0]["details"]["from_status"], "in_progress");
    assert_eq!(transitions[0]["details"]["to_status"], "completed");
    assert_eq!(transitions[1]["details"]["from_status"], "pending");
    assert_eq!(transitions[1]["details"]["to_status"], "in_progress");
}

/// Terminal states admit no further transitions; nothing is audited or
/// broadcast for a rejected attempt.
#[tokio::test]
async fn test_illegal_transition_conflicts() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let form = create_form(&server, admin, "F1").await;
    let request = submit_request(&server, manager, form, json!({})).await;

    as_user(server.put(&format!("/requests/{}/status", request["id"])), admin)
        .json(&json!({"status": "rejected"}))
        .await
        .assert_status_ok();

    let (_id, mut events) = state.events.register();

    let response = as_user(server.put(&format!("/requests/{}/status", request["id"])), admin)
        .json(&json!({"status": "pending"}))
        .await;
    assert_eq!(response.status_code(), 409);

    // Status unchanged, no broadcast fired
    let response = server.get(&format!("/requests/{}", request["id"])).await;
    let body: Value = response.json();
    assert_eq!(body["status"], "rejected");
    assert!(events.try_recv().is_err());

    let response = as_user(server.get("/audit-logs"), admin).await;
    let entries: Value = response.json();
    let transitions = entries
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["event_type"] == "request_status_changed")
        .count();
    assert_eq!(transitions, 1);
}

#[tokio::test]
async fn test_status_update_requires_admin() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let form = create_form(&server, admin, "F1").await;
    let request = submit_request(&server, manager, form, json!({})).await;

    let response = as_user(server.put(&format!("/requests/{}/status", request["id"])), manager)
        .json(&json!({"status": "completed"}))
        .await;
    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn test_audit_log_requires_admin() {
    let (server, state) = create_test_server();
    let manager = seed_manager(&state, "bob@example.com", None);

    let response = server.get("/audit-logs").await;
    assert_eq!(response.status_code(), 403);

    let response = as_user(server.get("/audit-logs"), manager).await;
    assert_eq!(response.status_code(), 403);
}
