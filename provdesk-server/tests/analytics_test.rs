//! Dashboard analytics endpoints

mod common;

use common::{as_user, create_form, create_test_server, seed_admin, seed_manager, submit_request};
use serde_json::{json, Value};

#[tokio::test]
async fn test_status_breakdown_counts_by_status() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let form = create_form(&server, admin, "F1").await;

    let first = submit_request(&server, manager, form, json!({})).await;
    submit_request(&server, manager, form, json!({})).await;
    submit_request(&server, manager, form, json!({})).await;

    as_user(server.put(&format!("/requests/{}/status", first["id"])), admin)
        .json(&json!({"status": "completed"}))
        .await
        .assert_status_ok();

    let response = server.get("/analytics/status-breakdown").await;
    assert_eq!(response.status_code(), 200);
    let breakdown: Value = response.json();
    let rows = breakdown.as_array().unwrap();

    let count_for = |status: &str| {
        rows.iter()
            .find(|r| r["status"] == status)
            .map(|r| r["count"].as_i64().unwrap())
    };
    assert_eq!(count_for("pending"), Some(2));
    assert_eq!(count_for("completed"), Some(1));
    assert_eq!(count_for("rejected"), None);
}

#[tokio::test]
async fn test_request_volume_groups_by_day() {
    let (server, state) = create_test_server();
    let admin = seed_admin(&state);
    let manager = seed_manager(&state, "bob@example.com", None);
    let form = create_form(&server, admin, "F1").await;

    submit_request(&server, manager, form, json!({})).await;
    submit_request(&server, manager, form, json!({})).await;

    let response = server.get("/analytics/request-volume").await;
    assert_eq!(response.status_code(), 200);
    let volume: Value = response.json();
    let rows = volume.as_array().unwrap();
    // Both submissions land on today
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["count"], 2);
}

#[tokio::test]
async fn test_empty_analytics() {
    let (server, _state) = create_test_server();

    let response = server.get("/analytics/request-volume").await;
    let volume: Value = response.json();
    assert!(volume.as_array().unwrap().is_empty());

    let response = server.get("/analytics/status-breakdown").await;
    let breakdown: Value = response.json();
    assert!(breakdown.as_array().unwrap().is_empty());
}
