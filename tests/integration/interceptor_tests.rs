//! Request interceptor and manual hook integration tests

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    body::{Body, Bytes},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};

use crate::common::{TestApp, ADMIN_EMAIL, ADMIN_ID};

async fn create_farmer(app: &TestApp) -> String {
    let response = app
        .post_json_as_admin(
            "/api/farmers",
            json!({"firstName": "Juan", "lastName": "Dela Cruz", "rsbsaNumber": "RS-001"}),
        )
        .await;
    response.assert_created();

    let json: Value = response.json();
    json["data"]["_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_create_is_recorded_by_interceptor() {
    let app = TestApp::new().await;
    let id = create_farmer(&app).await;

    let entries = app.wait_for_audit_count(1).await;
    let entry = &entries[0];
    assert_eq!(entry.action, "CREATE");
    assert_eq!(entry.resource_type, "farmer");
    assert_eq!(entry.resource_id.as_deref(), Some(id.as_str()));
    assert_eq!(entry.user_id.as_deref(), Some(ADMIN_ID));
    assert_eq!(entry.user_email.as_deref(), Some(ADMIN_EMAIL));
    assert_eq!(entry.new_data.as_ref().unwrap()["firstName"], "Juan");

    let metadata = entry.metadata.as_ref().unwrap();
    assert_eq!(metadata["httpMethod"], "POST");
    assert_eq!(metadata["url"], "/api/farmers");
    assert_eq!(metadata["statusCode"], 201);
    assert!(metadata["responseTime"].is_u64());
}

#[tokio::test]
async fn test_sensitive_request_fields_are_redacted() {
    let app = TestApp::new().await;
    app.post_json_as_admin(
        "/api/crops",
        json!({"cropName": "Rice", "apiKey": "abc123"}),
    )
    .await
    .assert_created();

    let entries = app.wait_for_audit_count(1).await;
    let new_data = entries[0].new_data.as_ref().unwrap();
    assert_eq!(new_data["cropName"], "Rice");
    assert_eq!(new_data["apiKey"], "[REDACTED]");
}

#[tokio::test]
async fn test_update_is_recorded_once_with_changes() {
    let app = TestApp::new().await;
    let id = create_farmer(&app).await;
    app.wait_for_audit_count(1).await;

    app.put_json_as_admin(&format!("/api/farmers/{}", id), json!({"lastName": "Santos"}))
        .await
        .assert_ok();

    app.settle().await;
    let entries = app.audit_entries().await;
    assert_eq!(entries.len(), 2);

    let update = entries.iter().find(|e| e.action == "UPDATE").unwrap();
    assert_eq!(update.resource_id.as_deref(), Some(id.as_str()));
    assert_eq!(update.old_data.as_ref().unwrap()["lastName"], "Dela Cruz");
    assert_eq!(update.new_data.as_ref().unwrap()["lastName"], "Santos");
    assert_eq!(update.metadata.as_ref().unwrap()["operation"], "update");

    let changes = update.changes.as_ref().unwrap();
    let last_name = changes.iter().find(|c| c.field == "lastName").unwrap();
    assert_eq!(last_name.old_value, Some(json!("Dela Cruz")));
    assert_eq!(last_name.new_value, Some(json!("Santos")));
    assert!(changes.iter().all(|c| c.field != "firstName"));
}

#[tokio::test]
async fn test_delete_keeps_snapshot_for_history() {
    let app = TestApp::new().await;
    let id = create_farmer(&app).await;
    app.wait_for_audit_count(1).await;

    app.delete_as_admin(&format!("/api/farmers/{}", id))
        .await
        .assert_ok();

    app.settle().await;
    let entries = app.audit_entries().await;
    assert_eq!(entries.len(), 2);
    let delete = entries.iter().find(|e| e.action == "DELETE").unwrap();
    assert_eq!(delete.old_data.as_ref().unwrap()["firstName"], "Juan");
    assert!(delete.new_data.is_none());

    // The record is gone, so its name comes from the deletion snapshot
    let json: Value = app
        .get_as_admin(&format!("/api/audit/resource/farmer/{}", id))
        .await
        .json();
    let history = json["data"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["action"], "DELETE");
    assert_eq!(history[0]["resourceName"], "Juan Dela Cruz");
}

#[tokio::test]
async fn test_listing_enriches_live_records() {
    let app = TestApp::new().await;
    create_farmer(&app).await;
    app.wait_for_audit_count(1).await;

    let json: Value = app.get_as_admin("/api/audit").await.json();
    let entry = &json["data"][0];
    assert_eq!(entry["resourceName"], "Juan Dela Cruz");
    assert_eq!(entry["farmerDetails"]["fullName"], "Juan Dela Cruz");
    assert_eq!(entry["farmerDetails"]["rsbsaNumber"], "RS-001");
}

#[tokio::test]
async fn test_reads_are_not_recorded() {
    let app = TestApp::new().await;

    app.get("/api/farmers").await.assert_ok();
    app.get_as_admin("/api/audit").await.assert_ok();

    app.settle().await;
    assert!(app.audit_entries().await.is_empty());
}

#[tokio::test]
async fn test_failed_requests_are_not_recorded() {
    let app = TestApp::new().await;

    app.put_json_as_admin("/api/farmers/missing", json!({"lastName": "X"}))
        .await
        .assert_not_found();
    app.delete_as_admin("/api/pests/missing")
        .await
        .assert_not_found();
    app.post_json_as_admin("/api/barangays", json!(["not", "an", "object"]))
        .await
        .assert_bad_request();

    app.settle().await;
    assert!(app.audit_entries().await.is_empty());
}

#[tokio::test]
async fn test_anonymous_create_is_recorded_without_actor() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/api/reports")
                .header("Content-Type", "application/json")
                .header("X-Forwarded-For", "203.0.113.7, 10.0.0.2")
                .header("User-Agent", "field-tablet/2.1")
                .body(Body::from(json!({"description": "Typhoon damage"}).to_string()))
                .unwrap(),
        )
        .await;
    response.assert_created();

    let entries = app.wait_for_audit_count(1).await;
    let entry = &entries[0];
    assert_eq!(entry.resource_type, "report");
    assert!(entry.user_id.is_none());
    assert_eq!(entry.ip_address, "203.0.113.7");
    assert_eq!(entry.user_agent, "field-tablet/2.1");
}

#[tokio::test]
async fn test_invalid_token_is_treated_as_anonymous() {
    let app = TestApp::new().await;

    let response = app
        .request_with_auth(
            Request::builder()
                .method("POST")
                .uri("/api/pests")
                .header("Content-Type", "application/json")
                .body(Body::from(json!({"pestName": "Armyworm"}).to_string()))
                .unwrap(),
            "not-a-jwt",
        )
        .await;
    response.assert_created();

    let entries = app.wait_for_audit_count(1).await;
    assert!(entries[0].user_id.is_none());
    assert_eq!(entries[0].ip_address, "unknown");
}

#[tokio::test]
async fn test_oversized_streamed_body_is_rejected_early() {
    const MIB: usize = 1024 * 1024;
    let app = TestApp::new().await;
    let limit = app.state.config.audit.max_body_bytes;

    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();
    let chunks = futures::stream::iter((0..32).map(move |_| {
        counter.fetch_add(MIB, Ordering::SeqCst);
        Ok::<_, std::io::Error>(Bytes::from(vec![b' '; MIB]))
    }));

    let response = app
        .request_with_auth(
            Request::builder()
                .method("POST")
                .uri("/api/farmers")
                .header("Content-Type", "application/json")
                .body(Body::from_stream(chunks))
                .unwrap(),
            &app.admin_token(),
        )
        .await;
    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);

    let json: Value = response.json();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "payload_too_large");

    // Reading stops one chunk past the limit
    assert!(pulled.load(Ordering::SeqCst) <= limit + MIB);

    app.settle().await;
    assert!(app.audit_entries().await.is_empty());
}
