//! Failure hook integration tests
//!
//! Storage is broken underneath a running app; the handlers must answer with
//! the error envelope and leave exactly one `_FAILED` entry behind.

use axum::http::StatusCode;
use rstest::rstest;
use serde_json::{json, Value};

use crate::common::{TestApp, TestResponse, ADMIN_ID};

async fn drop_documents(app: &TestApp) {
    sqlx::query("DROP TABLE documents")
        .execute(&app.state.db)
        .await
        .expect("Failed to drop documents table");
}

/// Replace `audit_log` with a view that accepts inserts but fails every read.
///
/// Rows written through the view land in `audit_log_store`.
async fn break_audit_reads(app: &TestApp) {
    let statements = [
        "ALTER TABLE audit_log RENAME TO audit_log_store",
        "CREATE VIEW audit_log AS SELECT * FROM audit_log_store WHERE json_extract('{', '$') IS NULL",
        r#"
        CREATE TRIGGER audit_log_insert INSTEAD OF INSERT ON audit_log
        BEGIN
            INSERT INTO audit_log_store (id, action, resource_type, resource_id, user_id, user_email,
                                         old_data, new_data, changes, ip_address, user_agent, metadata, timestamp)
            VALUES (NEW.id, NEW.action, NEW.resource_type, NEW.resource_id, NEW.user_id, NEW.user_email,
                    NEW.old_data, NEW.new_data, NEW.changes, NEW.ip_address, NEW.user_agent, NEW.metadata,
                    NEW.timestamp);
        END
        "#,
    ];
    for sql in statements {
        sqlx::query(sql)
            .execute(&app.state.db)
            .await
            .expect("Failed to replace audit_log");
    }
}

fn assert_internal_error(response: &TestResponse) {
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = response.json();
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));
}

fn assert_failure_metadata(metadata: &Value, operation: &str) {
    assert_eq!(metadata["operation"], operation);
    assert_eq!(metadata["success"], false);
    assert!(metadata["error"].as_str().is_some_and(|e| !e.is_empty()));
    assert!(metadata["errorStack"].as_str().is_some_and(|e| !e.is_empty()));
}

#[rstest]
#[case("POST", "/api/farmers", "CREATE_FAILED", "create", None)]
#[case("PUT", "/api/farmers/f-1", "UPDATE_FAILED", "update", Some("f-1"))]
#[case("PATCH", "/api/crops/c-1", "UPDATE_FAILED", "update", Some("c-1"))]
#[case("DELETE", "/api/pests/p-1", "DELETE_FAILED", "delete", Some("p-1"))]
#[tokio::test]
async fn test_storage_failure_is_recorded_once(
    #[case] method: &str,
    #[case] uri: &str,
    #[case] action: &str,
    #[case] operation: &str,
    #[case] resource_id: Option<&str>,
) {
    let app = TestApp::new().await;
    drop_documents(&app).await;

    let response = match method {
        "POST" => app.post_json_as_admin(uri, json!({"firstName": "Juan"})).await,
        "PUT" => app.put_json_as_admin(uri, json!({"lastName": "Santos"})).await,
        "PATCH" => app.patch_json_as_admin(uri, json!({"variety": "IR64"})).await,
        _ => app.delete_as_admin(uri).await,
    };
    assert_internal_error(&response);

    // The interceptor must not add a generic entry next to the hook's
    app.settle().await;
    let entries = app.audit_entries().await;
    assert_eq!(entries.len(), 1, "entries: {:?}", entries);

    let entry = &entries[0];
    assert_eq!(entry.action, action);
    assert_eq!(entry.resource_id.as_deref(), resource_id);
    assert_eq!(entry.user_id.as_deref(), Some(ADMIN_ID));
    assert_failure_metadata(entry.metadata.as_ref().unwrap(), operation);
}

#[tokio::test]
async fn test_failed_audit_listing_is_recorded() {
    let app = TestApp::new().await;
    break_audit_reads(&app).await;

    let response = app.get_as_admin("/api/audit").await;
    assert_internal_error(&response);

    let rows: Vec<(String, String, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT action, resource_type, user_id, metadata FROM audit_log_store",
    )
    .fetch_all(&app.state.db)
    .await
    .expect("Failed to read stored entries");
    assert_eq!(rows.len(), 1, "rows: {:?}", rows);

    let (action, resource_type, user_id, metadata) = &rows[0];
    assert_eq!(action, "READ_FAILED");
    assert_eq!(resource_type, "audit_logs");
    assert_eq!(user_id.as_deref(), Some(ADMIN_ID));

    let metadata: Value = serde_json::from_str(metadata.as_deref().unwrap()).unwrap();
    assert_failure_metadata(&metadata, "read");
    assert!(metadata["errorStack"]
        .as_str()
        .unwrap()
        .contains("Failed to count audit logs"));
}
