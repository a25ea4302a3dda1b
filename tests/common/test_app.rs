//! Test application setup utilities
//!
//! Each [`TestApp`] owns a fresh SQLite file so tests never share audit rows.

use std::time::Duration;

use axum::{body::Body, http::Request, Router};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use harvest_api::{
    config::{AppConfig, AuditConfig, AuthConfig, DatabaseConfig, LoggingConfig, ServerConfig},
    create_router,
    db::{self, AuditRepository},
    middleware::auth::create_access_token,
    models::{AuditEntry, AuditFilter, AuditSort, NewAuditEntry},
    AppState,
};

pub const ADMIN_ID: &str = "admin-1";
pub const ADMIN_EMAIL: &str = "admin@harvest.com";

/// Test application wrapper for integration testing
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Create a new test application backed by a temporary database
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let db = db::init_pool(&config.database)
            .await
            .expect("Failed to initialize test database");

        let state = AppState::new(config, db);
        let router = create_router(state.clone());

        Self { router, state }
    }

    /// Token for a user holding the admin role
    pub fn admin_token(&self) -> String {
        self.token_for(ADMIN_ID, ADMIN_EMAIL, "admin")
    }

    pub fn token_for(&self, user_id: &str, email: &str, role: &str) -> String {
        create_access_token(user_id, email, role, &self.state.config.auth.jwt_secret, 1)
            .expect("Failed to generate test token")
    }

    /// Make a GET request to the test application
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Make an authenticated GET request
    pub async fn get_as_admin(&self, uri: &str) -> TestResponse {
        let token = self.admin_token();
        self.request_with_auth(
            Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap(),
            &token,
        )
        .await
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, uri: &str, body: Value) -> TestResponse {
        self.request(json_request("POST", uri, &body)).await
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post_json_as_admin(&self, uri: &str, body: Value) -> TestResponse {
        let token = self.admin_token();
        self.request_with_auth(json_request("POST", uri, &body), &token)
            .await
    }

    /// Make an authenticated PUT request with JSON body
    pub async fn put_json_as_admin(&self, uri: &str, body: Value) -> TestResponse {
        let token = self.admin_token();
        self.request_with_auth(json_request("PUT", uri, &body), &token)
            .await
    }

    pub async fn patch_json_as_admin(&self, uri: &str, body: Value) -> TestResponse {
        let token = self.admin_token();
        self.request_with_auth(json_request("PATCH", uri, &body), &token)
            .await
    }

    /// Make an authenticated DELETE request
    pub async fn delete_as_admin(&self, uri: &str) -> TestResponse {
        let token = self.admin_token();
        self.request_with_auth(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
            &token,
        )
        .await
    }

    /// Make a request with authentication
    pub async fn request_with_auth(&self, request: Request<Body>, token: &str) -> TestResponse {
        let (mut parts, body) = request.into_parts();
        parts.headers.insert(
            "Authorization",
            format!("Bearer {}", token).parse().unwrap(),
        );
        self.request(Request::from_parts(parts, body)).await
    }

    /// Make an arbitrary request
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Write an audit entry directly, bypassing the HTTP layer
    pub async fn seed_audit(&self, entry: NewAuditEntry, at: DateTime<Utc>) -> AuditEntry {
        AuditRepository::new(&self.state.db)
            .insert_at(&entry, at)
            .await
            .expect("Failed to seed audit entry")
    }

    /// All stored audit entries, newest first
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        AuditRepository::new(&self.state.db)
            .find(&AuditFilter::default(), AuditSort::default(), 0, None)
            .await
            .expect("Failed to read audit log")
    }

    /// Wait until the background audit writes have produced `expected` entries
    pub async fn wait_for_audit_count(&self, expected: usize) -> Vec<AuditEntry> {
        for _ in 0..100 {
            let entries = self.audit_entries().await;
            if entries.len() >= expected {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let entries = self.audit_entries().await;
        panic!(
            "Expected {} audit entries, found {}: {:?}",
            expected,
            entries.len(),
            entries
        );
    }

    /// Give background audit writes a chance to land before asserting absence
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: axum::http::StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: bytes::Bytes,
}

impl TestResponse {
    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse response as JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Assert the response status
    pub fn assert_status(&self, expected: axum::http::StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::OK)
    }

    pub fn assert_created(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::CREATED)
    }

    pub fn assert_bad_request(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::BAD_REQUEST)
    }

    pub fn assert_unauthorized(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::UNAUTHORIZED)
    }

    pub fn assert_forbidden(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::FORBIDDEN)
    }

    pub fn assert_not_found(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::NOT_FOUND)
    }
}

/// Audit entry fixture attributed to the test admin
pub fn audit_entry(action: &str, resource_type: &str, resource_id: &str) -> NewAuditEntry {
    NewAuditEntry {
        action: action.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: Some(resource_id.to_string()),
        user_id: Some(ADMIN_ID.to_string()),
        user_email: Some(ADMIN_EMAIL.to_string()),
        old_data: None,
        new_data: None,
        changes: None,
        ip_address: "127.0.0.1".to_string(),
        user_agent: "integration-test".to_string(),
        metadata: None,
    }
}

/// Create a test configuration with a temporary SQLite database
pub fn test_config() -> AppConfig {
    let db_path = std::env::temp_dir().join(format!(
        "harvest_test_{}.db",
        Uuid::new_v4().simple()
    ));

    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        },
        auth: AuthConfig {
            jwt_secret: "test_secret_key_that_is_at_least_32_bytes_long".to_string(),
            token_expiry_hours: 1,
        },
        database: DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", db_path.display()),
            max_connections: 2,
            min_connections: 1,
            connect_timeout_secs: 30,
        },
        logging: LoggingConfig::default(),
        audit: AuditConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_creation() {
        let app = TestApp::new().await;
        assert!(app.audit_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = TestApp::new().await;
        let response = app.get("/api/health").await;
        response.assert_ok();
    }
}
