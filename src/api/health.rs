//! Health check endpoint

use axum::{extract::State, http::StatusCode};
use serde::Serialize;

use crate::{utils::ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

/// Reports service and database health; 503 when the database is unreachable
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, ApiResponse<HealthStatus>) {
    let database_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();

    let (status, health) = if database_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let mut body = ApiResponse::ok(
        "Service health retrieved",
        HealthStatus {
            status: health,
            version: env!("CARGO_PKG_VERSION"),
            database: if database_ok { "connected" } else { "unreachable" },
        },
    );
    body.success = database_ok;

    (status, body)
}
