//! API routes and handlers
//!
//! This module defines all API endpoints and their routing.

use axum::{routing::get, Router};

use crate::{models::RecordKind, AppState};

mod audit_logs;
mod health;
mod records;

pub use health::*;

/// Routes mounted under `/api`
pub fn api_routes() -> Router<AppState> {
    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .nest("/audit", audit_logs::routes());

    for kind in RecordKind::ALL {
        router = router.nest(&format!("/{}", kind.collection()), records::routes(kind));
    }

    router
}
