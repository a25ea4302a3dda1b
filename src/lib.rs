//! Harvest API library
//!
//! REST backend for agricultural records (farmers, crops, barangays, pests
//! and reports) with an audit trail of every change made through the API.

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{middleware::from_fn_with_state, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{audit_middleware, identity_middleware, AdminUser, AuthUser, Claims};
use services::{AuditQueryService, AuditService, ResourceRegistry};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    /// Audit log writer
    pub audit: AuditService,
    /// Resource lookups used to name audited records
    pub resources: ResourceRegistry,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        Self {
            audit: AuditService::new(db.clone()),
            resources: ResourceRegistry::with_documents(db.clone()),
            config,
            db,
        }
    }

    pub fn audit_queries(&self) -> AuditQueryService {
        AuditQueryService::new(
            self.db.clone(),
            self.resources.clone(),
            self.config.audit.export_limit,
        )
    }
}

/// Build the application router.
///
/// Identity extraction runs before the audit interceptor so recorded entries
/// carry the caller.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api::api_routes())
        .layer(from_fn_with_state(state.clone(), audit_middleware))
        .layer(from_fn_with_state(state.clone(), identity_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}
