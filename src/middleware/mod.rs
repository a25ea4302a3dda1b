//! Middleware components
//!
//! This module contains middleware for:
//! - Identity extraction (JWT)
//! - Automatic audit logging of mutating requests

pub mod audit;
pub mod auth;

pub use audit::{audit_middleware, AuditScope, ManualAuditFlag};
pub use auth::{identity_middleware, AdminUser, AuthUser, Claims};
