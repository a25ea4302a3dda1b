//! Shared utilities

pub mod error;
pub mod sanitize;

pub use error::{ApiResponse, AppError, AppResult};
pub use sanitize::{is_sensitive_field, sanitize, REDACTED};
