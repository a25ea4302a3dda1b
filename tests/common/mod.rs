//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure including:
//! - Test database setup
//! - API test client
//! - Helpers for waiting on background audit writes

pub mod test_app;

pub use test_app::*;
