//! Data models

mod audit;
mod document;

pub use audit::*;
pub use document::*;
