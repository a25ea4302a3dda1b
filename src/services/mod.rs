//! Business logic services

pub mod audit;
pub mod audit_query;
pub mod change_detector;
pub mod enrichment;

pub use audit::{AuditContext, AuditEvent, AuditService};
pub use audit_query::AuditQueryService;
pub use change_detector::detect_changes;
pub use enrichment::{DocumentLookup, ResolvedResource, ResourceLookup, ResourceRegistry};
