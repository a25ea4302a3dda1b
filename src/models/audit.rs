//! Audit log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const ACTION_CREATE: &str = "CREATE";
pub const ACTION_UPDATE: &str = "UPDATE";
pub const ACTION_DELETE: &str = "DELETE";
pub const ACTION_READ: &str = "READ";

/// Suffix appended to an action name when the operation failed
pub const FAILED_SUFFIX: &str = "_FAILED";

/// Actions shown by default and counted by the statistics
pub const MUTATING_ACTIONS: [&str; 3] = [ACTION_CREATE, ACTION_UPDATE, ACTION_DELETE];

/// Fallback for unknown IP address or user agent
pub const UNKNOWN: &str = "unknown";

/// One field-level difference between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditChange {
    pub field: String,
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
}

impl AuditChange {
    /// True when neither side carries a value
    pub fn is_empty(&self) -> bool {
        let absent = |v: &Option<Value>| matches!(v, None | Some(Value::Null));
        absent(&self.old_value) && absent(&self.new_value)
    }
}

/// Persisted audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<AuditChange>>,
    pub ip_address: String,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// `None` only for legacy rows whose timestamp could not be parsed
    pub timestamp: Option<DateTime<Utc>>,
}

/// Entry ready to be written; id and timestamp are assigned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    pub changes: Option<Vec<AuditChange>>,
    pub ip_address: String,
    pub user_agent: String,
    pub metadata: Option<Value>,
}

/// Farmer projection attached to enriched entries
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerDetails {
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsbsa_number: Option<String>,
}

/// Audit entry with human-readable context for display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedAuditEntry {
    #[serde(flatten)]
    pub entry: AuditEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farmer_details: Option<FarmerDetails>,
}

/// Store-level filter; every set field narrows the result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub actions: Option<Vec<String>>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    /// Inclusive timestamp range
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl AuditFilter {
    pub fn mutating_only() -> Self {
        Self {
            actions: Some(MUTATING_ACTIONS.iter().map(|a| a.to_string()).collect()),
            ..Default::default()
        }
    }
}

/// Sortable columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Timestamp,
    Action,
    ResourceType,
    ResourceId,
    UserId,
    UserEmail,
}

impl SortField {
    /// Parses a client-supplied field name; unknown names sort by timestamp.
    pub fn parse(name: &str) -> Self {
        match name {
            "action" => Self::Action,
            "resourceType" | "resource_type" => Self::ResourceType,
            "resourceId" | "resource_id" => Self::ResourceId,
            "userId" | "user_id" => Self::UserId,
            "userEmail" | "user_email" => Self::UserEmail,
            _ => Self::Timestamp,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Action => "action",
            Self::ResourceType => "resource_type",
            Self::ResourceId => "resource_id",
            Self::UserId => "user_id",
            Self::UserEmail => "user_email",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// "desc" sorts descending, anything else ascending.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditSort {
    pub field: SortField,
    pub order: SortOrder,
}

/// 1-indexed page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

/// Pagination block of a paged response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_count: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
    pub limit: u32,
}

impl PageInfo {
    pub fn new(request: PageRequest, total_count: i64) -> Self {
        let limit = request.limit.max(1) as i64;
        let total_pages = ((total_count.max(0) + limit - 1) / limit) as u32;
        Self {
            current_page: request.page,
            total_pages,
            total_count,
            has_next_page: request.page < total_pages,
            has_prev_page: request.page > 1,
            limit: request.limit,
        }
    }
}

/// A page of items plus its pagination block
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
}

/// Per-action counters of the statistics view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ActionStats {
    pub create: i64,
    pub update: i64,
    pub delete: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStatistics {
    pub total_logs: i64,
    pub today_logs: i64,
    pub week_logs: i64,
    pub action_stats: ActionStats,
}

/// Distinct values present in the log, for building filter UIs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilterValues {
    pub actions: Vec<String>,
    pub resource_types: Vec<String>,
}

/// Query parameters accepted by the audit API.
///
/// `page` and `limit` are kept as text so malformed numbers fall back to
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub format: Option<String>,
}

impl AuditLogQuery {
    /// Page request with `page` floored at 1 and `limit` clamped to `1..=max_limit`
    pub fn page_request(&self, default_limit: u32, max_limit: u32) -> PageRequest {
        let number = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<i64>().ok());

        let page = number(&self.page).unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
        let limit = number(&self.limit)
            .unwrap_or(default_limit as i64)
            .clamp(1, max_limit.max(1) as i64) as u32;
        PageRequest::new(page, limit)
    }
}
