//! Audit recorder
//!
//! Builds canonical audit entries and writes them to the audit log. Recording
//! never fails from the caller's point of view: invalid events are skipped
//! with a warning and storage errors are logged and dropped.

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::db::{AuditRepository, DbPool};
use crate::models::{
    AuditEntry, NewAuditEntry, ACTION_CREATE, ACTION_DELETE, ACTION_READ, ACTION_UPDATE,
    FAILED_SUFFIX, UNKNOWN,
};
use crate::services::change_detector::detect_changes;
use crate::utils::sanitize;

/// Placeholder identity used by background jobs
pub const SYSTEM_USER_ID: &str = "system";
pub const SYSTEM_USER_EMAIL: &str = "system@harvest.com";

/// Who performed an action and where the request came from
#[derive(Debug, Clone, PartialEq)]
pub struct AuditContext {
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
}

impl Default for AuditContext {
    fn default() -> Self {
        Self {
            user_id: None,
            user_email: None,
            ip_address: UNKNOWN.to_string(),
            user_agent: UNKNOWN.to_string(),
        }
    }
}

impl AuditContext {
    /// Context for work not triggered by a user
    pub fn system() -> Self {
        Self {
            user_id: Some(SYSTEM_USER_ID.to_string()),
            user_email: Some(SYSTEM_USER_EMAIL.to_string()),
            ..Default::default()
        }
    }

    /// True when a real user, not the system placeholder, is known
    pub fn has_actor(&self) -> bool {
        let real = |v: &Option<String>, placeholder: &str| {
            v.as_deref()
                .is_some_and(|s| !s.is_empty() && s != placeholder)
        };
        real(&self.user_id, SYSTEM_USER_ID) || real(&self.user_email, SYSTEM_USER_EMAIL)
    }
}

/// An observed action, before normalization and sanitization
#[derive(Debug, Clone, Default)]
pub struct AuditEvent {
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    pub context: AuditContext,
    pub metadata: Option<Value>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn resource_id(mut self, id: Option<impl Into<String>>) -> Self {
        self.resource_id = id.map(Into::into);
        self
    }

    pub fn old_data(mut self, data: Value) -> Self {
        self.old_data = Some(data);
        self
    }

    pub fn new_data(mut self, data: Value) -> Self {
        self.new_data = Some(data);
        self
    }

    pub fn context(mut self, context: AuditContext) -> Self {
        self.context = context;
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Turn an event into a storable entry, or `None` if it lacks an action or resource type.
pub fn build_entry(event: AuditEvent) -> Option<NewAuditEntry> {
    let action = event.action.trim();
    let resource_type = event.resource_type.trim();

    if action.is_empty() || resource_type.is_empty() {
        warn!(
            action = %event.action,
            resource_type = %event.resource_type,
            "Audit event missing required fields, skipping"
        );
        return None;
    }

    if !event.context.has_actor() {
        warn!(
            action = %action,
            resource_type = %resource_type,
            resource_id = ?event.resource_id,
            "Audit entry created without user context"
        );
    }

    let changes = detect_changes(event.old_data.as_ref(), event.new_data.as_ref());
    let or_unknown = |s: String| if s.is_empty() { UNKNOWN.to_string() } else { s };

    Some(NewAuditEntry {
        action: action.to_uppercase(),
        resource_type: resource_type.to_lowercase(),
        resource_id: event.resource_id.filter(|id| !id.is_empty()),
        user_id: event.context.user_id,
        user_email: event.context.user_email,
        old_data: event.old_data.as_ref().map(sanitize),
        new_data: event.new_data.as_ref().map(sanitize),
        changes,
        ip_address: or_unknown(event.context.ip_address),
        user_agent: or_unknown(event.context.user_agent),
        metadata: event.metadata,
    })
}

fn hook_metadata(operation: &str) -> Value {
    json!({ "operation": operation, "success": true })
}

/// Writes audit entries to the audit log
#[derive(Clone)]
pub struct AuditService {
    pool: DbPool,
}

impl AuditService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record an event. Returns the stored entry, or `None` if it was skipped or could not be written.
    pub async fn record(&self, event: AuditEvent) -> Option<AuditEntry> {
        let entry = build_entry(event)?;

        match AuditRepository::new(&self.pool).insert(&entry).await {
            Ok(saved) => {
                debug!(
                    action = %saved.action,
                    resource_type = %saved.resource_type,
                    resource_id = ?saved.resource_id,
                    "Audit logged"
                );
                Some(saved)
            }
            Err(e) => {
                error!(
                    error = %format!("{:#}", e),
                    action = %entry.action,
                    resource_type = %entry.resource_type,
                    resource_id = ?entry.resource_id,
                    "Failed to record audit entry"
                );
                None
            }
        }
    }

    /// Record in the background; the caller does not wait for the write.
    pub fn spawn_record(&self, event: AuditEvent) {
        let service = self.clone();
        tokio::spawn(async move {
            service.record(event).await;
        });
    }

    pub async fn log_create(
        &self,
        resource_type: &str,
        resource_id: &str,
        new_data: Value,
        context: &AuditContext,
    ) -> Option<AuditEntry> {
        self.record(
            AuditEvent::new(ACTION_CREATE, resource_type)
                .resource_id(Some(resource_id))
                .new_data(new_data)
                .context(context.clone())
                .metadata(hook_metadata("create")),
        )
        .await
    }

    pub async fn log_update(
        &self,
        resource_type: &str,
        resource_id: &str,
        old_data: Value,
        new_data: Value,
        context: &AuditContext,
    ) -> Option<AuditEntry> {
        self.record(
            AuditEvent::new(ACTION_UPDATE, resource_type)
                .resource_id(Some(resource_id))
                .old_data(old_data)
                .new_data(new_data)
                .context(context.clone())
                .metadata(hook_metadata("update")),
        )
        .await
    }

    pub async fn log_delete(
        &self,
        resource_type: &str,
        resource_id: &str,
        old_data: Value,
        context: &AuditContext,
    ) -> Option<AuditEntry> {
        self.record(
            AuditEvent::new(ACTION_DELETE, resource_type)
                .resource_id(Some(resource_id))
                .old_data(old_data)
                .context(context.clone())
                .metadata(hook_metadata("delete")),
        )
        .await
    }

    pub async fn log_read(
        &self,
        resource_type: &str,
        resource_id: Option<&str>,
        context: &AuditContext,
    ) -> Option<AuditEntry> {
        self.record(
            AuditEvent::new(ACTION_READ, resource_type)
                .resource_id(resource_id)
                .context(context.clone())
                .metadata(hook_metadata("read")),
        )
        .await
    }

    /// Record `<ACTION>_FAILED` with the error message and its cause chain in metadata.
///
/// The chain is rendered without any captured backtrace.
    pub async fn log_failure(
        &self,
        action: &str,
        resource_type: &str,
        resource_id: Option<&str>,
        err: &anyhow::Error,
        context: &AuditContext,
    ) -> Option<AuditEntry> {
        let base = action.trim().to_uppercase();
        if base.is_empty() {
            warn!(resource_type = %resource_type, "Failure audit without an action, skipping");
            return None;
        }

        self.record(
            AuditEvent::new(format!("{}{}", base, FAILED_SUFFIX), resource_type)
                .resource_id(resource_id)
                .context(context.clone())
                .metadata(json!({
                    "operation": base.to_lowercase(),
                    "success": false,
                    "error": err.to_string(),
                    "errorStack": format!("{:#}", err),
                })),
        )
        .await
    }
}
