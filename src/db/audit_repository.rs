//! Audit log repository
//!
//! The audit log is append-only: entries are inserted once and never updated
//! or deleted.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::models::{AuditChange, AuditEntry, AuditFilter, AuditSort, NewAuditEntry};

const COLUMNS: &str = "id, action, resource_type, resource_id, user_id, user_email, \
     old_data, new_data, changes, ip_address, user_agent, metadata, timestamp";

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    action: String,
    resource_type: String,
    resource_id: Option<String>,
    user_id: Option<String>,
    user_email: Option<String>,
    old_data: Option<String>,
    new_data: Option<String>,
    changes: Option<String>,
    ip_address: String,
    user_agent: String,
    metadata: Option<String>,
    timestamp: String,
}

pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an entry stamped with the current time
    pub async fn insert(&self, entry: &NewAuditEntry) -> Result<AuditEntry> {
        self.insert_at(entry, Utc::now()).await
    }

    /// Append an entry with an explicit timestamp
    pub async fn insert_at(
        &self,
        entry: &NewAuditEntry,
        timestamp: DateTime<Utc>,
    ) -> Result<AuditEntry> {
        let id = Uuid::new_v4();
        let changes = entry
            .changes
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize audit changes")?;

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, action, resource_type, resource_id, user_id, user_email,
                                   old_data, new_data, changes, ip_address, user_agent, metadata, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(entry.resource_id.as_deref())
        .bind(entry.user_id.as_deref())
        .bind(entry.user_email.as_deref())
        .bind(entry.old_data.as_ref().map(|v| v.to_string()))
        .bind(entry.new_data.as_ref().map(|v| v.to_string()))
        .bind(changes)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.metadata.as_ref().map(|v| v.to_string()))
        .bind(format_db_timestamp(timestamp))
        .execute(self.pool)
        .await
        .context("Failed to insert audit log entry")?;

        Ok(AuditEntry {
            id,
            action: entry.action.clone(),
            resource_type: entry.resource_type.clone(),
            resource_id: entry.resource_id.clone(),
            user_id: entry.user_id.clone(),
            user_email: entry.user_email.clone(),
            old_data: entry.old_data.clone(),
            new_data: entry.new_data.clone(),
            changes: entry.changes.clone(),
            ip_address: entry.ip_address.clone(),
            user_agent: entry.user_agent.clone(),
            metadata: entry.metadata.clone(),
            timestamp: Some(timestamp),
        })
    }

    /// Filtered, sorted window of entries; `limit = None` returns everything after `skip`
    pub async fn find(
        &self,
        filter: &AuditFilter,
        sort: AuditSort,
        skip: i64,
        limit: Option<i64>,
    ) -> Result<Vec<AuditEntry>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM audit_log", COLUMNS));
        push_filter(&mut qb, filter);

        let direction = sort.order.keyword();
        qb.push(format!(
            " ORDER BY {} {}, rowid {}",
            sort.field.column(),
            direction,
            direction
        ));
        qb.push(" LIMIT ").push_bind(limit.unwrap_or(-1));
        qb.push(" OFFSET ").push_bind(skip.max(0));

        let rows = qb
            .build_query_as::<AuditRow>()
            .fetch_all(self.pool)
            .await
            .context("Failed to list audit logs")?;

        Ok(rows.into_iter().map(row_to_entry).collect())
    }

    pub async fn count(&self, filter: &AuditFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM audit_log");
        push_filter(&mut qb, filter);

        qb.build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await
            .context("Failed to count audit logs")
    }

    /// Number of matching entries per action, ordered by action name
    pub async fn count_by_action(&self, filter: &AuditFilter) -> Result<Vec<(String, i64)>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT action, COUNT(*) FROM audit_log");
        push_filter(&mut qb, filter);
        qb.push(" GROUP BY action ORDER BY action");

        qb.build_query_as::<(String, i64)>()
            .fetch_all(self.pool)
            .await
            .context("Failed to aggregate audit logs by action")
    }

    pub async fn distinct_actions(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT action FROM audit_log ORDER BY action")
            .fetch_all(self.pool)
            .await
            .context("Failed to list audit actions")
    }

    pub async fn distinct_resource_types(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT resource_type FROM audit_log ORDER BY resource_type")
            .fetch_all(self.pool)
            .await
            .context("Failed to list audit resource types")
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AuditFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(ref actions) = filter.actions {
        if actions.is_empty() {
            qb.push(" AND 0 = 1");
        } else {
            qb.push(" AND action IN (");
            let mut values = qb.separated(", ");
            for action in actions {
                values.push_bind(action.clone());
            }
            values.push_unseparated(")");
        }
    }
    if let Some(ref resource_type) = filter.resource_type {
        qb.push(" AND resource_type = ").push_bind(resource_type.clone());
    }
    if let Some(ref resource_id) = filter.resource_id {
        qb.push(" AND resource_id = ").push_bind(resource_id.clone());
    }
    if let Some(ref user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(ref ip_address) = filter.ip_address {
        qb.push(" AND ip_address = ").push_bind(ip_address.clone());
    }
    if let Some((start, end)) = filter.range {
        qb.push(" AND timestamp >= ")
            .push_bind(format_db_timestamp(start))
            .push(" AND timestamp <= ")
            .push_bind(format_db_timestamp(end));
    }
}

/// Fixed-width UTC form so lexical order matches chronological order
fn format_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_db_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
}

fn row_to_entry(row: AuditRow) -> AuditEntry {
    AuditEntry {
        id: Uuid::parse_str(&row.id).unwrap_or_else(|_| Uuid::nil()),
        action: row.action,
        resource_type: row.resource_type,
        resource_id: row.resource_id,
        user_id: row.user_id,
        user_email: row.user_email,
        old_data: row.old_data.and_then(|s| serde_json::from_str(&s).ok()),
        new_data: row.new_data.and_then(|s| serde_json::from_str(&s).ok()),
        changes: row
            .changes
            .and_then(|s| serde_json::from_str::<Vec<AuditChange>>(&s).ok()),
        ip_address: row.ip_address,
        user_agent: row.user_agent,
        metadata: row.metadata.and_then(|s| serde_json::from_str(&s).ok()),
        timestamp: parse_db_timestamp(&row.timestamp),
    }
}
