//! Read side of the audit log: listing, statistics, filter values and export

use anyhow::Result;
use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::db::{AuditRepository, DbPool};
use crate::models::{
    ActionStats, AuditEntry, AuditFilter, AuditFilterValues, AuditSort, AuditStatistics,
    EnrichedAuditEntry, Page, PageInfo, PageRequest, RecordKind, ACTION_CREATE, ACTION_DELETE,
    ACTION_UPDATE,
};
use crate::services::enrichment::{enrich_entries, ResourceRegistry};

/// Header row of the CSV export
pub const CSV_HEADER: &str =
    "Timestamp,Action,Resource Type,Resource ID,User ID,User Email,IP Address,Changes";

/// Body of a CSV export with no rows
pub const CSV_EMPTY: &str = "No data available";

#[derive(Clone)]
pub struct AuditQueryService {
    pool: DbPool,
    resources: ResourceRegistry,
    export_limit: u32,
}

impl AuditQueryService {
    pub fn new(pool: DbPool, resources: ResourceRegistry, export_limit: u32) -> Self {
        Self {
            pool,
            resources,
            export_limit,
        }
    }

    /// Enriched page of entries. Without an explicit action filter only
    /// CREATE, UPDATE and DELETE entries are listed.
    pub async fn list(
        &self,
        filter: &AuditFilter,
        sort: AuditSort,
        page: PageRequest,
    ) -> Result<Page<EnrichedAuditEntry>> {
        let mut filter = filter.clone();
        if filter.actions.is_none() {
            filter.actions = AuditFilter::mutating_only().actions;
        }
        self.enriched_page(&filter, sort, page).await
    }

    /// Full history of one record, newest first
    pub async fn for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Vec<EnrichedAuditEntry>> {
        let filter = AuditFilter {
            resource_type: Some(canonical_resource_type(resource_type)),
            resource_id: Some(resource_id.to_string()),
            ..Default::default()
        };
        let entries = AuditRepository::new(&self.pool)
            .find(&filter, AuditSort::default(), 0, None)
            .await?;
        Ok(enrich_entries(&self.resources, entries).await)
    }

    pub async fn for_user(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> Result<Page<EnrichedAuditEntry>> {
        let filter = AuditFilter {
            user_id: Some(user_id.to_string()),
            ..Default::default()
        };
        self.enriched_page(&filter, AuditSort::default(), page).await
    }

    pub async fn in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<EnrichedAuditEntry>> {
        let filter = AuditFilter {
            range: Some((start, end)),
            ..Default::default()
        };
        self.enriched_page(&filter, AuditSort::default(), page).await
    }

    /// Totals as of `now`; "today" starts at UTC midnight, "week" is the trailing 7 days.
    pub async fn statistics(&self, now: DateTime<Utc>) -> Result<AuditStatistics> {
        let repo = AuditRepository::new(&self.pool);
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);

        let since = |start: DateTime<Utc>| AuditFilter {
            range: Some((start, now)),
            ..AuditFilter::mutating_only()
        };

        let total_logs = repo.count(&AuditFilter::default()).await?;
        let today_logs = repo.count(&since(start_of_day)).await?;
        let week_logs = repo.count(&since(now - Duration::days(7))).await?;

        let mut action_stats = ActionStats::default();
        for (action, count) in repo.count_by_action(&AuditFilter::mutating_only()).await? {
            match action.as_str() {
                ACTION_CREATE => action_stats.create = count,
                ACTION_UPDATE => action_stats.update = count,
                ACTION_DELETE => action_stats.delete = count,
                _ => {}
            }
        }

        Ok(AuditStatistics {
            total_logs,
            today_logs,
            week_logs,
            action_stats,
        })
    }

    pub async fn filter_values(&self) -> Result<AuditFilterValues> {
        let repo = AuditRepository::new(&self.pool);
        Ok(AuditFilterValues {
            actions: repo.distinct_actions().await?,
            resource_types: repo.distinct_resource_types().await?,
        })
    }

    /// Raw entries for export, newest first, capped at the export limit
    pub async fn export(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        AuditRepository::new(&self.pool)
            .find(
                filter,
                AuditSort::default(),
                0,
                Some(self.export_limit as i64),
            )
            .await
    }

    async fn enriched_page(
        &self,
        filter: &AuditFilter,
        sort: AuditSort,
        page: PageRequest,
    ) -> Result<Page<EnrichedAuditEntry>> {
        let repo = AuditRepository::new(&self.pool);
        let total = repo.count(filter).await?;
        let entries = repo
            .find(filter, sort, page.offset(), Some(page.limit as i64))
            .await?;

        Ok(Page {
            items: enrich_entries(&self.resources, entries).await,
            page_info: PageInfo::new(page, total),
        })
    }
}

/// Stored resource type for a user-supplied name ("Farmers" -> "farmer")
fn canonical_resource_type(name: &str) -> String {
    RecordKind::parse(name)
        .map(|kind| kind.resource_type().to_string())
        .unwrap_or_else(|| name.to_lowercase())
}

/// Render entries as CSV, one row per entry under [`CSV_HEADER`].
pub fn to_csv(entries: &[AuditEntry]) -> String {
    if entries.is_empty() {
        return CSV_EMPTY.to_string();
    }

    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push(CSV_HEADER.to_string());

    for entry in entries {
        let timestamp = entry
            .timestamp
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default();
        let changes = entry
            .changes
            .as_ref()
            .and_then(|c| serde_json::to_string(c).ok())
            .unwrap_or_default();

        let fields: [&str; 8] = [
            timestamp.as_str(),
            &entry.action,
            &entry.resource_type,
            entry.resource_id.as_deref().unwrap_or_default(),
            entry.user_id.as_deref().unwrap_or_default(),
            entry.user_email.as_deref().unwrap_or_default(),
            &entry.ip_address,
            &changes,
        ];
        let row = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");

        lines.push(row);
    }

    lines.join("\n")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
