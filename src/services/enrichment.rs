//! Audit log enrichment
//!
//! Attaches human-readable resource names to audit entries by looking up the
//! referenced record through a registry of per-resource lookups. Lookups are
//! best effort: a failing lookup leaves that entry unenriched and the rest of
//! the batch continues.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::db::{DbPool, DocumentRepository};
use crate::models::{
    AuditChange, AuditEntry, EnrichedAuditEntry, FarmerDetails, RecordKind, ACTION_DELETE,
};

/// A record resolved for display
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResource {
    pub display_name: Option<String>,
    pub raw: Value,
}

/// Resolves records of one resource type
#[async_trait]
pub trait ResourceLookup: Send + Sync {
    /// Look up the live record; `Ok(None)` when it does not exist.
    async fn find(&self, id: &str) -> Result<Option<ResolvedResource>>;

    /// Resolve from a stored snapshot, used once the live record is gone.
    fn from_snapshot(&self, snapshot: &Value) -> Option<ResolvedResource>;
}

/// Lookup over one collection of the document store
pub struct DocumentLookup {
    pool: DbPool,
    kind: RecordKind,
}

impl DocumentLookup {
    pub fn new(pool: DbPool, kind: RecordKind) -> Self {
        Self { pool, kind }
    }
}

#[async_trait]
impl ResourceLookup for DocumentLookup {
    async fn find(&self, id: &str) -> Result<Option<ResolvedResource>> {
        let doc = DocumentRepository::new(&self.pool).get(self.kind, id).await?;
        Ok(doc.map(|doc| ResolvedResource {
            display_name: self.kind.display_name(&doc.data),
            raw: doc.data,
        }))
    }

    fn from_snapshot(&self, snapshot: &Value) -> Option<ResolvedResource> {
        if !snapshot.as_object().is_some_and(|m| !m.is_empty()) {
            return None;
        }
        let display_name = self.kind.display_name(snapshot)?;
        Some(ResolvedResource {
            display_name: Some(display_name),
            raw: snapshot.clone(),
        })
    }
}

/// Maps resource type names to their lookups
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    lookups: HashMap<String, Arc<dyn ResourceLookup>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry covering every record collection, under singular and plural names
    pub fn with_documents(pool: DbPool) -> Self {
        let mut registry = Self::new();
        for kind in RecordKind::ALL {
            let lookup: Arc<dyn ResourceLookup> = Arc::new(DocumentLookup::new(pool.clone(), kind));
            registry.register(kind.resource_type(), lookup.clone());
            registry.register(kind.collection(), lookup);
        }
        registry
    }

    pub fn register(&mut self, resource_type: impl Into<String>, lookup: Arc<dyn ResourceLookup>) {
        self.lookups
            .insert(resource_type.into().to_lowercase(), lookup);
    }

    pub fn get(&self, resource_type: &str) -> Option<Arc<dyn ResourceLookup>> {
        self.lookups.get(&resource_type.to_lowercase()).cloned()
    }
}

/// Enrich a batch of entries for display.
///
/// Entries without an action, resource type or timestamp are dropped.
/// Lookups are memoized for the duration of the call.
pub async fn enrich_entries(
    registry: &ResourceRegistry,
    entries: Vec<AuditEntry>,
) -> Vec<EnrichedAuditEntry> {
    let mut cache: HashMap<(String, String), Option<ResolvedResource>> = HashMap::new();
    let mut enriched = Vec::with_capacity(entries.len());

    for entry in entries {
        if entry.action.is_empty() || entry.resource_type.is_empty() || entry.timestamp.is_none() {
            debug!(id = %entry.id, "Skipping malformed audit entry");
            continue;
        }

        let resolved = resolve(registry, &mut cache, &entry).await;
        let farmer_details = match (&resolved, RecordKind::parse(&entry.resource_type)) {
            (Some(r), Some(RecordKind::Farmer)) => Some(farmer_details(&r.raw)),
            _ => None,
        };
        let resource_name = resolved.and_then(|r| r.display_name);

        let mut entry = entry;
        entry.changes = clean_changes(entry.changes.take());

        enriched.push(EnrichedAuditEntry {
            entry,
            resource_name,
            farmer_details,
        });
    }

    enriched
}

async fn resolve(
    registry: &ResourceRegistry,
    cache: &mut HashMap<(String, String), Option<ResolvedResource>>,
    entry: &AuditEntry,
) -> Option<ResolvedResource> {
    let id = entry.resource_id.as_deref().filter(|id| !id.is_empty())?;
    let lookup = registry.get(&entry.resource_type)?;

    let key = (entry.resource_type.to_lowercase(), id.to_string());
    let live = match cache.get(&key) {
        Some(hit) => hit.clone(),
        None => match lookup.find(id).await {
            Ok(found) => {
                cache.insert(key, found.clone());
                found
            }
            Err(e) => {
                warn!(
                    error = %format!("{:#}", e),
                    resource_type = %entry.resource_type,
                    resource_id = %id,
                    "Failed to resolve audit resource"
                );
                None
            }
        },
    };

    live.or_else(|| {
        if entry.action != ACTION_DELETE {
            return None;
        }
        entry
            .old_data
            .as_ref()
            .and_then(|old| lookup.from_snapshot(old))
    })
}

/// Farmer projection of a resolved record; names may be empty
pub fn farmer_details(data: &Value) -> FarmerDetails {
    let text = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

    let first_name = text("firstName");
    let last_name = text("lastName");
    let full_name = Some(text("fullName"))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("{} {}", first_name, last_name).trim().to_string());

    FarmerDetails {
        full_name,
        first_name,
        last_name,
        rsbsa_number: data
            .get("rsbsaNumber")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Drop unnamed or empty change records; `None` when nothing is left
pub fn clean_changes(changes: Option<Vec<AuditChange>>) -> Option<Vec<AuditChange>> {
    let kept: Vec<AuditChange> = changes?
        .into_iter()
        .filter(|c| !c.field.is_empty() && !c.is_empty())
        .collect();
    (!kept.is_empty()).then_some(kept)
}
