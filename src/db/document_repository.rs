//! Repository for domain records stored as JSON documents

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Document, RecordKind};

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: String,
    created_at: String,
    updated_at: String,
}

pub struct DocumentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DocumentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// All records of a kind, newest first
    pub async fn list(&self, kind: RecordKind) -> Result<Vec<Document>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, data, created_at, updated_at FROM documents WHERE collection = ? ORDER BY created_at DESC",
        )
        .bind(kind.collection())
        .fetch_all(self.pool)
        .await
        .with_context(|| format!("Failed to list {}", kind.collection()))?;

        rows.into_iter().map(|r| row_to_document(kind, r)).collect()
    }

    pub async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, data, created_at, updated_at FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(kind.collection())
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .with_context(|| format!("Failed to load {} {}", kind, id))?;

        row.map(|r| row_to_document(kind, r)).transpose()
    }

    /// Insert a new record under a freshly generated id
    pub async fn insert(&self, kind: RecordKind, data: &Value) -> Result<Document> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let data = Value::Object(user_fields(data));

        sqlx::query(
            "INSERT INTO documents (collection, id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(kind.collection())
        .bind(&id)
        .bind(data.to_string())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(self.pool)
        .await
        .with_context(|| format!("Failed to insert {}", kind))?;

        Ok(Document {
            id,
            kind,
            data,
            created_at: now,
            updated_at: now,
        })
    }

    /// Merge `patch` into the top level of an existing record
    pub async fn update(&self, kind: RecordKind, id: &str, patch: &Value) -> Result<Option<Document>> {
        let Some(mut doc) = self.get(kind, id).await? else {
            return Ok(None);
        };

        let mut fields = user_fields(&doc.data);
        fields.extend(user_fields(patch));
        doc.data = Value::Object(fields);
        doc.updated_at = Utc::now();

        sqlx::query("UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?")
            .bind(doc.data.to_string())
            .bind(doc.updated_at.to_rfc3339())
            .bind(kind.collection())
            .bind(id)
            .execute(self.pool)
            .await
            .with_context(|| format!("Failed to update {} {}", kind, id))?;

        Ok(Some(doc))
    }

    /// Delete a record, returning what was removed
    pub async fn delete(&self, kind: RecordKind, id: &str) -> Result<Option<Document>> {
        let Some(doc) = self.get(kind, id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(kind.collection())
            .bind(id)
            .execute(self.pool)
            .await
            .with_context(|| format!("Failed to delete {} {}", kind, id))?;

        Ok(Some(doc))
    }
}

/// Object fields minus the ones owned by the store
fn user_fields(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "_id" | "id" | "createdAt" | "updatedAt"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => Map::new(),
    }
}

fn parse_timestamp(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_document(kind: RecordKind, row: DocumentRow) -> Result<Document> {
    let data = serde_json::from_str(&row.data)
        .with_context(|| format!("Corrupt {} document {}", kind, row.id))?;
    Ok(Document {
        id: row.id,
        kind,
        data,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}
