//! Domain record models
//!
//! Farmers, crops, barangays, pests and reports are stored as schemaless JSON
//! documents. Only the fields needed to name a record are interpreted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kinds of domain records exposed by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Farmer,
    Crop,
    Barangay,
    Pest,
    Report,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Farmer,
        RecordKind::Crop,
        RecordKind::Barangay,
        RecordKind::Pest,
        RecordKind::Report,
    ];

    /// Storage collection and URL segment
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Farmer => "farmers",
            Self::Crop => "crops",
            Self::Barangay => "barangays",
            Self::Pest => "pests",
            Self::Report => "reports",
        }
    }

    /// Resource type recorded in audit entries
    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Farmer => "farmer",
            Self::Crop => "crop",
            Self::Barangay => "barangay",
            Self::Pest => "pest",
            Self::Report => "report",
        }
    }

    /// Accepts singular or plural names, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        let lowered = name.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| lowered == k.resource_type() || lowered == k.collection())
    }

    /// Human-readable label for a record of this kind
    pub fn display_name(&self, data: &Value) -> Option<String> {
        let text = |key: &str| {
            data.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        match self {
            Self::Farmer => {
                let name = [text("firstName"), text("lastName")]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                (!name.is_empty()).then_some(name)
            }
            Self::Crop => text("cropName").or_else(|| text("name")),
            Self::Barangay => text("barangayName").or_else(|| text("name")),
            Self::Pest => text("pestName").or_else(|| text("name")),
            Self::Report => Some(format!(
                "Report - {}",
                text("description").unwrap_or_else(|| "Report".to_string())
            )),
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.resource_type())
    }
}

/// A stored record
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub kind: RecordKind,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// JSON view returned by the API: the record fields plus `_id` and timestamps
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("_id".to_string(), Value::String(self.id.clone()));
        if let Value::Object(fields) = &self.data {
            for (k, v) in fields {
                if !matches!(k.as_str(), "_id" | "createdAt" | "updatedAt") {
                    map.insert(k.clone(), v.clone());
                }
            }
        }
        map.insert(
            "createdAt".to_string(),
            Value::String(self.created_at.to_rfc3339()),
        );
        map.insert(
            "updatedAt".to_string(),
            Value::String(self.updated_at.to_rfc3339()),
        );
        Value::Object(map)
    }
}
