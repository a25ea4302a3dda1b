//! Field-level diffing of record snapshots

use serde_json::{Map, Value};

use crate::models::AuditChange;
use crate::utils::{is_sensitive_field, sanitize, REDACTED};

/// Compare two snapshots field by field.
///
/// Returns `None` when either side is missing or not an object, and when no
/// top-level field differs. Fields are reported in discovery order: keys of
/// `old` first, then keys only present in `new`. Values of sensitive fields
/// are redacted, other values are sanitized the same way stored snapshots are.
pub fn detect_changes(old: Option<&Value>, new: Option<&Value>) -> Option<Vec<AuditChange>> {
    let (Value::Object(old), Value::Object(new)) = (old?, new?) else {
        return None;
    };

    let changes: Vec<AuditChange> = field_union(old, new)
        .filter_map(|field| {
            let before = old.get(field);
            let after = new.get(field);
            (before != after).then(|| AuditChange {
                field: field.clone(),
                old_value: before.map(|v| redact(field, v)),
                new_value: after.map(|v| redact(field, v)),
            })
        })
        .collect();

    (!changes.is_empty()).then_some(changes)
}

fn field_union<'a>(
    old: &'a Map<String, Value>,
    new: &'a Map<String, Value>,
) -> impl Iterator<Item = &'a String> {
    old.keys()
        .chain(new.keys().filter(move |k| !old.contains_key(k.as_str())))
}

fn redact(field: &str, value: &Value) -> Value {
    if is_sensitive_field(field) {
        Value::String(REDACTED.to_string())
    } else {
        sanitize(value)
    }
}
