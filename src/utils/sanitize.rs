//! Redaction of sensitive fields before audit data is stored or returned.

use serde_json::Value;

/// Marker written in place of a redacted value
pub const REDACTED: &str = "[REDACTED]";

/// Field name fragments that mark a field as sensitive (matched case-insensitively)
pub const SENSITIVE_FIELDS: &[&str] = &["password", "token", "secret", "key", "auth"];

/// Returns true when `field` names a sensitive value.
pub fn is_sensitive_field(field: &str) -> bool {
    let lowered = field.to_lowercase();
    SENSITIVE_FIELDS.iter().any(|s| lowered.contains(s))
}

/// Shallow copy of `value` with every sensitive top-level key redacted.
///
/// Non-object values pass through unchanged. Nested objects are not
/// inspected, so secrets below the first level are kept as-is.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_field(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        v.clone()
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}
