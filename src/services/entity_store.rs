//! Storage seam for syncable entity kinds.
//!
//! Each kind implements [`EntityStore`] over a borrowed connection so
//! every mutation runs inside whatever transaction or savepoint the
//! caller holds; the store never commits. The generic sync handler is
//! written against this trait only.

use crate::error::{AppError, Result};
use crate::types::EntityType;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Per-kind persistence operations used by the sync handlers.
pub trait EntityStore {
    type Entity;

    fn entity_type(&self) -> EntityType;

    /// Fetch a row by id, tombstoned or not.
    fn get(&self, conn: &Connection, id: Uuid) -> Result<Option<Self::Entity>>;

    /// Insert a new row at version 1 from client-supplied fields.
    /// Validation failures surface as [`AppError::BadRequest`].
    fn create(&self, conn: &Connection, id: Uuid, data: &Map<String, Value>)
        -> Result<Self::Entity>;

    /// Write whitelisted fields, bump `version` and `updated_at`.
    fn apply_update(
        &self,
        conn: &Connection,
        entity: Self::Entity,
        fields: &Map<String, Value>,
    ) -> Result<Self::Entity>;

    /// Tombstone the row, bumping `version` and `updated_at`.
    fn soft_delete(&self, conn: &Connection, entity: Self::Entity) -> Result<Self::Entity>;

    /// Flat JSON snapshot: ids as strings, timestamps as ISO-8601.
    fn snapshot(&self, entity: &Self::Entity) -> Map<String, Value>;

    fn id(&self, entity: &Self::Entity) -> Uuid;
    fn version(&self, entity: &Self::Entity) -> i64;
    fn updated_at(&self, entity: &Self::Entity) -> DateTime<Utc>;
    fn deleted_at(&self, entity: &Self::Entity) -> Option<DateTime<Utc>>;
}

// =============================================================================
// Field coercion helpers
// =============================================================================
// Client payloads arrive as loose JSON; ids come as strings and numbers
// sometimes as numeric strings. These normalize into typed values.

pub(crate) fn req_uuid(data: &Map<String, Value>, key: &str) -> Result<Uuid> {
    let value = data
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| AppError::BadRequest(format!("missing required field '{key}'")))?;
    coerce_uuid(value, key)
}

pub(crate) fn req_string(data: &Map<String, Value>, key: &str) -> Result<String> {
    match data.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => {
            Err(AppError::BadRequest(format!("missing required field '{key}'")))
        }
        Some(other) => Err(AppError::BadRequest(format!(
            "expected string for '{key}', got {other}"
        ))),
    }
}

pub(crate) fn opt_string(data: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match data.get(key) {
        Some(v) => coerce_opt_string(v, key),
        None => Ok(None),
    }
}

pub(crate) fn int_or(data: &Map<String, Value>, key: &str, default: i64) -> Result<i64> {
    match data.get(key) {
        Some(v) if !v.is_null() => coerce_int(v, key),
        _ => Ok(default),
    }
}

pub(crate) fn num_or(data: &Map<String, Value>, key: &str, default: f64) -> Result<f64> {
    match data.get(key) {
        Some(v) if !v.is_null() => coerce_num(v, key),
        _ => Ok(default),
    }
}

pub(crate) fn coerce_uuid(value: &Value, key: &str) -> Result<Uuid> {
    match value {
        Value::String(s) => Uuid::parse_str(s)
            .map_err(|e| AppError::BadRequest(format!("invalid UUID for '{key}': {e}"))),
        other => Err(AppError::BadRequest(format!(
            "invalid UUID for '{key}': {other}"
        ))),
    }
}

pub(crate) fn coerce_int(value: &Value, key: &str) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| AppError::BadRequest(format!("non-integer value for '{key}': {n}"))),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| AppError::BadRequest(format!("non-integer value for '{key}': {s}"))),
        other => Err(AppError::BadRequest(format!(
            "non-integer value for '{key}': {other}"
        ))),
    }
}

pub(crate) fn coerce_num(value: &Value, key: &str) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| AppError::BadRequest(format!("non-numeric value for '{key}': {n}"))),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| AppError::BadRequest(format!("non-numeric value for '{key}': {s}"))),
        other => Err(AppError::BadRequest(format!(
            "non-numeric value for '{key}': {other}"
        ))),
    }
}

pub(crate) fn coerce_string(value: &Value, key: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(AppError::BadRequest(format!(
            "expected string for '{key}', got {other}"
        ))),
    }
}

pub(crate) fn coerce_opt_string(value: &Value, key: &str) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(AppError::BadRequest(format!(
            "expected string for '{key}', got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_req_uuid_accepts_string_form() {
        let id = Uuid::new_v4();
        let d = data(&[("partner_id", json!(id.to_string()))]);
        assert_eq!(req_uuid(&d, "partner_id").unwrap(), id);
    }

    #[test]
    fn test_req_uuid_missing_or_malformed() {
        let d = data(&[("partner_id", json!("not-a-uuid"))]);
        assert!(req_uuid(&d, "partner_id").is_err());
        assert!(req_uuid(&Map::new(), "partner_id").is_err());
    }

    #[test]
    fn test_int_or_accepts_numeric_string() {
        let d = data(&[("status", json!("2"))]);
        assert_eq!(int_or(&d, "status", 0).unwrap(), 2);
        assert_eq!(int_or(&Map::new(), "status", 0).unwrap(), 0);
    }

    #[test]
    fn test_num_or_rejects_garbage() {
        let d = data(&[("quantity", json!("heavy"))]);
        assert!(num_or(&d, "quantity", 0.0).is_err());
    }

    #[test]
    fn test_opt_string_null_is_none() {
        let d = data(&[("comment", Value::Null)]);
        assert_eq!(opt_string(&d, "comment").unwrap(), None);
    }
}
