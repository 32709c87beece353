//! Append-only operation log, the canonical source of truth for
//! incremental replication.
//!
//! Every accepted mutation lands here with a `sync_id` assigned by the
//! storage engine's autoincrement, which totally orders mutations across
//! all entity kinds. Clients pull by cursor; the conflict resolver reads
//! back per-field change history.

use crate::error::Result;
use crate::services::sqlite_store::{col_ts, col_uuid};
use crate::types::{to_iso, EntityType, LogEntry, OperationType};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Repository over the `operation_log` table. All methods run inside the
/// caller's transaction.
pub struct OperationLog;

impl OperationLog {
    /// Append one entry; the storage engine assigns the next `sync_id`.
    pub fn record(
        conn: &Connection,
        entity_type: EntityType,
        entity_id: Uuid,
        operation_type: OperationType,
        data: Map<String, Value>,
    ) -> Result<LogEntry> {
        let timestamp = Utc::now();
        conn.execute(
            "INSERT INTO operation_log (entity_type, entity_id, operation_type, data, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entity_type.as_str(),
                entity_id.to_string(),
                operation_type.as_str(),
                serde_json::to_string(&data)?,
                to_iso(timestamp),
            ],
        )?;

        Ok(LogEntry {
            sync_id: conn.last_insert_rowid(),
            entity_type: entity_type.as_str().to_string(),
            entity_id,
            operation_type: operation_type.as_str().to_string(),
            data,
            timestamp,
        })
    }

    /// Fields the server changed on an entity since `since_version`,
    /// mapped to the ISO timestamp of the latest change.
    ///
    /// Scans the entity's UPDATE entries in `sync_id` order and keeps
    /// the last write per field, which is what LWW compares against.
    pub fn server_changed_fields(
        conn: &Connection,
        entity_type: EntityType,
        entity_id: Uuid,
        since_version: i64,
    ) -> Result<HashMap<String, String>> {
        let mut stmt = conn.prepare(
            "SELECT data, timestamp FROM operation_log
             WHERE entity_type = ?1 AND entity_id = ?2 AND operation_type = 'UPDATE'
             ORDER BY sync_id",
        )?;
        let rows = stmt.query_map(
            params![entity_type.as_str(), entity_id.to_string()],
            |row| {
                let data: String = row.get(0)?;
                let timestamp: String = row.get(1)?;
                Ok((data, timestamp))
            },
        )?;

        let mut changed: HashMap<String, String> = HashMap::new();
        for row in rows {
            let (raw, timestamp) = row?;
            let data: Map<String, Value> = serde_json::from_str(&raw)?;
            let entry_version = data.get("version").and_then(Value::as_i64).unwrap_or(0);
            if entry_version <= since_version {
                continue;
            }
            for field in data.keys() {
                if field != "version" {
                    changed.insert(field.clone(), timestamp.clone());
                }
            }
        }

        Ok(changed)
    }

    /// Entries above `cursor`, ascending, at most `limit`; fetches one
    /// extra row to compute `has_more` without a second query.
    pub fn read_since(
        conn: &Connection,
        cursor: i64,
        limit: usize,
    ) -> Result<(Vec<LogEntry>, bool)> {
        let mut stmt = conn.prepare(
            "SELECT sync_id, entity_type, entity_id, operation_type, data, timestamp
             FROM operation_log WHERE sync_id > ?1 ORDER BY sync_id LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![cursor, (limit + 1) as i64], |row| {
            let raw: String = row.get(4)?;
            Ok((
                LogEntry {
                    sync_id: row.get(0)?,
                    entity_type: row.get(1)?,
                    entity_id: col_uuid(row, 2)?,
                    operation_type: row.get(3)?,
                    data: Map::new(),
                    timestamp: col_ts(row, 5)?,
                },
                raw,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (mut entry, raw) = row?;
            entry.data = serde_json::from_str(&raw)?;
            entries.push(entry);
        }

        let has_more = entries.len() > limit;
        entries.truncate(limit);
        Ok((entries, has_more))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SqliteStore;
    use serde_json::json;

    fn patch(fields: &[(&str, Value)]) -> Map<String, Value> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_record_assigns_dense_increasing_sync_ids() {
        let store = SqliteStore::new_in_memory().unwrap();
        let conn = store.connection().lock().unwrap();
        let id = Uuid::new_v4();

        for expected in 1..=3 {
            let entry = OperationLog::record(
                &conn,
                EntityType::PreOrder,
                id,
                OperationType::Update,
                patch(&[("version", json!(expected))]),
            )
            .unwrap();
            assert_eq!(entry.sync_id, expected);
        }
    }

    #[test]
    fn test_server_changed_fields_last_write_wins() {
        let store = SqliteStore::new_in_memory().unwrap();
        let conn = store.connection().lock().unwrap();
        let id = Uuid::new_v4();

        OperationLog::record(
            &conn,
            EntityType::PreOrder,
            id,
            OperationType::Update,
            patch(&[("comment", json!("first")), ("version", json!(2))]),
        )
        .unwrap();
        let second = OperationLog::record(
            &conn,
            EntityType::PreOrder,
            id,
            OperationType::Update,
            patch(&[("comment", json!("second")), ("version", json!(3))]),
        )
        .unwrap();

        let changed =
            OperationLog::server_changed_fields(&conn, EntityType::PreOrder, id, 1).unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed["comment"], to_iso(second.timestamp));
    }

    #[test]
    fn test_server_changed_fields_respects_since_version() {
        let store = SqliteStore::new_in_memory().unwrap();
        let conn = store.connection().lock().unwrap();
        let id = Uuid::new_v4();

        OperationLog::record(
            &conn,
            EntityType::PreOrder,
            id,
            OperationType::Update,
            patch(&[("status", json!(1)), ("version", json!(2))]),
        )
        .unwrap();
        OperationLog::record(
            &conn,
            EntityType::PreOrder,
            id,
            OperationType::Update,
            patch(&[("comment", json!("late")), ("version", json!(3))]),
        )
        .unwrap();

        let changed =
            OperationLog::server_changed_fields(&conn, EntityType::PreOrder, id, 2).unwrap();
        assert!(!changed.contains_key("status"));
        assert!(changed.contains_key("comment"));
    }

    #[test]
    fn test_server_changed_fields_ignores_other_entities_and_creates() {
        let store = SqliteStore::new_in_memory().unwrap();
        let conn = store.connection().lock().unwrap();
        let id = Uuid::new_v4();

        OperationLog::record(
            &conn,
            EntityType::PreOrder,
            id,
            OperationType::Create,
            patch(&[("comment", json!("snapshot")), ("version", json!(1))]),
        )
        .unwrap();
        OperationLog::record(
            &conn,
            EntityType::PreOrder,
            Uuid::new_v4(),
            OperationType::Update,
            patch(&[("comment", json!("other")), ("version", json!(5))]),
        )
        .unwrap();
        OperationLog::record(
            &conn,
            EntityType::PreOrderFlow,
            id,
            OperationType::Update,
            patch(&[("price", json!(2.0)), ("version", json!(5))]),
        )
        .unwrap();

        let changed =
            OperationLog::server_changed_fields(&conn, EntityType::PreOrder, id, 0).unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn test_read_since_pagination() {
        let store = SqliteStore::new_in_memory().unwrap();
        let conn = store.connection().lock().unwrap();
        let id = Uuid::new_v4();

        for i in 1..=5 {
            OperationLog::record(
                &conn,
                EntityType::PreOrder,
                id,
                OperationType::Update,
                patch(&[("version", json!(i))]),
            )
            .unwrap();
        }

        let (page, has_more) = OperationLog::read_since(&conn, 0, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert!(has_more);
        assert_eq!(page[0].sync_id, 1);
        assert_eq!(page[1].sync_id, 2);

        let (rest, has_more) = OperationLog::read_since(&conn, 2, 10).unwrap();
        assert_eq!(rest.len(), 3);
        assert!(!has_more);
        assert_eq!(rest.last().unwrap().sync_id, 5);
    }

    #[test]
    fn test_read_since_exact_limit_boundary() {
        let store = SqliteStore::new_in_memory().unwrap();
        let conn = store.connection().lock().unwrap();

        for i in 1..=3 {
            OperationLog::record(
                &conn,
                EntityType::PreOrder,
                Uuid::new_v4(),
                OperationType::Create,
                patch(&[("version", json!(i))]),
            )
            .unwrap();
        }

        let (page, has_more) = OperationLog::read_since(&conn, 0, 3).unwrap();
        assert_eq!(page.len(), 3);
        assert!(!has_more);
    }
}
