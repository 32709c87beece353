//! Pre-order rows and their sync mutations.

use crate::error::Result;
use crate::services::entity_store::{
    coerce_int, coerce_opt_string, coerce_string, coerce_uuid, int_or, opt_string, req_string,
    req_uuid, EntityStore,
};
use crate::services::sqlite_store::{row_to_pre_order, PRE_ORDER_COLUMNS};
use crate::types::{to_iso, EntityType, PreOrder};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Store for the `pre_order` kind. Soft-deleting a pre-order also
/// hard-deletes its flows inside the same transaction.
pub struct PreOrderStore;

impl EntityStore for PreOrderStore {
    type Entity = PreOrder;

    fn entity_type(&self) -> EntityType {
        EntityType::PreOrder
    }

    fn get(&self, conn: &Connection, id: Uuid) -> Result<Option<PreOrder>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {PRE_ORDER_COLUMNS} FROM pre_orders WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map([id.to_string()], row_to_pre_order)?;
        Ok(rows.next().transpose()?)
    }

    fn create(&self, conn: &Connection, id: Uuid, data: &Map<String, Value>) -> Result<PreOrder> {
        let now = Utc::now();
        let pre_order = PreOrder {
            id,
            partner_id: req_uuid(data, "partner_id")?,
            status: int_or(data, "status", 0)?,
            order_date: opt_string(data, "order_date")?,
            delivery_date: req_string(data, "delivery_date")?,
            comment: opt_string(data, "comment")?,
            created_at: now,
            updated_at: now,
            version: 1,
            deleted_at: None,
        };

        conn.execute(
            "INSERT INTO pre_orders
                (id, partner_id, status, order_date, delivery_date, comment,
                 created_at, updated_at, version, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)",
            params![
                pre_order.id.to_string(),
                pre_order.partner_id.to_string(),
                pre_order.status,
                pre_order.order_date,
                pre_order.delivery_date,
                pre_order.comment,
                to_iso(pre_order.created_at),
                to_iso(pre_order.updated_at),
                pre_order.version,
            ],
        )?;

        Ok(pre_order)
    }

    fn apply_update(
        &self,
        conn: &Connection,
        entity: PreOrder,
        fields: &Map<String, Value>,
    ) -> Result<PreOrder> {
        let mut entity = entity;
        for (field, value) in fields {
            match field.as_str() {
                "partner_id" => entity.partner_id = coerce_uuid(value, field)?,
                "status" => entity.status = coerce_int(value, field)?,
                "order_date" => entity.order_date = coerce_opt_string(value, field)?,
                "delivery_date" => entity.delivery_date = coerce_string(value, field)?,
                "comment" => entity.comment = coerce_opt_string(value, field)?,
                // Anything else (id, version, bookkeeping columns) is
                // not updatable by clients.
                _ => {}
            }
        }
        entity.version += 1;
        entity.updated_at = Utc::now();

        conn.execute(
            "UPDATE pre_orders SET
                partner_id = ?2, status = ?3, order_date = ?4, delivery_date = ?5,
                comment = ?6, updated_at = ?7, version = ?8
             WHERE id = ?1",
            params![
                entity.id.to_string(),
                entity.partner_id.to_string(),
                entity.status,
                entity.order_date,
                entity.delivery_date,
                entity.comment,
                to_iso(entity.updated_at),
                entity.version,
            ],
        )?;

        Ok(entity)
    }

    fn soft_delete(&self, conn: &Connection, entity: PreOrder) -> Result<PreOrder> {
        let mut entity = entity;
        let now = Utc::now();

        // Flows die with their parent, in the same transaction.
        conn.execute(
            "DELETE FROM pre_order_flows WHERE pre_order_id = ?1",
            [entity.id.to_string()],
        )?;

        entity.deleted_at = Some(now);
        entity.updated_at = now;
        entity.version += 1;

        conn.execute(
            "UPDATE pre_orders SET deleted_at = ?2, updated_at = ?3, version = ?4 WHERE id = ?1",
            params![
                entity.id.to_string(),
                to_iso(now),
                to_iso(now),
                entity.version,
            ],
        )?;

        Ok(entity)
    }

    fn snapshot(&self, entity: &PreOrder) -> Map<String, Value> {
        entity.snapshot()
    }

    fn id(&self, entity: &PreOrder) -> Uuid {
        entity.id
    }

    fn version(&self, entity: &PreOrder) -> i64 {
        entity.version
    }

    fn updated_at(&self, entity: &PreOrder) -> DateTime<Utc> {
        entity.updated_at
    }

    fn deleted_at(&self, entity: &PreOrder) -> Option<DateTime<Utc>> {
        entity.deleted_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SqliteStore;
    use serde_json::json;

    fn creation_data(partner_id: Uuid) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("partner_id".into(), json!(partner_id.to_string()));
        data.insert("delivery_date".into(), json!("2024-01-20"));
        data.insert("comment".into(), json!("morning delivery"));
        data
    }

    #[test]
    fn test_create_and_get_round_trip() {
        let store = SqliteStore::new_in_memory().unwrap();
        let conn = store.connection().lock().unwrap();
        let id = Uuid::new_v4();
        let partner_id = Uuid::new_v4();

        let created = PreOrderStore
            .create(&conn, id, &creation_data(partner_id))
            .unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.status, 0);

        let fetched = PreOrderStore.get(&conn, id).unwrap().unwrap();
        assert_eq!(fetched.partner_id, partner_id);
        assert_eq!(fetched.delivery_date, "2024-01-20");
        assert_eq!(fetched.comment.as_deref(), Some("morning delivery"));
    }

    #[test]
    fn test_create_missing_partner_is_validation_error() {
        let store = SqliteStore::new_in_memory().unwrap();
        let conn = store.connection().lock().unwrap();
        let mut data = Map::new();
        data.insert("delivery_date".into(), json!("2024-01-20"));

        let err = PreOrderStore.create(&conn, Uuid::new_v4(), &data);
        assert!(err.is_err());
    }

    #[test]
    fn test_apply_update_bumps_version_and_skips_unknown_fields() {
        let store = SqliteStore::new_in_memory().unwrap();
        let conn = store.connection().lock().unwrap();
        let id = Uuid::new_v4();
        let created = PreOrderStore
            .create(&conn, id, &creation_data(Uuid::new_v4()))
            .unwrap();

        let mut fields = Map::new();
        fields.insert("status".into(), json!(1));
        fields.insert("version".into(), json!(99));
        fields.insert("id".into(), json!(Uuid::new_v4().to_string()));

        let updated = PreOrderStore.apply_update(&conn, created, &fields).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.status, 1);
        assert_eq!(updated.id, id);

        let fetched = PreOrderStore.get(&conn, id).unwrap().unwrap();
        assert_eq!(fetched.version, 2);
        assert_eq!(fetched.status, 1);
    }

    #[test]
    fn test_soft_delete_tombstones_and_cascades() {
        let store = SqliteStore::new_in_memory().unwrap();
        let conn = store.connection().lock().unwrap();
        let id = Uuid::new_v4();
        let created = PreOrderStore
            .create(&conn, id, &creation_data(Uuid::new_v4()))
            .unwrap();

        conn.execute(
            "INSERT INTO pre_order_flows
                (id, pre_order_id, product_id, quantity, price, unit_id,
                 created_at, updated_at, version)
             VALUES (?1, ?2, ?3, 1, 1, ?4, ?5, ?5, 1)",
            params![
                Uuid::new_v4().to_string(),
                id.to_string(),
                Uuid::new_v4().to_string(),
                Uuid::new_v4().to_string(),
                to_iso(Utc::now()),
            ],
        )
        .unwrap();

        let deleted = PreOrderStore.soft_delete(&conn, created).unwrap();
        assert!(deleted.deleted_at.is_some());
        assert_eq!(deleted.version, 2);

        // Row is still readable as a tombstone.
        let fetched = PreOrderStore.get(&conn, id).unwrap().unwrap();
        assert!(fetched.deleted_at.is_some());

        let flows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pre_order_flows WHERE pre_order_id = ?1",
                [id.to_string()],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(flows, 0);
    }
}
