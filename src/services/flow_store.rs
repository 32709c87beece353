//! Pre-order flow rows (product lines) and their sync mutations.

use crate::error::Result;
use crate::services::entity_store::{
    coerce_num, coerce_opt_string, coerce_uuid, num_or, opt_string, req_uuid, EntityStore,
};
use crate::services::sqlite_store::{row_to_flow, FLOW_COLUMNS};
use crate::types::{to_iso, EntityType, PreOrderFlow};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Store for the `pre_order_flow` kind.
pub struct FlowStore;

impl EntityStore for FlowStore {
    type Entity = PreOrderFlow;

    fn entity_type(&self) -> EntityType {
        EntityType::PreOrderFlow
    }

    fn get(&self, conn: &Connection, id: Uuid) -> Result<Option<PreOrderFlow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {FLOW_COLUMNS} FROM pre_order_flows WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map([id.to_string()], row_to_flow)?;
        Ok(rows.next().transpose()?)
    }

    fn create(
        &self,
        conn: &Connection,
        id: Uuid,
        data: &Map<String, Value>,
    ) -> Result<PreOrderFlow> {
        let now = Utc::now();
        let flow = PreOrderFlow {
            id,
            pre_order_id: req_uuid(data, "pre_order_id")?,
            product_id: req_uuid(data, "product_id")?,
            quantity: num_or(data, "quantity", 0.0)?,
            price: num_or(data, "price", 0.0)?,
            unit_id: req_uuid(data, "unit_id")?,
            comment: opt_string(data, "comment")?,
            created_at: now,
            updated_at: now,
            version: 1,
            deleted_at: None,
        };

        conn.execute(
            "INSERT INTO pre_order_flows
                (id, pre_order_id, product_id, quantity, price, unit_id, comment,
                 created_at, updated_at, version, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL)",
            params![
                flow.id.to_string(),
                flow.pre_order_id.to_string(),
                flow.product_id.to_string(),
                flow.quantity,
                flow.price,
                flow.unit_id.to_string(),
                flow.comment,
                to_iso(flow.created_at),
                to_iso(flow.updated_at),
                flow.version,
            ],
        )?;

        Ok(flow)
    }

    fn apply_update(
        &self,
        conn: &Connection,
        entity: PreOrderFlow,
        fields: &Map<String, Value>,
    ) -> Result<PreOrderFlow> {
        let mut entity = entity;
        for (field, value) in fields {
            match field.as_str() {
                "product_id" => entity.product_id = coerce_uuid(value, field)?,
                "unit_id" => entity.unit_id = coerce_uuid(value, field)?,
                "quantity" => entity.quantity = coerce_num(value, field)?,
                "price" => entity.price = coerce_num(value, field)?,
                "comment" => entity.comment = coerce_opt_string(value, field)?,
                _ => {}
            }
        }
        entity.version += 1;
        entity.updated_at = Utc::now();

        conn.execute(
            "UPDATE pre_order_flows SET
                product_id = ?2, quantity = ?3, price = ?4, unit_id = ?5,
                comment = ?6, updated_at = ?7, version = ?8
             WHERE id = ?1",
            params![
                entity.id.to_string(),
                entity.product_id.to_string(),
                entity.quantity,
                entity.price,
                entity.unit_id.to_string(),
                entity.comment,
                to_iso(entity.updated_at),
                entity.version,
            ],
        )?;

        Ok(entity)
    }

    fn soft_delete(&self, conn: &Connection, entity: PreOrderFlow) -> Result<PreOrderFlow> {
        let mut entity = entity;
        let now = Utc::now();
        entity.deleted_at = Some(now);
        entity.updated_at = now;
        entity.version += 1;

        conn.execute(
            "UPDATE pre_order_flows SET deleted_at = ?2, updated_at = ?3, version = ?4
             WHERE id = ?1",
            params![
                entity.id.to_string(),
                to_iso(now),
                to_iso(now),
                entity.version,
            ],
        )?;

        Ok(entity)
    }

    fn snapshot(&self, entity: &PreOrderFlow) -> Map<String, Value> {
        entity.snapshot()
    }

    fn id(&self, entity: &PreOrderFlow) -> Uuid {
        entity.id
    }

    fn version(&self, entity: &PreOrderFlow) -> i64 {
        entity.version
    }

    fn updated_at(&self, entity: &PreOrderFlow) -> DateTime<Utc> {
        entity.updated_at
    }

    fn deleted_at(&self, entity: &PreOrderFlow) -> Option<DateTime<Utc>> {
        entity.deleted_at
    }
}
