//! Syncable entity rows.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Render a timestamp the way snapshots and clients exchange it.
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// A customer pre-order. Soft-deleted rows are kept as tombstones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreOrder {
    pub id: Uuid,
    pub partner_id: Uuid,
    /// 0 = pending, 1 = confirmed.
    pub status: i64,
    /// YYYY-MM-DD.
    pub order_date: Option<String>,
    /// YYYY-MM-DD.
    pub delivery_date: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PreOrder {
    /// Flat, JSON-friendly snapshot for the operation log and conflict
    /// comparisons. Ids become strings, timestamps ISO-8601.
    pub fn snapshot(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id.to_string()));
        map.insert("partner_id".into(), json!(self.partner_id.to_string()));
        map.insert("status".into(), json!(self.status));
        map.insert("order_date".into(), json!(self.order_date));
        map.insert("delivery_date".into(), json!(self.delivery_date));
        map.insert("comment".into(), json!(self.comment));
        map.insert("created_at".into(), json!(to_iso(self.created_at)));
        map.insert("updated_at".into(), json!(to_iso(self.updated_at)));
        map.insert("version".into(), json!(self.version));
        map.insert("deleted_at".into(), json!(self.deleted_at.map(to_iso)));
        map
    }
}

/// One product line of a pre-order. Hard-deleted when the parent
/// pre-order is tombstoned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreOrderFlow {
    pub id: Uuid,
    pub pre_order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: f64,
    pub price: f64,
    pub unit_id: Uuid,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PreOrderFlow {
    pub fn snapshot(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id.to_string()));
        map.insert("pre_order_id".into(), json!(self.pre_order_id.to_string()));
        map.insert("product_id".into(), json!(self.product_id.to_string()));
        map.insert("quantity".into(), json!(self.quantity));
        map.insert("price".into(), json!(self.price));
        map.insert("unit_id".into(), json!(self.unit_id.to_string()));
        map.insert("comment".into(), json!(self.comment));
        map.insert("created_at".into(), json!(to_iso(self.created_at)));
        map.insert("updated_at".into(), json!(to_iso(self.updated_at)));
        map.insert("version".into(), json!(self.version));
        map.insert("deleted_at".into(), json!(self.deleted_at.map(to_iso)));
        map
    }
}
