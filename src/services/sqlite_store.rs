//! SQLite persistence layer.
//!
//! One connection guards all state: reference catalog, syncable entity
//! rows, and the append-only operation log. Mutations issued by the sync
//! pipeline run inside an explicit transaction owned by the caller; the
//! store itself never commits on their behalf.

use crate::types::{Partner, PreOrder, PreOrderFlow, Product, Unit};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// SQLite store backing the sync engine.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    pub db_path: String,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let db_path = path.as_ref().to_string_lossy().to_string();
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: ":memory:".to_string(),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    /// The guarded connection. Callers lock it for the duration of a
    /// request; the push pipeline additionally opens a transaction on it.
    pub fn connection(&self) -> &Mutex<Connection> {
        &self.conn
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                short_name TEXT,
                sku TEXT,
                code TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS partners (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                code TEXT,
                type INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS units (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                abbreviation TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pre_orders (
                id TEXT PRIMARY KEY,
                partner_id TEXT NOT NULL,
                status INTEGER NOT NULL DEFAULT 0,
                order_date TEXT,
                delivery_date TEXT NOT NULL,
                comment TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                deleted_at TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_pre_orders_delivery_date
             ON pre_orders(delivery_date)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pre_order_flows (
                id TEXT PRIMARY KEY,
                pre_order_id TEXT NOT NULL,
                product_id TEXT NOT NULL,
                quantity REAL NOT NULL DEFAULT 0,
                price REAL NOT NULL DEFAULT 0,
                unit_id TEXT NOT NULL,
                comment TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                deleted_at TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_flows_pre_order_id
             ON pre_order_flows(pre_order_id)",
            [],
        )?;

        // AUTOINCREMENT keeps sync_id strictly increasing even if the
        // highest row is ever deleted.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS operation_log (
                sync_id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                operation_type TEXT NOT NULL,
                data TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS ix_oplog_entity
             ON operation_log(entity_type, entity_id)",
            [],
        )?;

        Ok(())
    }

    // =========================================================================
    // Reference catalog
    // =========================================================================

    /// List all products.
    pub fn list_products(&self) -> Result<Vec<Product>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, name, short_name, sku, code FROM products ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Product {
                id: col_uuid(row, 0)?,
                name: row.get(1)?,
                short_name: row.get(2)?,
                sku: row.get(3)?,
                code: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    /// List all partners.
    pub fn list_partners(&self) -> Result<Vec<Partner>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, name, code, type FROM partners ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Partner {
                id: col_uuid(row, 0)?,
                name: row.get(1)?,
                code: row.get(2)?,
                partner_type: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// List all units.
    pub fn list_units(&self) -> Result<Vec<Unit>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, name, abbreviation FROM units ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Unit {
                id: col_uuid(row, 0)?,
                name: row.get(1)?,
                abbreviation: row.get(2)?,
            })
        })?;
        rows.collect()
    }

    /// Look up a partner by id.
    pub fn get_partner(&self, id: Uuid) -> Result<Option<Partner>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, name, code, type FROM partners WHERE id = ?1")?;
        let mut rows = stmt.query_map([id.to_string()], |row| {
            Ok(Partner {
                id: col_uuid(row, 0)?,
                name: row.get(1)?,
                code: row.get(2)?,
                partner_type: row.get(3)?,
            })
        })?;
        rows.next().transpose()
    }

    // =========================================================================
    // Snapshot reads
    // =========================================================================

    /// All pre-orders that are not tombstoned, oldest first.
    pub fn active_pre_orders(&self) -> Result<Vec<PreOrder>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PRE_ORDER_COLUMNS} FROM pre_orders
             WHERE deleted_at IS NULL ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([], row_to_pre_order)?;
        rows.collect()
    }

    /// Pre-orders due on a delivery date, excluding tombstones.
    pub fn pre_orders_for_delivery_date(
        &self,
        date: &str,
    ) -> Result<Vec<PreOrder>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PRE_ORDER_COLUMNS} FROM pre_orders
             WHERE delivery_date = ?1 AND deleted_at IS NULL ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([date], row_to_pre_order)?;
        rows.collect()
    }

    /// All flows that are not tombstoned.
    pub fn active_flows(&self) -> Result<Vec<PreOrderFlow>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FLOW_COLUMNS} FROM pre_order_flows
             WHERE deleted_at IS NULL ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([], row_to_flow)?;
        rows.collect()
    }

    /// Flows attached to one pre-order.
    pub fn flows_for_pre_order(
        &self,
        pre_order_id: Uuid,
    ) -> Result<Vec<PreOrderFlow>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FLOW_COLUMNS} FROM pre_order_flows
             WHERE pre_order_id = ?1 AND deleted_at IS NULL ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([pre_order_id.to_string()], row_to_flow)?;
        rows.collect()
    }
}

pub(crate) const PRE_ORDER_COLUMNS: &str = "id, partner_id, status, order_date, delivery_date, \
     comment, created_at, updated_at, version, deleted_at";

pub(crate) const FLOW_COLUMNS: &str = "id, pre_order_id, product_id, quantity, price, unit_id, \
     comment, created_at, updated_at, version, deleted_at";

pub(crate) fn row_to_pre_order(row: &Row<'_>) -> rusqlite::Result<PreOrder> {
    Ok(PreOrder {
        id: col_uuid(row, 0)?,
        partner_id: col_uuid(row, 1)?,
        status: row.get(2)?,
        order_date: row.get(3)?,
        delivery_date: row.get(4)?,
        comment: row.get(5)?,
        created_at: col_ts(row, 6)?,
        updated_at: col_ts(row, 7)?,
        version: row.get(8)?,
        deleted_at: col_opt_ts(row, 9)?,
    })
}

pub(crate) fn row_to_flow(row: &Row<'_>) -> rusqlite::Result<PreOrderFlow> {
    Ok(PreOrderFlow {
        id: col_uuid(row, 0)?,
        pre_order_id: col_uuid(row, 1)?,
        product_id: col_uuid(row, 2)?,
        quantity: row.get(3)?,
        price: row.get(4)?,
        unit_id: col_uuid(row, 5)?,
        comment: row.get(6)?,
        created_at: col_ts(row, 7)?,
        updated_at: col_ts(row, 8)?,
        version: row.get(9)?,
        deleted_at: col_opt_ts(row, 10)?,
    })
}

/// Read a TEXT column as a UUID.
pub(crate) fn col_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a TEXT column as a UTC timestamp.
pub(crate) fn col_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable TEXT column as a UTC timestamp.
pub(crate) fn col_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}
