//! Startup seeding of the reference catalog and demo pre-orders.
//!
//! Ids are UUIDv5 digests of the names, so repeated seeding and multiple
//! environments agree on the same catalog.

use crate::error::Result;
use crate::services::SqliteStore;
use crate::types::to_iso;
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::info;
use uuid::Uuid;

fn name_id(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes())
}

const PRODUCTS: &[(&str, &str, &str, &str)] = &[
    ("Atlantic Salmon", "Salmon", "SAL001", "PSAL"),
    ("Wild Sea Bass", "Sea Bass", "BAS001", "PBAS"),
    ("Royal Sea Bream", "Bream", "BRE001", "PBRE"),
    ("Bluefin Tuna", "Tuna", "TUN001", "PTUN"),
    ("Atlantic Cod", "Cod", "COD001", "PCOD"),
    ("Pink Shrimp", "Shrimp", "SHR001", "PSHR"),
    ("Special Oysters", "Oysters", "OYS001", "POYS"),
    ("Dover Sole", "Sole", "SOL001", "PSOL"),
    ("Turbot", "Turbot", "TUR001", "PTUR"),
    ("Blue Lobster", "Lobster", "LOB001", "PLOB"),
];

const PARTNERS: &[(&str, &str, i64)] = &[
    ("The Sailor Restaurant", "SAIL", 1),
    ("Dupont Fish Market", "DUPO", 1),
    ("Atlantic Hotel", "ATLA", 1),
    ("Breton Fisheries", "BRET", 2),
    ("Northern Wholesaler", "NORT", 2),
    ("Lorient Auction", "LORI", 2),
];

const UNITS: &[(&str, &str)] = &[
    ("Kilogram", "kg"),
    ("Piece", "pce"),
    ("Crate", "crt"),
    ("Tray", "try"),
];

// (pre-order name, partner, status), then its flows as
// (flow name, product, quantity, price, unit).
const DEMO_PRE_ORDERS: &[(&str, &str, i64)] = &[
    ("PreOrder-1", "The Sailor Restaurant", 0),
    ("PreOrder-2", "Dupont Fish Market", 1),
    ("PreOrder-3", "Atlantic Hotel", 0),
];

const DEMO_FLOWS: &[(&str, &str, &str, f64, f64, &str)] = &[
    ("Flow-1A", "PreOrder-1", "Atlantic Salmon", 5.0, 12.50, "Kilogram"),
    ("Flow-1B", "PreOrder-1", "Wild Sea Bass", 3.0, 18.00, "Kilogram"),
    ("Flow-1C", "PreOrder-1", "Pink Shrimp", 2.0, 22.00, "Kilogram"),
    ("Flow-2A", "PreOrder-2", "Bluefin Tuna", 10.0, 35.00, "Kilogram"),
    ("Flow-2B", "PreOrder-2", "Atlantic Cod", 8.0, 8.50, "Piece"),
    ("Flow-3A", "PreOrder-3", "Blue Lobster", 4.0, 45.00, "Piece"),
    ("Flow-3B", "PreOrder-3", "Special Oysters", 2.0, 38.00, "Crate"),
];

/// Seed the database if it is empty. Reference data always goes in;
/// demo pre-orders only when `with_demo_data` is set.
pub fn seed_database(store: &SqliteStore, with_demo_data: bool) -> Result<()> {
    let conn = store.connection().lock().unwrap();

    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
    if existing > 0 {
        return Ok(());
    }

    seed_catalog(&conn)?;
    if with_demo_data {
        seed_demo_orders(&conn)?;
    }
    info!(with_demo_data, "database seeded");
    Ok(())
}

fn seed_catalog(conn: &Connection) -> Result<()> {
    for (name, short_name, sku, code) in PRODUCTS {
        conn.execute(
            "INSERT INTO products (id, name, short_name, sku, code) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name_id(name).to_string(), name, short_name, sku, code],
        )?;
    }

    for (name, code, partner_type) in PARTNERS {
        conn.execute(
            "INSERT INTO partners (id, name, code, type) VALUES (?1, ?2, ?3, ?4)",
            params![name_id(name).to_string(), name, code, partner_type],
        )?;
    }

    for (name, abbreviation) in UNITS {
        conn.execute(
            "INSERT INTO units (id, name, abbreviation) VALUES (?1, ?2, ?3)",
            params![name_id(name).to_string(), name, abbreviation],
        )?;
    }

    Ok(())
}

fn seed_demo_orders(conn: &Connection) -> Result<()> {
    let now = Utc::now();
    let today = now.date_naive().to_string();

    for (name, partner, status) in DEMO_PRE_ORDERS {
        conn.execute(
            "INSERT INTO pre_orders
                (id, partner_id, status, order_date, delivery_date,
                 created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?5, 1)",
            params![
                name_id(name).to_string(),
                name_id(partner).to_string(),
                status,
                today,
                to_iso(now),
            ],
        )?;
    }

    for (name, pre_order, product, quantity, price, unit) in DEMO_FLOWS {
        conn.execute(
            "INSERT INTO pre_order_flows
                (id, pre_order_id, product_id, quantity, price, unit_id,
                 created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 1)",
            params![
                name_id(name).to_string(),
                name_id(pre_order).to_string(),
                name_id(product).to_string(),
                quantity,
                price,
                name_id(unit).to_string(),
                to_iso(now),
            ],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_populates_catalog() {
        let store = SqliteStore::new_in_memory().unwrap();
        seed_database(&store, false).unwrap();

        assert_eq!(store.list_products().unwrap().len(), 10);
        assert_eq!(store.list_partners().unwrap().len(), 6);
        assert_eq!(store.list_units().unwrap().len(), 4);
        assert!(store.active_pre_orders().unwrap().is_empty());
    }

    #[test]
    fn test_seed_with_demo_data() {
        let store = SqliteStore::new_in_memory().unwrap();
        seed_database(&store, true).unwrap();

        assert_eq!(store.active_pre_orders().unwrap().len(), 3);
        assert_eq!(store.active_flows().unwrap().len(), 7);
    }

    #[test]
    fn test_seed_is_idempotent() {
        let store = SqliteStore::new_in_memory().unwrap();
        seed_database(&store, true).unwrap();
        seed_database(&store, true).unwrap();

        assert_eq!(store.list_products().unwrap().len(), 10);
        assert_eq!(store.active_pre_orders().unwrap().len(), 3);
    }

    #[test]
    fn test_ids_are_deterministic() {
        assert_eq!(name_id("Atlantic Salmon"), name_id("Atlantic Salmon"));
        assert_ne!(name_id("Atlantic Salmon"), name_id("Bluefin Tuna"));
    }
}
