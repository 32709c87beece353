//! Field-level merge between client intent and server state.
//!
//! Pure and stateless: the sync handlers feed it a snapshot of the
//! current row, the client's proposed fields, and the per-field change
//! history from the operation log; it decides which fields to write.
//!
//! Rules:
//! - Version match (or no expected version) applies all client fields.
//! - Version mismatch triggers per-field analysis:
//!   - value identical on server: skip, no-op
//!   - field untouched on server since `expected_version`: auto-merge
//!   - both sides changed it: last-writer-wins on timestamps, ties to
//!     the client

use crate::types::{ConflictWinner, ResolvedFieldConflict};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Result of a field-level merge between client and server state.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolution {
    /// Subset of the client's fields that should be written.
    pub fields_to_apply: Map<String, Value>,
    pub had_version_mismatch: bool,
    /// Fields accepted because the server never touched them.
    pub auto_merged: Vec<String>,
    /// Fields where both sides wrote and LWW picked a winner.
    pub lww_resolved: Vec<ResolvedFieldConflict>,
}

/// Decide which of `client_data`'s fields to apply on top of
/// `server_state`.
///
/// `server_changed_fields` maps field names to the ISO timestamp of the
/// server's most recent change since the client's `expected_version`.
pub fn resolve_update(
    server_state: &Map<String, Value>,
    client_data: &Map<String, Value>,
    expected_version: Option<i64>,
    server_version: i64,
    client_timestamp: &str,
    server_changed_fields: &HashMap<String, String>,
) -> Result<ConflictResolution, chrono::ParseError> {
    // No version check requested or versions match: apply directly.
    if expected_version.is_none() || expected_version == Some(server_version) {
        return Ok(ConflictResolution {
            fields_to_apply: client_data.clone(),
            ..Default::default()
        });
    }

    let client_ts = parse_timestamp(client_timestamp)?;

    let mut resolution = ConflictResolution {
        had_version_mismatch: true,
        ..Default::default()
    };

    for (field, client_value) in client_data {
        let server_value = server_state.get(field).unwrap_or(&Value::Null);

        if values_equal(client_value, server_value) {
            // Client wants the value the server already has.
            continue;
        }

        let Some(server_changed_at) = server_changed_fields.get(field) else {
            // Server never touched this field since expected_version.
            resolution
                .fields_to_apply
                .insert(field.clone(), client_value.clone());
            resolution.auto_merged.push(field.clone());
            continue;
        };

        // Both sides changed the field: LWW per field, ties to the client.
        let server_ts = parse_timestamp(server_changed_at)?;
        let winner = if client_ts >= server_ts {
            resolution
                .fields_to_apply
                .insert(field.clone(), client_value.clone());
            ConflictWinner::Client
        } else {
            ConflictWinner::Server
        };
        resolution.lww_resolved.push(ResolvedFieldConflict {
            field: field.clone(),
            client_value: client_value.clone(),
            server_value: server_value.clone(),
            winner,
        });
    }

    Ok(resolution)
}

/// Parse an ISO-8601 timestamp; values without an offset are read as UTC.
pub fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => ts.parse::<NaiveDateTime>().map(|naive| naive.and_utc()),
    }
}

/// Two values are equal iff their string renderings are identical. This
/// accepts a `Uuid` against its string form and `123` against `"123"`,
/// matching how log snapshots round-trip identifiers.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    render(a) == render(b)
}

fn render(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
