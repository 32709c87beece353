//! Generic CREATE/UPDATE/DELETE sync handler, parameterized by an
//! [`EntityStore`] kind descriptor.
//!
//! One instance per entity kind; the push pipeline dispatches each
//! operation to the right instance. Handlers never manage transactions:
//! they run on whatever savepoint the pipeline hands them.

use crate::error::{AppError, Result};
use crate::services::conflict_resolver::{parse_timestamp, resolve_update};
use crate::services::entity_store::EntityStore;
use crate::services::operation_log::OperationLog;
use crate::types::{
    OperationType, PushOperationRequest, PushOperationResult, PushResultStatus,
    ResolvedFieldConflict,
};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

/// Sync handler for one entity kind.
pub struct EntitySyncService<S: EntityStore> {
    store: S,
}

impl<S: EntityStore> EntitySyncService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Dispatch one push operation. `Err` means a storage-level failure
    /// the pipeline turns into an `error` result and a rolled-back
    /// savepoint; domain outcomes (conflict, validation, no-op) are
    /// encoded in the returned result.
    pub fn handle(&self, conn: &Connection, op: &PushOperationRequest) -> Result<PushOperationResult> {
        match op.operation_type {
            OperationType::Create => self.create(conn, op),
            OperationType::Update => self.update(conn, op),
            OperationType::Delete => self.delete(conn, op),
        }
    }

    fn create(&self, conn: &Connection, op: &PushOperationRequest) -> Result<PushOperationResult> {
        let name = self.store.entity_type().display_name();

        // Idempotency: a row under this id, tombstoned or not, means the
        // CREATE already happened. No new log entry.
        if let Some(existing) = self.store.get(conn, op.entity_id)? {
            return Ok(PushOperationResult {
                operation_id: op.id.clone(),
                status: PushResultStatus::Success,
                sync_id: None,
                new_version: Some(self.store.version(&existing)),
                message: Some(format!("{name} {} already exists, no-op", op.entity_id)),
                conflicts: None,
            });
        }

        let entity = match self.store.create(conn, op.entity_id, &op.data) {
            Ok(entity) => entity,
            Err(AppError::BadRequest(msg)) => {
                return Ok(PushOperationResult::error(
                    &op.id,
                    format!("Validation error: {msg}"),
                ));
            }
            Err(e) => return Err(e),
        };

        let log_entry = OperationLog::record(
            conn,
            self.store.entity_type(),
            op.entity_id,
            OperationType::Create,
            self.store.snapshot(&entity),
        )?;
        debug!(
            entity_type = name,
            entity_id = %op.entity_id,
            sync_id = log_entry.sync_id,
            "created entity"
        );

        Ok(PushOperationResult {
            operation_id: op.id.clone(),
            status: PushResultStatus::Success,
            sync_id: Some(log_entry.sync_id),
            new_version: Some(1),
            message: None,
            conflicts: None,
        })
    }

    fn update(&self, conn: &Connection, op: &PushOperationRequest) -> Result<PushOperationResult> {
        let name = self.store.entity_type().display_name();

        let Some(entity) = self.store.get(conn, op.entity_id)? else {
            return Ok(PushOperationResult::error(
                &op.id,
                format!("{name} {} not found", op.entity_id),
            ));
        };

        // DELETE wins over UPDATE: a tombstone absorbs late edits.
        if self.store.deleted_at(&entity).is_some() {
            return Ok(PushOperationResult {
                operation_id: op.id.clone(),
                status: PushResultStatus::Success,
                sync_id: None,
                new_version: Some(self.store.version(&entity)),
                message: Some(format!("{name} {} already deleted, no-op", op.entity_id)),
                conflicts: None,
            });
        }

        let server_version = self.store.version(&entity);

        // Per-field history is only needed when versions diverge.
        let server_changed_fields = match op.expected_version {
            Some(expected) if expected != server_version => OperationLog::server_changed_fields(
                conn,
                self.store.entity_type(),
                op.entity_id,
                expected,
            )?,
            _ => HashMap::new(),
        };

        let resolution = resolve_update(
            &self.store.snapshot(&entity),
            &op.data,
            op.expected_version,
            server_version,
            &op.timestamp,
            &server_changed_fields,
        )
        .map_err(|e| AppError::BadRequest(format!("invalid timestamp '{}': {e}", op.timestamp)))?;

        let conflicts: Option<Vec<ResolvedFieldConflict>> = if resolution.lww_resolved.is_empty() {
            None
        } else {
            Some(resolution.lww_resolved.clone())
        };

        if resolution.fields_to_apply.is_empty() {
            let (status, message) = if conflicts.is_some() {
                (
                    PushResultStatus::Conflict,
                    "All fields overridden by server",
                )
            } else {
                (PushResultStatus::Success, "No changes to apply, no-op")
            };
            return Ok(PushOperationResult {
                operation_id: op.id.clone(),
                status,
                sync_id: None,
                new_version: Some(server_version),
                message: Some(message.to_string()),
                conflicts,
            });
        }

        let entity = self
            .store
            .apply_update(conn, entity, &resolution.fields_to_apply)?;
        let new_version = self.store.version(&entity);

        let mut log_data = resolution.fields_to_apply.clone();
        log_data.insert("version".to_string(), json!(new_version));
        let log_entry = OperationLog::record(
            conn,
            self.store.entity_type(),
            op.entity_id,
            OperationType::Update,
            log_data,
        )?;
        debug!(
            entity_type = name,
            entity_id = %op.entity_id,
            sync_id = log_entry.sync_id,
            new_version,
            auto_merged = resolution.auto_merged.len(),
            lww = resolution.lww_resolved.len(),
            "updated entity"
        );

        // The merge succeeded, so the status stays success even when the
        // client only won some fields; the conflict list is informational.
        Ok(PushOperationResult {
            operation_id: op.id.clone(),
            status: PushResultStatus::Success,
            sync_id: Some(log_entry.sync_id),
            new_version: Some(new_version),
            message: None,
            conflicts,
        })
    }

    fn delete(&self, conn: &Connection, op: &PushOperationRequest) -> Result<PushOperationResult> {
        let name = self.store.entity_type().display_name();

        let Some(entity) = self.store.get(conn, op.entity_id)? else {
            return Ok(PushOperationResult::error(
                &op.id,
                format!("{name} {} not found", op.entity_id),
            ));
        };

        if self.store.deleted_at(&entity).is_some() {
            return Ok(PushOperationResult {
                operation_id: op.id.clone(),
                status: PushResultStatus::Success,
                sync_id: None,
                new_version: Some(self.store.version(&entity)),
                message: Some(format!("{name} {} already deleted, no-op", op.entity_id)),
                conflicts: None,
            });
        }

        let server_version = self.store.version(&entity);

        // Version mismatch: the delete only goes through if it is newer
        // than the server's last edit.
        if let Some(expected) = op.expected_version {
            if expected != server_version {
                let client_ts = parse_timestamp(&op.timestamp).map_err(|e| {
                    AppError::BadRequest(format!("invalid timestamp '{}': {e}", op.timestamp))
                })?;
                if client_ts < self.store.updated_at(&entity) {
                    return Ok(PushOperationResult {
                        operation_id: op.id.clone(),
                        status: PushResultStatus::Conflict,
                        sync_id: None,
                        new_version: Some(server_version),
                        message: Some(format!(
                            "Delete rejected: entity was updated on server (version \
                             {server_version}) after client delete request (expected version \
                             {expected})"
                        )),
                        conflicts: None,
                    });
                }
            }
        }

        let entity = self.store.soft_delete(conn, entity)?;
        let new_version = self.store.version(&entity);

        let log_entry = OperationLog::record(
            conn,
            self.store.entity_type(),
            op.entity_id,
            OperationType::Delete,
            self.store.snapshot(&entity),
        )?;
        debug!(
            entity_type = name,
            entity_id = %op.entity_id,
            sync_id = log_entry.sync_id,
            "tombstoned entity"
        );

        Ok(PushOperationResult {
            operation_id: op.id.clone(),
            status: PushResultStatus::Success,
            sync_id: Some(log_entry.sync_id),
            new_version: Some(new_version),
            message: None,
            conflicts: None,
        })
    }
}
