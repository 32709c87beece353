//! Batch push pipeline.
//!
//! A batch runs inside one outer transaction; every operation gets its
//! own savepoint so an individual failure never takes down the rest of
//! the batch. Change events are queued while the batch runs and handed
//! back to the caller, who broadcasts them only once the outer commit
//! has succeeded.

use crate::error::Result;
use crate::services::entity_sync::EntitySyncService;
use crate::services::flow_store::FlowStore;
use crate::services::pre_order_store::PreOrderStore;
use crate::types::{
    ChangeEvent, EntityType, PushOperationRequest, PushOperationResult, PushResultStatus,
};
use rusqlite::{Connection, Transaction};
use tracing::{debug, error};

/// Dispatches push operations to the per-kind sync handlers.
pub struct SyncPushService {
    pre_orders: EntitySyncService<PreOrderStore>,
    flows: EntitySyncService<FlowStore>,
}

impl Default for SyncPushService {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncPushService {
    pub fn new() -> Self {
        Self {
            pre_orders: EntitySyncService::new(PreOrderStore),
            flows: EntitySyncService::new(FlowStore),
        }
    }

    /// Process a batch of operations, each in its own savepoint.
    ///
    /// Returns per-operation results in submission order plus the change
    /// events for every committed savepoint. The events must not be
    /// broadcast until after this function returns successfully, since
    /// the outer commit happens here last.
    pub fn process_operations(
        &self,
        conn: &mut Connection,
        operations: &[PushOperationRequest],
    ) -> Result<(Vec<PushOperationResult>, Vec<ChangeEvent>)> {
        let mut tx = conn.transaction()?;
        let mut results = Vec::with_capacity(operations.len());
        let mut pending_events = Vec::new();

        for op in operations {
            match self.apply_one(&mut tx, op) {
                Ok(result) => {
                    if result.status == PushResultStatus::Success {
                        // Idempotent no-ops carry no sync_id and emit no event.
                        if let Some(sync_id) = result.sync_id {
                            pending_events.push(ChangeEvent::entity_changed(
                                op.entity_type,
                                op.entity_id,
                                sync_id,
                            ));
                        }
                    }
                    results.push(result);
                }
                Err(e) => {
                    error!(operation_id = %op.id, "error processing operation: {e}");
                    results.push(PushOperationResult::error(&op.id, e.to_string()));
                }
            }
        }

        tx.commit()?;
        debug!(
            operations = operations.len(),
            events = pending_events.len(),
            "push batch committed"
        );
        Ok((results, pending_events))
    }

    /// Run one operation inside a savepoint: commit it on success, roll
    /// it back on conflict, error, or handler failure.
    fn apply_one(
        &self,
        tx: &mut Transaction<'_>,
        op: &PushOperationRequest,
    ) -> Result<PushOperationResult> {
        let mut sp = tx.savepoint()?;

        match self.dispatch(&sp, op) {
            Ok(result) => {
                if result.status == PushResultStatus::Success {
                    sp.commit()?;
                } else {
                    // The client's failed intent leaves the server
                    // untouched; conflict details still go back.
                    sp.rollback()?;
                }
                Ok(result)
            }
            Err(e) => {
                sp.rollback()?;
                Err(e)
            }
        }
    }

    fn dispatch(&self, conn: &Connection, op: &PushOperationRequest) -> Result<PushOperationResult> {
        match op.entity_type {
            EntityType::PreOrder => self.pre_orders.handle(conn, op),
            EntityType::PreOrderFlow => self.flows.handle(conn, op),
        }
    }
}
