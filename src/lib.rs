//! Quayside - sync backend for an offline-first pre-order app.
//!
//! Clients edit locally and push batches of CREATE/UPDATE/DELETE
//! operations; the server merges them at field granularity, appends
//! every accepted mutation to a totally ordered operation log, and fans
//! out change notifications over server-sent events. Late or
//! disconnected clients catch up by pulling the log from their cursor.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;

use config::Config;
use services::{EventBroadcaster, SqliteStore, SyncPushService};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub push_service: Arc<SyncPushService>,
    pub broadcaster: Arc<EventBroadcaster>,
}

impl AppState {
    /// Wire up state over an already-opened store.
    pub fn new(config: Config, store: Arc<SqliteStore>) -> Self {
        let broadcaster = EventBroadcaster::new(config.event_queue_capacity);
        Self {
            config: Arc::new(config),
            store,
            push_service: Arc::new(SyncPushService::new()),
            broadcaster,
        }
    }
}
