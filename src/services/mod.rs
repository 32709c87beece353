pub mod conflict_resolver;
pub mod entity_store;
pub mod entity_sync;
pub mod event_broadcaster;
pub mod flow_store;
pub mod operation_log;
pub mod pre_order_store;
pub mod seed;
pub mod sqlite_store;
pub mod sync_push;

pub use conflict_resolver::{parse_timestamp, resolve_update, ConflictResolution};
pub use entity_store::EntityStore;
pub use entity_sync::EntitySyncService;
pub use event_broadcaster::EventBroadcaster;
pub use flow_store::FlowStore;
pub use operation_log::OperationLog;
pub use pre_order_store::PreOrderStore;
pub use seed::seed_database;
pub use sqlite_store::SqliteStore;
pub use sync_push::SyncPushService;
