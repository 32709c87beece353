//! Sync endpoints: push, pull, snapshot, and the event stream.

use axum::{
    extract::{Query, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::services::{EventBroadcaster, OperationLog};
use crate::types::{
    ChangeEvent, Partner, PreOrder, PreOrderFlow, Product, PullResponse, PushRequest, PushResponse,
    Unit,
};
use crate::AppState;

/// Create the sync router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/push", post(push_operations))
        .route("/pull", get(pull_operations))
        .route("/snapshot", get(get_snapshot))
        .route("/events", get(stream_events))
}

/// Apply a batch of client operations.
///
/// Always responds 200; per-operation success, conflict, and error live
/// in the results. Change events go out only after the batch has
/// committed.
async fn push_operations(
    State(state): State<AppState>,
    Json(body): Json<PushRequest>,
) -> Result<Json<PushResponse>> {
    let (results, events) = {
        let mut conn = state.store.connection().lock().unwrap();
        state
            .push_service
            .process_operations(&mut conn, &body.operations)?
    };

    for event in &events {
        state.broadcaster.broadcast(event, None);
    }

    Ok(Json(PushResponse { results }))
}

#[derive(Debug, Deserialize)]
struct PullQuery {
    #[serde(default)]
    since_sync_id: i64,
    #[serde(default = "default_pull_limit")]
    limit: usize,
}

fn default_pull_limit() -> usize {
    100
}

/// Incremental operations above the client's cursor.
async fn pull_operations(
    State(state): State<AppState>,
    Query(query): Query<PullQuery>,
) -> Result<Json<PullResponse>> {
    let (operations, has_more) = {
        let conn = state.store.connection().lock().unwrap();
        OperationLog::read_since(&conn, query.since_sync_id, query.limit)?
    };

    Ok(Json(PullResponse {
        operations,
        has_more,
    }))
}

/// Full dump for first sync: reference data plus live entities.
#[derive(Debug, Serialize)]
struct SnapshotResponse {
    partners: Vec<Partner>,
    products: Vec<Product>,
    units: Vec<Unit>,
    pre_orders: Vec<PreOrder>,
    flows: Vec<PreOrderFlow>,
}

async fn get_snapshot(State(state): State<AppState>) -> Result<Json<SnapshotResponse>> {
    Ok(Json(SnapshotResponse {
        partners: state.store.list_partners()?,
        products: state.store.list_products()?,
        units: state.store.list_units()?,
        pre_orders: state.store.active_pre_orders()?,
        flows: state.store.active_flows()?,
    }))
}

/// Broadcaster subscription that unregisters itself when the stream is
/// dropped, whether the client went away or the broadcaster evicted us.
struct Subscription {
    broadcaster: Arc<EventBroadcaster>,
    client_id: Uuid,
    rx: mpsc::Receiver<ChangeEvent>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.disconnect(self.client_id);
    }
}

/// Server-sent change notifications. Clients treat each event as a
/// nudge and re-pull from their cursor for authoritative data.
async fn stream_events(State(state): State<AppState>) -> impl IntoResponse {
    let (client_id, rx) = state.broadcaster.connect();
    debug!(%client_id, "event stream opened");

    let subscription = Subscription {
        broadcaster: state.broadcaster.clone(),
        client_id,
        rx,
    };

    let event_stream = stream::unfold(subscription, |mut sub| async move {
        let event = sub.rx.recv().await?;
        let payload = serde_json::to_string(&event).ok()?;
        Some((Ok::<_, Infallible>(Event::default().data(payload)), sub))
    });

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(event_stream).keep_alive(KeepAlive::default()),
    )
}
