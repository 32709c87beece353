//! Read-only pre-order reporting views.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Partner, PreOrder, PreOrderFlow};
use crate::AppState;

/// A pre-order with its flows embedded.
#[derive(Debug, Serialize)]
pub struct PreOrderWithFlows {
    #[serde(flatten)]
    pub pre_order: PreOrder,
    pub flows: Vec<PreOrderFlow>,
}

/// Pre-orders for one delivery date, grouped by partner.
#[derive(Debug, Serialize)]
pub struct RecapPartnerGroup {
    pub partner: Partner,
    pub pre_orders: Vec<PreOrderWithFlows>,
}

/// Daily recap: everything due on `date`, grouped by partner in
/// first-seen order.
async fn get_recap(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<Vec<RecapPartnerGroup>>> {
    let pre_orders = state.store.pre_orders_for_delivery_date(&date)?;

    let mut groups: Vec<RecapPartnerGroup> = Vec::new();
    let mut index_by_partner: HashMap<Uuid, usize> = HashMap::new();

    for pre_order in pre_orders {
        let flows = state.store.flows_for_pre_order(pre_order.id)?;
        let entry = PreOrderWithFlows { pre_order, flows };

        let partner_id = entry.pre_order.partner_id;
        if let Some(&idx) = index_by_partner.get(&partner_id) {
            groups[idx].pre_orders.push(entry);
            continue;
        }

        let Some(partner) = state.store.get_partner(partner_id)? else {
            warn!(%partner_id, "pre-order references unknown partner, skipping in recap");
            continue;
        };
        index_by_partner.insert(partner_id, groups.len());
        groups.push(RecapPartnerGroup {
            partner,
            pre_orders: vec![entry],
        });
    }

    Ok(Json(groups))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/recap/:date", get(get_recap))
}
