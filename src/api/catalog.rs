//! Read-only reference data listings.

use axum::{extract::State, routing::get, Json, Router};

use crate::error::Result;
use crate::types::{Partner, Product, Unit};
use crate::AppState;

async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.store.list_products()?))
}

async fn list_partners(State(state): State<AppState>) -> Result<Json<Vec<Partner>>> {
    Ok(Json(state.store.list_partners()?))
}

async fn list_units(State(state): State<AppState>) -> Result<Json<Vec<Unit>>> {
    Ok(Json(state.store.list_units()?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/partners", get(list_partners))
        .route("/units", get(list_units))
}
