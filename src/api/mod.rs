pub mod catalog;
pub mod health;
pub mod pre_orders;
pub mod sync;

use crate::AppState;
use axum::Router;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(catalog::router())
        .nest("/pre-orders", pre_orders::router())
        .nest("/sync", sync::router())
}
