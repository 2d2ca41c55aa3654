use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod payments;
pub mod rent;
pub mod utility;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(payments::router())
        .merge(rent::router())
        .merge(utility::router())
}
