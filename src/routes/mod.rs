//! HTTP surface: cart lifecycle, promotions, checkout and order admin.

mod cart;
mod checkout;
mod promo;

use axum::routing::get;
use axum::{Json, Router};

use crate::error::{Error, Result};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(cart::router())
        .merge(promo::router())
        .merge(checkout::router())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "storefront-backend" }))
}

/// Presence check for request fields that must produce a 400 with a
/// message rather than a body-deserialization rejection.
pub(crate) fn require<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| Error::Validation(format!("Missing required field: {name}")))
}
