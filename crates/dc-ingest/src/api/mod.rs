//! API routes module.

mod health;
mod images;
mod transfers;

use crate::AppState;
use axum::Router;
use std::sync::Arc;

/// Build the API router with all sub-routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/transfers", transfers::router(state.clone()))
        .nest("/images", images::router(state))
        .merge(health::router())
}
