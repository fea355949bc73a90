//! Transfers API: in-flight sessions, engine counters and dead letters.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::transfer::dead_letter::DeadLetterInfo;
use crate::transfer::engine::StatsSnapshot;
use crate::transfer::registry::SessionSnapshot;
use crate::transfer::TransferKey;
use crate::AppState;
use dc_common::{AppError, AppResult};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_transfers))
        .route("/dead-letters", get(list_dead_letters))
        .route("/{device_id}/{image_id}", get(get_transfer))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct TransfersResponse {
    in_flight: usize,
    dead_letters: usize,
    stats: StatsSnapshot,
    sessions: Vec<SessionSnapshot>,
}

async fn list_transfers(State(state): State<Arc<AppState>>) -> Json<TransfersResponse> {
    let sessions = state.registry.snapshot();
    Json(TransfersResponse {
        in_flight: sessions.len(),
        dead_letters: state.engine.dead_letters().len(),
        stats: state.engine.stats(),
        sessions,
    })
}

async fn list_dead_letters(State(state): State<Arc<AppState>>) -> Json<Vec<DeadLetterInfo>> {
    Json(state.engine.dead_letters().snapshot())
}

async fn get_transfer(
    State(state): State<Arc<AppState>>,
    Path((device_id, image_id)): Path<(String, String)>,
) -> AppResult<Json<SessionSnapshot>> {
    let key = TransferKey::new(device_id, image_id);
    state
        .registry
        .get(&key)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("transfer {}", key)))
}
