//! Images API: stored image records and time-limited download links.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::{s3, storage};
use crate::AppState;
use dc_common::{AppError, AppResult};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_images))
        .route("/{id}/url", get(get_image_url))
        .with_state(state)
}

// ─── Types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ImageQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
    device_id: Option<String>,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
struct ImageUrlResponse {
    id: Uuid,
    url: String,
    expires_in_secs: u64,
}

// ─── Handlers ────────────────────────────────────────────────

async fn list_images(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ImageQuery>,
) -> AppResult<Json<Vec<storage::ImageRecord>>> {
    if q.offset < 0 {
        return Err(AppError::BadRequest("offset must not be negative".into()));
    }
    let limit = q.limit.clamp(1, 200);

    let images = storage::list_images(&state.db, q.device_id.as_deref(), limit, q.offset).await?;
    Ok(Json(images))
}

async fn get_image_url(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ImageUrlResponse>> {
    let image = storage::get_image(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("image {}", id)))?;

    let ttl = state.config.s3.url_ttl_secs;
    let url = s3::presigned_download_url(
        &state.s3_public,
        &state.config.s3.bucket,
        &image.storage_ref,
        ttl,
    )
    .await?;

    Ok(Json(ImageUrlResponse {
        id,
        url,
        expires_in_secs: ttl,
    }))
}
