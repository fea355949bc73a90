//! Postgres persistence for stored image records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Insert payload for [`insert_image`].
pub struct NewImage<'a> {
    pub device_id: &'a str,
    pub image_id: &'a str,
    pub storage_ref: &'a str,
    pub size_bytes: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ImageRecord {
    pub id: Uuid,
    pub device_id: String,
    pub image_id: String,
    pub storage_ref: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_image(db: &sqlx::PgPool, image: &NewImage<'_>) -> Result<Uuid, sqlx::Error> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"INSERT INTO stored_images (id, device_id, image_id, storage_ref, size_bytes, created_at)
           VALUES ($1, $2, $3, $4, $5, NOW())
           RETURNING id"#,
    )
    .bind(Uuid::new_v4())
    .bind(image.device_id)
    .bind(image.image_id)
    .bind(image.storage_ref)
    .bind(image.size_bytes)
    .fetch_one(db)
    .await?;
    Ok(id)
}

/// Newest first.
pub async fn list_images(
    db: &sqlx::PgPool,
    device_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ImageRecord>, sqlx::Error> {
    if let Some(device_id) = device_id {
        sqlx::query_as(
            r#"SELECT id, device_id, image_id, storage_ref, size_bytes, created_at
               FROM stored_images
               WHERE device_id = $1
               ORDER BY created_at DESC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(device_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
    } else {
        sqlx::query_as(
            r#"SELECT id, device_id, image_id, storage_ref, size_bytes, created_at
               FROM stored_images
               ORDER BY created_at DESC
               LIMIT $1 OFFSET $2"#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
    }
}

pub async fn get_image(db: &sqlx::PgPool, id: Uuid) -> Result<Option<ImageRecord>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT id, device_id, image_id, storage_ref, size_bytes, created_at
           FROM stored_images
           WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
}
