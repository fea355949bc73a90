//! Handoff of reassembled images to object storage + Postgres.

use std::future::Future;

use aws_sdk_s3::Client;
use serde::Serialize;

use crate::services::{s3, storage};
use crate::transfer::registry::ReassembledImage;

/// Locator of a stored image (the S3 object key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PublicRef(pub String);

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("persisting image record failed: {0}")]
    Persist(#[from] sqlx::Error),
}

/// Destination for completed transfers.
///
/// Called outside any registry lock; implementations may take as long
/// as they need.
pub trait Handoff: Send + Sync + 'static {
    fn upload_and_record(
        &self,
        image: &ReassembledImage,
    ) -> impl Future<Output = Result<PublicRef, HandoffError>> + Send;
}

/// Uploads to S3/MinIO, then records `{device_id, storage_ref, created_at}`.
#[derive(Clone)]
pub struct StorageHandoff {
    pub s3: Client,
    pub db: sqlx::PgPool,
    pub bucket: String,
    pub folder: String,
}

impl Handoff for StorageHandoff {
    async fn upload_and_record(&self, image: &ReassembledImage) -> Result<PublicRef, HandoffError> {
        let key = object_key(&self.folder, &image.key.device_id, &image.key.image_id);

        s3::put_object(&self.s3, &self.bucket, &key, image.bytes.clone(), "image/jpeg")
            .await
            .map_err(|e| HandoffError::Upload(e.to_string()))?;

        let id = storage::insert_image(
            &self.db,
            &storage::NewImage {
                device_id: &image.key.device_id,
                image_id: &image.key.image_id,
                storage_ref: &key,
                size_bytes: image.bytes.len() as i64,
            },
        )
        .await?;

        tracing::info!(
            %id,
            device_id = %image.key.device_id,
            image_id = %image.key.image_id,
            storage_ref = %key,
            "Image stored"
        );
        Ok(PublicRef(key))
    }
}

/// Deterministic per-transfer key, so a retried upload overwrites
/// rather than duplicates.
pub fn object_key(folder: &str, device_id: &str, image_id: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        format!("{}/{}.jpg", device_id, image_id)
    } else {
        format!("{}/{}/{}.jpg", folder, device_id, image_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key() {
        assert_eq!(
            object_key("doorbell_images", "d1", "i1"),
            "doorbell_images/d1/i1.jpg"
        );
        assert_eq!(object_key("/nested/dir/", "d1", "i1"), "nested/dir/d1/i1.jpg");
        assert_eq!(object_key("", "d1", "i1"), "d1/i1.jpg");
    }
}
