//! S3 / MinIO object storage service.
//!
//! Client setup, bucket provisioning, image upload and pre-signed
//! download URLs.

use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;
use std::time::Duration;

/// Initialize an S3 client against `endpoint` (works with MinIO).
pub fn init_client(
    s3_config: &dc_common::config::S3Config,
    endpoint: &str,
    provider_name: &'static str,
) -> Client {
    let creds = Credentials::new(
        &s3_config.access_key,
        &s3_config.secret_key,
        None,
        None,
        provider_name,
    );

    let config = aws_sdk_s3::Config::builder()
        .behavior_version_latest()
        .endpoint_url(endpoint)
        .region(Region::new(s3_config.region.clone()))
        .credentials_provider(creds)
        .force_path_style(true) // Required for MinIO
        .build();

    Client::from_conf(config)
}

/// Ensure a bucket exists, creating it if necessary.
pub async fn ensure_bucket(client: &Client, bucket: &str) -> anyhow::Result<()> {
    match client.head_bucket().bucket(bucket).send().await {
        Ok(_) => {
            tracing::info!(bucket, "S3 bucket already exists");
        }
        Err(_) => {
            client
                .create_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create bucket '{}': {}", bucket, e))?;
            tracing::info!(bucket, "S3 bucket created");
        }
    }
    Ok(())
}

/// Upload an object, replacing any existing object under `key`.
pub async fn put_object(
    client: &Client,
    bucket: &str,
    key: &str,
    body: Bytes,
    content_type: &str,
) -> anyhow::Result<()> {
    let size = body.len();
    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type(content_type)
        .body(ByteStream::from(body))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Put object error: {}", e))?;
    tracing::debug!(bucket, key, size, "S3 object uploaded");
    Ok(())
}

/// Generate a pre-signed URL for downloading (GET) an object.
/// Pass the public-endpoint client for URLs handed to browsers.
pub async fn presigned_download_url(
    client: &Client,
    bucket: &str,
    key: &str,
    ttl_secs: u64,
) -> anyhow::Result<String> {
    let presigning = PresigningConfig::expires_in(Duration::from_secs(ttl_secs))
        .map_err(|e| anyhow::anyhow!("Presigning config error: {}", e))?;

    let resp = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .presigned(presigning)
        .await
        .map_err(|e| anyhow::anyhow!("Presigned GET error: {}", e))?;

    Ok(resp.uri().to_string())
}
