use serde::Deserialize;

/// Top-level application configuration.
/// Loaded from environment variables (`DC__SECTION__KEY`) and `.env`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// MQTT broker settings
    #[serde(default)]
    pub mqtt: MqttConfig,
    /// Database settings
    pub database: DatabaseConfig,
    /// S3 / MinIO settings
    #[serde(default)]
    pub s3: S3Config,
    /// In-flight transfer handling
    #[serde(default)]
    pub transfers: TransferConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP API port (default: 8080)
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Log level used when `RUST_LOG` is unset (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Broker host (default: localhost)
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    /// Broker port (default: 1883)
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Client id; a random `dc-ingest-<uuid>` is used when unset
    #[serde(default)]
    pub client_id: Option<String>,
    /// Topic namespace, the `<ns>` in `<ns>/meta`, `<ns>/chunk/...`, `<ns>/done/...`
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Subscription QoS: 0, 1 or 2 (default: 1)
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Largest accepted packet in bytes (default: 1 MiB)
    #[serde(default = "default_max_packet_bytes")]
    pub max_packet_bytes: usize,
    /// Pause between reconnect attempts after a poll error
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: None,
            namespace: default_namespace(),
            qos: default_qos(),
            keep_alive_secs: default_keep_alive(),
            username: None,
            password: None,
            max_packet_bytes: default_max_packet_bytes(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3-compatible endpoint URL (MinIO) used by the uploader
    #[serde(default = "default_s3_endpoint")]
    pub endpoint: String,
    /// Public endpoint for browser-facing pre-signed URLs.
    /// Defaults to `endpoint` if not set.
    #[serde(default)]
    pub public_endpoint: Option<String>,
    #[serde(default = "default_s3_bucket")]
    pub bucket: String,
    /// Key prefix under which reassembled images are stored
    #[serde(default = "default_s3_folder")]
    pub folder: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default = "default_s3_access_key")]
    pub access_key: String,
    #[serde(default = "default_s3_secret_key")]
    pub secret_key: String,
    /// Lifetime of pre-signed download URLs
    #[serde(default = "default_url_ttl")]
    pub url_ttl_secs: u64,
}

impl S3Config {
    /// Returns the public endpoint for browser-facing URLs,
    /// falling back to the internal endpoint if not configured.
    pub fn public_endpoint(&self) -> &str {
        self.public_endpoint.as_deref().unwrap_or(&self.endpoint)
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: default_s3_endpoint(),
            public_endpoint: None,
            bucket: default_s3_bucket(),
            folder: default_s3_folder(),
            region: default_s3_region(),
            access_key: default_s3_access_key(),
            secret_key: default_s3_secret_key(),
            url_ttl_secs: default_url_ttl(),
        }
    }
}

/// What happens to a reassembled image whose upload or persistence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffFailurePolicy {
    /// Log and lose the image.
    #[default]
    Drop,
    /// Park the image in the dead-letter queue for periodic retry.
    DeadLetter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Sessions untouched for this long are evicted (default: 300)
    #[serde(default = "default_max_idle")]
    pub max_idle_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// How long a completed key swallows late chunks (default: 60)
    #[serde(default = "default_tombstone")]
    pub tombstone_secs: u64,
    #[serde(default)]
    pub handoff_failure_policy: HandoffFailurePolicy,
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,
    #[serde(default = "default_dead_letter_retry")]
    pub dead_letter_retry_secs: u64,
    #[serde(default = "default_dead_letter_attempts")]
    pub dead_letter_max_attempts: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_idle_secs: default_max_idle(),
            sweep_interval_secs: default_sweep_interval(),
            tombstone_secs: default_tombstone(),
            handoff_failure_policy: HandoffFailurePolicy::default(),
            dead_letter_capacity: default_dead_letter_capacity(),
            dead_letter_retry_secs: default_dead_letter_retry(),
            dead_letter_max_attempts: default_dead_letter_attempts(),
        }
    }
}

impl AppConfig {
    /// Load config from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("DC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_api_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_mqtt_host() -> String {
    "localhost".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_namespace() -> String {
    "doorbell".to_string()
}
fn default_qos() -> u8 {
    1
}
fn default_keep_alive() -> u64 {
    30
}
fn default_max_packet_bytes() -> usize {
    1024 * 1024
}
fn default_reconnect_delay() -> u64 {
    5
}
fn default_max_connections() -> u32 {
    10
}
fn default_s3_endpoint() -> String {
    "http://localhost:9000".to_string()
}
fn default_s3_bucket() -> String {
    "doorbell-images".to_string()
}
fn default_s3_folder() -> String {
    "doorbell_images".to_string()
}
fn default_s3_region() -> String {
    "us-east-1".to_string()
}
fn default_s3_access_key() -> String {
    "doorcam".to_string()
}
fn default_s3_secret_key() -> String {
    "doorcam123".to_string()
}
fn default_url_ttl() -> u64 {
    600
}
fn default_max_idle() -> u64 {
    300
}
fn default_sweep_interval() -> u64 {
    30
}
fn default_tombstone() -> u64 {
    60
}
fn default_dead_letter_capacity() -> usize {
    32
}
fn default_dead_letter_retry() -> u64 {
    60
}
fn default_dead_letter_attempts() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let cfg: AppConfig = serde_json::from_value(serde_json::json!({
            "database": { "url": "postgres://localhost/doorcam" }
        }))
        .unwrap();

        assert_eq!(cfg.server.api_port, 8080);
        assert_eq!(cfg.mqtt.namespace, "doorbell");
        assert_eq!(cfg.mqtt.qos, 1);
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.s3.public_endpoint(), "http://localhost:9000");
        assert_eq!(cfg.transfers.max_idle_secs, 300);
        assert_eq!(
            cfg.transfers.handoff_failure_policy,
            HandoffFailurePolicy::Drop
        );
    }

    #[test]
    fn test_dead_letter_policy_parses() {
        let cfg: AppConfig = serde_json::from_value(serde_json::json!({
            "database": { "url": "postgres://localhost/doorcam" },
            "transfers": { "handoff_failure_policy": "dead_letter", "dead_letter_capacity": 4 },
            "s3": { "public_endpoint": "https://cdn.example.com" }
        }))
        .unwrap();

        assert_eq!(
            cfg.transfers.handoff_failure_policy,
            HandoffFailurePolicy::DeadLetter
        );
        assert_eq!(cfg.transfers.dead_letter_capacity, 4);
        assert_eq!(cfg.transfers.tombstone_secs, 60);
        assert_eq!(cfg.s3.public_endpoint(), "https://cdn.example.com");
    }
}
