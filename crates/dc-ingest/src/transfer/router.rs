//! Topic router: parses `(topic, payload)` into a typed transfer event.
//!
//! Recognised shapes, relative to the configured namespace `<ns>`:
//!
//! | Topic                                   | Payload                                   |
//! |-----------------------------------------|-------------------------------------------|
//! | `<ns>/meta`                             | JSON `{deviceId, imageId, totalChunks}`   |
//! | `<ns>/chunk/<deviceId>/<imageId>/<idx>` | base64 text                               |
//! | `<ns>/done/<deviceId>/<imageId>`        | ignored                                   |
//!
//! The router holds no state and never touches the registry.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde::Deserialize;

use super::TransferKey;

/// Why a message on a recognised topic could not be turned into an event.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("expected topic shape {expected}")]
    BadShape { expected: &'static str },

    #[error("empty {0} segment")]
    EmptySegment(&'static str),

    #[error("chunk index {0:?} is not a non-negative integer")]
    BadIndex(String),

    #[error("invalid metadata payload: {0}")]
    BadMetadata(#[from] serde_json::Error),

    #[error("metadata field {0} is empty")]
    EmptyField(&'static str),

    #[error("chunk payload is not valid base64: {0}")]
    BadBase64(#[from] base64::DecodeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEvent {
    pub key: TransferKey,
    /// Raw declared count; range checks happen in the registry.
    pub total_chunks: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEvent {
    pub key: TransferKey,
    pub index: u32,
    pub data: Bytes,
}

#[derive(Debug)]
pub enum RoutedEvent {
    Meta(MetaEvent),
    Chunk(ChunkEvent),
    Done(TransferKey),
    Malformed { topic: String, reason: RouteError },
    Unknown { topic: String },
}

/// Wire shape of a `<ns>/meta` payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaPayload {
    device_id: String,
    image_id: String,
    total_chunks: i64,
}

#[derive(Debug, Clone)]
pub struct TopicRouter {
    namespace: String,
}

impl TopicRouter {
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into().trim_end_matches('/').to_string();
        Self { namespace }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Subscription filters covering every topic this router understands.
    pub fn subscriptions(&self) -> [String; 3] {
        [
            format!("{}/meta", self.namespace),
            format!("{}/chunk/#", self.namespace),
            format!("{}/done/#", self.namespace),
        ]
    }

    pub fn route(&self, topic: &str, payload: &[u8]) -> RoutedEvent {
        let Some(rest) = topic
            .strip_prefix(self.namespace.as_str())
            .and_then(|r| r.strip_prefix('/'))
        else {
            return RoutedEvent::Unknown {
                topic: topic.to_string(),
            };
        };

        let mut segments = rest.split('/');
        let result = match segments.next() {
            Some("meta") if segments.next().is_none() => parse_meta(payload).map(RoutedEvent::Meta),
            Some("chunk") => {
                parse_chunk(&segments.collect::<Vec<_>>(), payload).map(RoutedEvent::Chunk)
            }
            Some("done") => parse_done(&segments.collect::<Vec<_>>()).map(RoutedEvent::Done),
            _ => {
                return RoutedEvent::Unknown {
                    topic: topic.to_string(),
                }
            }
        };

        result.unwrap_or_else(|reason| RoutedEvent::Malformed {
            topic: topic.to_string(),
            reason,
        })
    }
}

fn parse_meta(payload: &[u8]) -> Result<MetaEvent, RouteError> {
    let meta: MetaPayload = serde_json::from_slice(payload)?;
    if meta.device_id.is_empty() {
        return Err(RouteError::EmptyField("deviceId"));
    }
    if meta.image_id.is_empty() {
        return Err(RouteError::EmptyField("imageId"));
    }
    Ok(MetaEvent {
        key: TransferKey::new(meta.device_id, meta.image_id),
        total_chunks: meta.total_chunks,
    })
}

fn parse_chunk(segments: &[&str], payload: &[u8]) -> Result<ChunkEvent, RouteError> {
    let [device_id, image_id, index] = segments else {
        return Err(RouteError::BadShape {
            expected: "<ns>/chunk/<deviceId>/<imageId>/<index>",
        });
    };
    let key = parse_key(device_id, image_id)?;
    if index.is_empty() {
        return Err(RouteError::EmptySegment("index"));
    }
    // `u32::from_str` would also accept a leading '+'.
    if !index.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RouteError::BadIndex(index.to_string()));
    }
    let index: u32 = index
        .parse()
        .map_err(|_| RouteError::BadIndex(index.to_string()))?;

    let data = BASE64.decode(payload.trim_ascii())?;
    Ok(ChunkEvent {
        key,
        index,
        data: Bytes::from(data),
    })
}

fn parse_done(segments: &[&str]) -> Result<TransferKey, RouteError> {
    let [device_id, image_id] = segments else {
        return Err(RouteError::BadShape {
            expected: "<ns>/done/<deviceId>/<imageId>",
        });
    };
    parse_key(device_id, image_id)
}

fn parse_key(device_id: &str, image_id: &str) -> Result<TransferKey, RouteError> {
    if device_id.is_empty() {
        return Err(RouteError::EmptySegment("deviceId"));
    }
    if image_id.is_empty() {
        return Err(RouteError::EmptySegment("imageId"));
    }
    Ok(TransferKey::new(device_id, image_id))
}
