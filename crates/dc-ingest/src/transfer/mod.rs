//! Chunked image transfer reassembly.
//!
//! Devices publish one `meta` message, any number of base64 `chunk`
//! messages (in any order, possibly redelivered) and a final `done`
//! message per image. The router types each message, the registry holds
//! the partial transfers and the engine drives completion and handoff.

pub mod dead_letter;
pub mod engine;
pub mod registry;
pub mod router;

use std::fmt;

/// Identifies one logical image transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub device_id: String,
    pub image_id: String,
}

impl TransferKey {
    pub fn new(device_id: impl Into<String>, image_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            image_id: image_id.into(),
        }
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.image_id)
    }
}
