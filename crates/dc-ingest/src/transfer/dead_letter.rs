//! Bounded holding area for reassembled images whose handoff failed.
//!
//! Only used with `handoff_failure_policy = "dead_letter"`. Entries live
//! in memory and are lost on restart.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::registry::ReassembledImage;

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub image: ReassembledImage,
    pub attempts: u32,
    pub last_error: String,
    pub first_failed_at: DateTime<Utc>,
}

/// API view of a dead letter, without the image bytes.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterInfo {
    pub device_id: String,
    pub image_id: String,
    pub size_bytes: usize,
    pub attempts: u32,
    pub last_error: String,
    pub first_failed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct DeadLetterQueue {
    entries: Mutex<VecDeque<DeadLetter>>,
    capacity: usize,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a failed handoff. When full, the oldest entry is pushed
    /// out and returned so the caller can report the loss.
    pub fn push(&self, letter: DeadLetter) -> Option<DeadLetter> {
        if self.capacity == 0 {
            return Some(letter);
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(letter);
        evicted
    }

    /// Remove and return every queued entry, oldest first.
    pub fn drain(&self) -> Vec<DeadLetter> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.drain(..).collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<DeadLetterInfo> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|l| DeadLetterInfo {
                device_id: l.image.key.device_id.clone(),
                image_id: l.image.key.image_id.clone(),
                size_bytes: l.image.bytes.len(),
                attempts: l.attempts,
                last_error: l.last_error.clone(),
                first_failed_at: l.first_failed_at,
            })
            .collect()
    }
}
