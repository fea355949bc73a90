//! In-memory registry of in-flight image transfers.
//!
//! Every operation runs inside a single DashMap shard lock for its
//! [`TransferKey`], so operations on one key are serialised while
//! unrelated devices proceed in parallel. Nothing here awaits.
//!
//! Lock order is always `sessions` before `tombstones`.
//!
//! A completed key stays tombstoned for `tombstone_ttl`. Inside that window
//! every Meta, Chunk and Done for the key is treated as a redelivery and
//! dropped; a device may reuse the key only once the window has passed.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use super::TransferKey;

/// Partially received transfer.
#[derive(Debug)]
pub struct TransferSession {
    /// index → payload, iterated in ascending index order
    chunks: BTreeMap<u32, Bytes>,
    expected_total: Option<u32>,
    /// Chunks refused because their index was out of range.
    dropped_chunks: u32,
    created_at: Instant,
    last_touched: Instant,
}

impl TransferSession {
    fn new(now: Instant) -> Self {
        Self {
            chunks: BTreeMap::new(),
            expected_total: None,
            dropped_chunks: 0,
            created_at: now,
            last_touched: now,
        }
    }

    fn received(&self) -> u32 {
        self.chunks.len() as u32
    }
}

/// The ordered concatenation of a completed transfer's chunks.
#[derive(Debug, Clone)]
pub struct ReassembledImage {
    pub key: TransferKey,
    pub bytes: Bytes,
    pub chunk_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaOutcome {
    /// First message for the key.
    Created { total: u32 },
    /// Metadata set or resent on an existing session. `pruned` counts
    /// chunks discarded because the new total no longer covers them.
    Updated { total: u32, pruned: usize },
    /// `totalChunks` was zero, negative or too large.
    Rejected { total: i64 },
    /// Key completed recently; the metadata is a late redelivery.
    AfterCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Stored {
        received: u32,
        expected: Option<u32>,
    },
    /// Same index delivered again; last write wins.
    Replaced {
        received: u32,
        expected: Option<u32>,
    },
    /// Index is not below the declared total.
    OutOfRange { total: u32 },
    /// Key completed recently; the chunk is a late redelivery.
    AfterCompletion,
}

#[derive(Debug, Clone)]
pub enum Completion {
    Complete(ReassembledImage),
    Incomplete { received: u32, expected: u32 },
    NoMetadata { received: u32 },
    NoSession,
    /// No session, but the key completed within the tombstone window.
    AlreadyCompleted,
}

/// Session removed by [`SessionRegistry::evict_idle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedSession {
    pub key: TransferKey,
    pub received: u32,
    pub expected: Option<u32>,
    pub age: Duration,
}

/// Read-only view of a session for the API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub device_id: String,
    pub image_id: String,
    pub received: u32,
    pub expected: Option<u32>,
    pub dropped_chunks: u32,
    pub age_secs: u64,
    pub idle_secs: u64,
}

#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<TransferKey, TransferSession>,
    /// key → completion time
    tombstones: DashMap<TransferKey, Instant>,
    tombstone_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(tombstone_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            tombstones: DashMap::new(),
            tombstone_ttl,
        }
    }

    /// Create the session if needed and set its expected chunk count.
    pub fn upsert_metadata(&self, key: &TransferKey, total_chunks: i64) -> MetaOutcome {
        let total = match u32::try_from(total_chunks) {
            Ok(total) if total > 0 => total,
            _ => {
                return MetaOutcome::Rejected {
                    total: total_chunks,
                }
            }
        };

        let now = Instant::now();
        match self.sessions.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let session = entry.get_mut();
                session.expected_total = Some(total);
                session.last_touched = now;
                let before = session.chunks.len();
                session.chunks.retain(|index, _| *index < total);
                let pruned = before - session.chunks.len();
                session.dropped_chunks = session
                    .dropped_chunks
                    .saturating_add(u32::try_from(pruned).unwrap_or(u32::MAX));
                MetaOutcome::Updated { total, pruned }
            }
            Entry::Vacant(entry) => {
                if self.is_tombstoned(key, now) {
                    return MetaOutcome::AfterCompletion;
                }
                let mut session = TransferSession::new(now);
                session.expected_total = Some(total);
                entry.insert(session);
                MetaOutcome::Created { total }
            }
        }
    }

    /// Create the session if needed and store the chunk at `index`.
    pub fn put_chunk(&self, key: &TransferKey, index: u32, data: Bytes) -> ChunkOutcome {
        let now = Instant::now();
        let mut session = match self.sessions.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => {
                if self.is_tombstoned(key, now) {
                    return ChunkOutcome::AfterCompletion;
                }
                entry.insert(TransferSession::new(now))
            }
        };

        session.last_touched = now;
        if let Some(total) = session.expected_total {
            if index >= total {
                session.dropped_chunks = session.dropped_chunks.saturating_add(1);
                return ChunkOutcome::OutOfRange { total };
            }
        }

        let replaced = session.chunks.insert(index, data).is_some();
        let received = session.received();
        let expected = session.expected_total;
        if replaced {
            ChunkOutcome::Replaced { received, expected }
        } else {
            ChunkOutcome::Stored { received, expected }
        }
    }

    /// Reassemble and remove the session if every chunk is present.
    ///
    /// Removal happens under the key's lock, so of several racing callers
    /// exactly one gets [`Completion::Complete`].
    pub fn try_complete(&self, key: &TransferKey) -> Completion {
        let now = Instant::now();
        let entry = match self.sessions.entry(key.clone()) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(_) => {
                return if self.is_tombstoned(key, now) {
                    Completion::AlreadyCompleted
                } else {
                    Completion::NoSession
                };
            }
        };

        // Done never refreshes `last_touched`; only Meta and Chunk keep a session alive.
        let session = entry.get();
        let received = session.received();
        let Some(expected) = session.expected_total else {
            return Completion::NoMetadata { received };
        };
        if received < expected {
            return Completion::Incomplete { received, expected };
        }

        let session = entry.remove();
        self.tombstones.insert(key.clone(), now);

        let size = session.chunks.values().map(Bytes::len).sum();
        let mut buf = BytesMut::with_capacity(size);
        for chunk in session.chunks.values() {
            buf.extend_from_slice(chunk);
        }

        Completion::Complete(ReassembledImage {
            key: key.clone(),
            bytes: buf.freeze(),
            chunk_count: received,
        })
    }

    /// Remove every session untouched for longer than `max_idle`.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<EvictedSession> {
        let now = Instant::now();
        let mut evicted = Vec::new();
        self.sessions.retain(|key, session| {
            if now.duration_since(session.last_touched) <= max_idle {
                return true;
            }
            evicted.push(EvictedSession {
                key: key.clone(),
                received: session.received(),
                expected: session.expected_total,
                age: now.duration_since(session.created_at),
            });
            false
        });
        evicted
    }

    /// Forget completions older than the tombstone window. Returns how many were dropped.
    pub fn purge_tombstones(&self) -> usize {
        let now = Instant::now();
        let before = self.tombstones.len();
        self.tombstones
            .retain(|_, completed_at| now.duration_since(*completed_at) < self.tombstone_ttl);
        before.saturating_sub(self.tombstones.len())
    }

    pub fn get(&self, key: &TransferKey) -> Option<SessionSnapshot> {
        self.sessions
            .get(key)
            .map(|s| snapshot(s.key(), s.value(), Instant::now()))
    }

    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let now = Instant::now();
        let mut all: Vec<_> = self
            .sessions
            .iter()
            .map(|s| snapshot(s.key(), s.value(), now))
            .collect();
        all.sort_by(|a, b| b.age_secs.cmp(&a.age_secs));
        all
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_tombstoned(&self, key: &TransferKey, now: Instant) -> bool {
        self.tombstones
            .get(key)
            .is_some_and(|completed_at| now.duration_since(*completed_at) < self.tombstone_ttl)
    }
}

fn snapshot(key: &TransferKey, session: &TransferSession, now: Instant) -> SessionSnapshot {
    SessionSnapshot {
        device_id: key.device_id.clone(),
        image_id: key.image_id.clone(),
        received: session.received(),
        expected: session.expected_total,
        dropped_chunks: session.dropped_chunks,
        age_secs: now.duration_since(session.created_at).as_secs(),
        idle_secs: now.duration_since(session.last_touched).as_secs(),
    }
}
