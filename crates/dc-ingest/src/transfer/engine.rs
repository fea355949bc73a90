//! Reassembly engine: applies routed events to the registry and hands
//! completed images off.
//!
//! Per-key lifecycle:
//!
//! ```text
//! Unseen ──meta/chunk──▶ PartiallyReceived ──done (all chunks)──▶ Complete
//!                          │      ▲                                (session removed,
//!                          └──────┘ meta/chunk, done (incomplete)   handoff spawned)
//!                          │
//!                          └──idle > max_idle──▶ Abandoned (evicted by the sweeper)
//! ```
//!
//! Ingestion is synchronous and lock-bounded; only the handoff awaits, and
//! it runs after the session has left the registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dc_common::config::HandoffFailurePolicy;
use serde::Serialize;
use tokio::task::JoinHandle;

use super::dead_letter::{DeadLetter, DeadLetterQueue};
use super::registry::{ChunkOutcome, Completion, MetaOutcome, ReassembledImage, SessionRegistry};
use super::router::{RoutedEvent, TopicRouter};
use crate::services::handoff::{Handoff, HandoffError, PublicRef};

/// What a single inbound message did.
#[derive(Debug)]
pub enum IngestOutcome {
    Malformed,
    Unknown,
    Meta(MetaOutcome),
    Chunk(ChunkOutcome),
    Done(Completion),
}

impl IngestOutcome {
    /// The reassembled image, if this message completed a transfer.
    pub fn into_ready(self) -> Option<ReassembledImage> {
        match self {
            Self::Done(Completion::Complete(image)) => Some(image),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct EngineStats {
    messages: AtomicU64,
    malformed: AtomicU64,
    unknown: AtomicU64,
    completed: AtomicU64,
    handed_off: AtomicU64,
    handoff_failures: AtomicU64,
    dead_lettered: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub messages: u64,
    pub malformed: u64,
    pub unknown: u64,
    pub completed: u64,
    pub handed_off: u64,
    pub handoff_failures: u64,
    pub dead_lettered: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetrySummary {
    pub succeeded: usize,
    pub requeued: usize,
    pub abandoned: usize,
}

pub struct ReassemblyEngine<H> {
    router: TopicRouter,
    registry: Arc<SessionRegistry>,
    handoff: H,
    policy: HandoffFailurePolicy,
    dead_letters: DeadLetterQueue,
    stats: EngineStats,
}

impl<H: Handoff> ReassemblyEngine<H> {
    pub fn new(
        router: TopicRouter,
        registry: Arc<SessionRegistry>,
        handoff: H,
        policy: HandoffFailurePolicy,
        dead_letter_capacity: usize,
    ) -> Self {
        Self {
            router,
            registry,
            handoff,
            policy,
            dead_letters: DeadLetterQueue::new(dead_letter_capacity),
            stats: EngineStats::default(),
        }
    }

    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn handoff(&self) -> &H {
        &self.handoff
    }

    pub fn policy(&self) -> HandoffFailurePolicy {
        self.policy
    }

    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.dead_letters
    }

    pub fn stats(&self) -> StatsSnapshot {
        let s = &self.stats;
        StatsSnapshot {
            messages: s.messages.load(Ordering::Relaxed),
            malformed: s.malformed.load(Ordering::Relaxed),
            unknown: s.unknown.load(Ordering::Relaxed),
            completed: s.completed.load(Ordering::Relaxed),
            handed_off: s.handed_off.load(Ordering::Relaxed),
            handoff_failures: s.handoff_failures.load(Ordering::Relaxed),
            dead_lettered: s.dead_lettered.load(Ordering::Relaxed),
        }
    }

    /// Route one message and apply it to the registry.
    pub fn ingest(&self, topic: &str, payload: &[u8]) -> IngestOutcome {
        self.stats.messages.fetch_add(1, Ordering::Relaxed);

        match self.router.route(topic, payload) {
            RoutedEvent::Malformed { topic, reason } => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%topic, %reason, "Dropping malformed message");
                IngestOutcome::Malformed
            }
            RoutedEvent::Unknown { topic } => {
                self.stats.unknown.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%topic, "Ignoring message on unknown topic");
                IngestOutcome::Unknown
            }
            RoutedEvent::Meta(meta) => {
                let outcome = self.registry.upsert_metadata(&meta.key, meta.total_chunks);
                let (device_id, image_id) = (&meta.key.device_id, &meta.key.image_id);
                match outcome {
                    MetaOutcome::Rejected { total } => {
                        tracing::warn!(%device_id, %image_id, total, "Rejecting metadata with invalid totalChunks");
                    }
                    MetaOutcome::Created { total } => {
                        tracing::info!(%device_id, %image_id, total, "Transfer started");
                    }
                    MetaOutcome::Updated { total, pruned } => {
                        if pruned > 0 {
                            tracing::warn!(%device_id, %image_id, total, pruned, "Metadata shrank transfer, dropped chunks");
                        } else {
                            tracing::debug!(%device_id, %image_id, total, "Metadata recorded");
                        }
                    }
                    MetaOutcome::AfterCompletion => {
                        tracing::debug!(%device_id, %image_id, "Dropping metadata for completed transfer");
                    }
                }
                IngestOutcome::Meta(outcome)
            }
            RoutedEvent::Chunk(chunk) => {
                let index = chunk.index;
                let outcome = self.registry.put_chunk(&chunk.key, index, chunk.data);
                let (device_id, image_id) = (&chunk.key.device_id, &chunk.key.image_id);
                match outcome {
                    ChunkOutcome::Stored { received, expected }
                    | ChunkOutcome::Replaced { received, expected } => {
                        tracing::debug!(%device_id, %image_id, index, received, ?expected, "Chunk stored");
                    }
                    ChunkOutcome::OutOfRange { total } => {
                        tracing::warn!(%device_id, %image_id, index, total, "Dropping chunk beyond declared total");
                    }
                    ChunkOutcome::AfterCompletion => {
                        tracing::debug!(%device_id, %image_id, index, "Dropping chunk for completed transfer");
                    }
                }
                IngestOutcome::Chunk(outcome)
            }
            RoutedEvent::Done(key) => {
                let completion = self.registry.try_complete(&key);
                let (device_id, image_id) = (&key.device_id, &key.image_id);
                match &completion {
                    Completion::Complete(image) => {
                        self.stats.completed.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(
                            %device_id,
                            %image_id,
                            chunks = image.chunk_count,
                            size = image.bytes.len(),
                            "Transfer complete"
                        );
                    }
                    Completion::Incomplete { received, expected } => {
                        tracing::warn!(%device_id, %image_id, received, expected, "Done received for incomplete transfer");
                    }
                    Completion::NoMetadata { received } => {
                        tracing::warn!(%device_id, %image_id, received, "Done received before metadata");
                    }
                    Completion::NoSession => {
                        tracing::warn!(%device_id, %image_id, "Done received for unknown transfer");
                    }
                    Completion::AlreadyCompleted => {
                        tracing::debug!(%device_id, %image_id, "Duplicate done for completed transfer");
                    }
                }
                IngestOutcome::Done(completion)
            }
        }
    }

    /// Pass a reassembled image to the handoff pipeline.
    ///
    /// A failure never puts the session back. With the `drop` policy the
    /// image is lost; with `dead_letter` it is parked for retry.
    pub async fn hand_off(&self, image: ReassembledImage) -> Result<PublicRef, HandoffError> {
        match self.handoff.upload_and_record(&image).await {
            Ok(public_ref) => {
                self.stats.handed_off.fetch_add(1, Ordering::Relaxed);
                Ok(public_ref)
            }
            Err(e) => {
                self.stats.handoff_failures.fetch_add(1, Ordering::Relaxed);
                let (device_id, image_id) = (&image.key.device_id, &image.key.image_id);
                match self.policy {
                    HandoffFailurePolicy::Drop => {
                        tracing::error!(
                            %device_id,
                            %image_id,
                            size = image.bytes.len(),
                            error = %e,
                            "Handoff failed, image lost"
                        );
                    }
                    HandoffFailurePolicy::DeadLetter => {
                        tracing::error!(
                            %device_id,
                            %image_id,
                            size = image.bytes.len(),
                            error = %e,
                            "Handoff failed, image moved to dead-letter queue"
                        );
                        self.park(DeadLetter {
                            image,
                            attempts: 1,
                            last_error: e.to_string(),
                            first_failed_at: Utc::now(),
                        });
                    }
                }
                Err(e)
            }
        }
    }

    /// Retry every dead-lettered image once.
    pub async fn retry_dead_letters(&self, max_attempts: u32) -> RetrySummary {
        let mut summary = RetrySummary::default();

        for mut letter in self.dead_letters.drain() {
            let (device_id, image_id) = (
                letter.image.key.device_id.clone(),
                letter.image.key.image_id.clone(),
            );
            match self.handoff.upload_and_record(&letter.image).await {
                Ok(public_ref) => {
                    self.stats.handed_off.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        %device_id,
                        %image_id,
                        storage_ref = %public_ref.0,
                        attempts = letter.attempts + 1,
                        "Dead-lettered image handed off"
                    );
                    summary.succeeded += 1;
                }
                Err(e) => {
                    self.stats.handoff_failures.fetch_add(1, Ordering::Relaxed);
                    letter.attempts += 1;
                    letter.last_error = e.to_string();
                    if letter.attempts >= max_attempts {
                        tracing::error!(
                            %device_id,
                            %image_id,
                            attempts = letter.attempts,
                            error = %e,
                            "Giving up on dead-lettered image"
                        );
                        summary.abandoned += 1;
                    } else {
                        tracing::warn!(
                            %device_id,
                            %image_id,
                            attempts = letter.attempts,
                            error = %e,
                            "Dead-letter retry failed"
                        );
                        self.park(letter);
                        summary.requeued += 1;
                    }
                }
            }
        }

        summary
    }

    fn park(&self, letter: DeadLetter) {
        if self.dead_letters.capacity() == 0 {
            tracing::error!(
                device_id = %letter.image.key.device_id,
                image_id = %letter.image.key.image_id,
                "Dead-letter queue disabled, image lost"
            );
            return;
        }
        self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
        if let Some(lost) = self.dead_letters.push(letter) {
            tracing::error!(
                device_id = %lost.image.key.device_id,
                image_id = %lost.image.key.image_id,
                "Dead-letter queue full, oldest image lost"
            );
        }
    }

    /// Ingest inline and, if the message completed a transfer, spawn the
    /// handoff so the caller's delivery loop never waits on storage.
    pub fn dispatch(self: &Arc<Self>, topic: &str, payload: &[u8]) -> Option<JoinHandle<()>> {
        let image = self.ingest(topic, payload).into_ready()?;
        let engine = Arc::clone(self);
        Some(tokio::spawn(async move {
            // Failures are logged and counted inside hand_off.
            let _ = engine.hand_off(image).await;
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    use super::*;
    use crate::transfer::TransferKey;

    /// Records every handoff; fails the first `fail_times` calls.
    #[derive(Default)]
    struct RecordingHandoff {
        calls: Mutex<Vec<(String, String, Vec<u8>)>>,
        attempts: AtomicUsize,
        fail_times: usize,
    }

    impl RecordingHandoff {
        fn failing(fail_times: usize) -> Self {
            Self {
                fail_times,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(String, String, Vec<u8>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Handoff for RecordingHandoff {
        async fn upload_and_record(
            &self,
            image: &ReassembledImage,
        ) -> Result<PublicRef, HandoffError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_times {
                return Err(HandoffError::Upload("bucket unavailable".into()));
            }
            self.calls.lock().unwrap().push((
                image.key.device_id.clone(),
                image.key.image_id.clone(),
                image.bytes.to_vec(),
            ));
            Ok(PublicRef(format!(
                "doorbell_images/{}/{}.jpg",
                image.key.device_id, image.key.image_id
            )))
        }
    }

    fn engine_with(
        handoff: RecordingHandoff,
        policy: HandoffFailurePolicy,
    ) -> Arc<ReassemblyEngine<RecordingHandoff>> {
        Arc::new(ReassemblyEngine::new(
            TopicRouter::new("doorbell"),
            Arc::new(SessionRegistry::new(Duration::from_secs(60))),
            handoff,
            policy,
            8,
        ))
    }

    fn engine() -> Arc<ReassemblyEngine<RecordingHandoff>> {
        engine_with(RecordingHandoff::default(), HandoffFailurePolicy::Drop)
    }

    fn meta(device: &str, image: &str, total: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "deviceId": device,
            "imageId": image,
            "totalChunks": total,
        }))
        .unwrap()
    }

    fn chunk(data: &[u8]) -> Vec<u8> {
        BASE64.encode(data).into_bytes()
    }

    #[tokio::test]
    async fn test_scenario_out_of_order_two_chunks() {
        let engine = engine();
        engine.ingest("doorbell/meta", &meta("d1", "i1", 2));
        engine.ingest("doorbell/chunk/d1/i1/1", &chunk(b"BB"));
        engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));

        let handle = engine
            .dispatch("doorbell/done/d1/i1", b"")
            .expect("transfer should complete");
        handle.await.unwrap();

        assert_eq!(
            engine.handoff().calls(),
            vec![("d1".to_string(), "i1".to_string(), b"AABB".to_vec())]
        );
        assert!(engine
            .registry()
            .get(&TransferKey::new("d1", "i1"))
            .is_none());
        assert_eq!(engine.stats().completed, 1);
        assert_eq!(engine.stats().handed_off, 1);
    }

    #[tokio::test]
    async fn test_done_for_unknown_transfer() {
        let engine = engine();
        let outcome = engine.ingest("doorbell/done/d2/i2", b"");

        assert!(matches!(outcome, IngestOutcome::Done(Completion::NoSession)));
        assert!(engine.dispatch("doorbell/done/d2/i2", b"").is_none());
        assert!(engine.handoff().calls().is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_done_does_not_hand_off() {
        let engine = engine();
        engine.ingest("doorbell/meta", &meta("d1", "i1", 3));
        engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));
        engine.ingest("doorbell/chunk/d1/i1/2", &chunk(b"CC"));

        let outcome = engine.ingest("doorbell/done/d1/i1", b"");
        assert!(matches!(
            outcome,
            IngestOutcome::Done(Completion::Incomplete {
                received: 2,
                expected: 3
            })
        ));
        assert!(engine.handoff().calls().is_empty());

        let snap = engine
            .registry()
            .get(&TransferKey::new("d1", "i1"))
            .expect("session kept for late chunks");
        assert_eq!(snap.received, 2);

        // Late chunk plus retried done completes the transfer.
        engine.ingest("doorbell/chunk/d1/i1/1", &chunk(b"BB"));
        engine
            .dispatch("doorbell/done/d1/i1", b"")
            .unwrap()
            .await
            .unwrap();
        assert_eq!(engine.handoff().calls()[0].2, b"AABBCC".to_vec());
    }

    #[tokio::test]
    async fn test_done_without_metadata() {
        let engine = engine();
        engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));

        let outcome = engine.ingest("doorbell/done/d1/i1", b"");
        assert!(matches!(
            outcome,
            IngestOutcome::Done(Completion::NoMetadata { received: 1 })
        ));
        assert_eq!(engine.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_metadata_is_idempotent() {
        let engine = engine();
        engine.ingest("doorbell/meta", &meta("d1", "i1", 1));
        engine.ingest("doorbell/meta", &meta("d1", "i1", 1));
        assert_eq!(engine.registry().len(), 1);

        engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));
        let image = engine
            .ingest("doorbell/done/d1/i1", b"")
            .into_ready()
            .unwrap();
        assert_eq!(&image.bytes[..], b"AA");
    }

    #[tokio::test]
    async fn test_malformed_chunk_is_isolated() {
        let engine = engine();
        engine.ingest("doorbell/meta", &meta("d1", "i1", 2));
        engine.ingest("doorbell/meta", &meta("d2", "i2", 1));
        engine.ingest("doorbell/chunk/d2/i2/0", &chunk(b"ZZ"));
        let before = engine.registry().get(&TransferKey::new("d2", "i2")).unwrap();

        let outcome = engine.ingest("doorbell/chunk/d1/i1/0", b"%%% not base64 %%%");
        assert!(matches!(outcome, IngestOutcome::Malformed));

        let k1 = engine.registry().get(&TransferKey::new("d1", "i1")).unwrap();
        assert_eq!(k1.received, 0);
        let after = engine.registry().get(&TransferKey::new("d2", "i2")).unwrap();
        assert_eq!(after.received, before.received);
        assert_eq!(after.expected, before.expected);
        assert_eq!(engine.stats().malformed, 1);
    }

    #[tokio::test]
    async fn test_unknown_topic_counted() {
        let engine = engine();
        assert!(matches!(
            engine.ingest("doorbell/heartbeat", b"{}"),
            IngestOutcome::Unknown
        ));
        assert_eq!(engine.stats().unknown, 1);
        assert!(engine.registry().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_done_hands_off_once() {
        for round in 0..20 {
            let engine = engine();
            let image = format!("i{round}");
            engine.ingest("doorbell/meta", &meta("d1", &image, 2));
            engine.ingest(&format!("doorbell/chunk/d1/{image}/0"), &chunk(b"AA"));
            engine.ingest(&format!("doorbell/chunk/d1/{image}/1"), &chunk(b"BB"));

            let done = format!("doorbell/done/d1/{image}");
            let tasks: Vec<_> = (0..4)
                .map(|_| {
                    let engine = engine.clone();
                    let done = done.clone();
                    tokio::spawn(async move { engine.dispatch(&done, b"") })
                })
                .collect();

            let mut spawned = 0;
            for task in tasks {
                if let Some(handoff) = task.await.unwrap() {
                    handoff.await.unwrap();
                    spawned += 1;
                }
            }

            assert_eq!(spawned, 1);
            assert_eq!(engine.handoff().calls().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_handoff_failure_drop_policy_loses_image() {
        let engine = engine_with(RecordingHandoff::failing(1), HandoffFailurePolicy::Drop);
        engine.ingest("doorbell/meta", &meta("d1", "i1", 1));
        engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));
        let image = engine
            .ingest("doorbell/done/d1/i1", b"")
            .into_ready()
            .unwrap();

        assert!(engine.hand_off(image).await.is_err());
        assert!(engine.registry().is_empty());
        assert!(engine.dead_letters().is_empty());
        assert_eq!(engine.stats().handoff_failures, 1);
    }

    #[tokio::test]
    async fn test_handoff_failure_dead_letter_policy_retries() {
        let engine = engine_with(
            RecordingHandoff::failing(2),
            HandoffFailurePolicy::DeadLetter,
        );
        engine.ingest("doorbell/meta", &meta("d1", "i1", 1));
        engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));
        let image = engine
            .ingest("doorbell/done/d1/i1", b"")
            .into_ready()
            .unwrap();

        assert!(engine.hand_off(image).await.is_err());
        assert!(engine.registry().is_empty());
        assert_eq!(engine.dead_letters().len(), 1);

        let summary = engine.retry_dead_letters(5).await;
        assert_eq!(
            summary,
            RetrySummary {
                succeeded: 0,
                requeued: 1,
                abandoned: 0
            }
        );
        assert_eq!(engine.dead_letters().snapshot()[0].attempts, 2);

        let summary = engine.retry_dead_letters(5).await;
        assert_eq!(summary.succeeded, 1);
        assert!(engine.dead_letters().is_empty());
        assert_eq!(engine.handoff().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_dead_letter_abandoned_after_max_attempts() {
        let engine = engine_with(
            RecordingHandoff::failing(usize::MAX),
            HandoffFailurePolicy::DeadLetter,
        );
        engine.ingest("doorbell/meta", &meta("d1", "i1", 1));
        engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));
        let image = engine
            .ingest("doorbell/done/d1/i1", b"")
            .into_ready()
            .unwrap();
        let _ = engine.hand_off(image).await;

        assert_eq!(engine.retry_dead_letters(3).await.requeued, 1);
        assert_eq!(engine.retry_dead_letters(3).await.abandoned, 1);
        assert!(engine.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_late_chunk_after_completion_is_dropped() {
        let engine = engine();
        engine.ingest("doorbell/meta", &meta("d1", "i1", 1));
        engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));
        assert!(engine
            .ingest("doorbell/done/d1/i1", b"")
            .into_ready()
            .is_some());

        let outcome = engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));
        assert!(matches!(
            outcome,
            IngestOutcome::Chunk(ChunkOutcome::AfterCompletion)
        ));
        assert!(matches!(
            engine.ingest("doorbell/done/d1/i1", b""),
            IngestOutcome::Done(Completion::AlreadyCompleted)
        ));
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_redelivered_transfer_after_completion_is_handed_off_once() {
        let engine = engine();
        engine.ingest("doorbell/meta", &meta("d1", "i1", 1));
        engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));
        engine
            .dispatch("doorbell/done/d1/i1", b"")
            .expect("transfer should complete")
            .await
            .unwrap();

        // Broker redelivers the whole transfer.
        assert!(matches!(
            engine.ingest("doorbell/meta", &meta("d1", "i1", 1)),
            IngestOutcome::Meta(MetaOutcome::AfterCompletion)
        ));
        engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));
        assert!(engine.dispatch("doorbell/done/d1/i1", b"").is_none());

        // A lone Meta must not leave a session behind either.
        engine.ingest("doorbell/meta", &meta("d1", "i1", 3));

        assert_eq!(engine.handoff().calls().len(), 1);
        assert!(engine.registry().is_empty());
        assert_eq!(engine.stats().completed, 1);
    }

    #[tokio::test]
    async fn test_dead_letter_policy_with_zero_capacity_loses_image() {
        let engine = Arc::new(ReassemblyEngine::new(
            TopicRouter::new("doorbell"),
            Arc::new(SessionRegistry::new(Duration::from_secs(60))),
            RecordingHandoff::failing(usize::MAX),
            HandoffFailurePolicy::DeadLetter,
            0,
        ));
        engine.ingest("doorbell/meta", &meta("d1", "i1", 1));
        engine.ingest("doorbell/chunk/d1/i1/0", &chunk(b"AA"));
        let image = engine
            .ingest("doorbell/done/d1/i1", b"")
            .into_ready()
            .unwrap();

        assert!(engine.hand_off(image).await.is_err());
        assert!(engine.dead_letters().is_empty());
        assert_eq!(engine.stats().dead_lettered, 0);
    }
}
