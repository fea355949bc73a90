//! Session sweeper: evicts transfers that stopped receiving messages.
//!
//! Runs every `sweep_interval_secs`. Any session untouched for longer than
//! `max_idle_secs` is dropped with its chunks; expired completion
//! tombstones are purged on the same tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::AppState;

pub fn start(state: Arc<AppState>) -> JoinHandle<()> {
    let interval_secs = state.config.transfers.sweep_interval_secs.max(1);
    let max_idle = Duration::from_secs(state.config.transfers.max_idle_secs);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

        tracing::info!(
            "Session sweeper started (every {}s, idle limit {}s)",
            interval_secs,
            max_idle.as_secs()
        );

        loop {
            interval.tick().await;

            let evicted = state.registry.evict_idle(max_idle);
            for session in &evicted {
                tracing::warn!(
                    device_id = %session.key.device_id,
                    image_id = %session.key.image_id,
                    received = session.received,
                    expected = ?session.expected,
                    age_secs = session.age.as_secs(),
                    "Evicted abandoned transfer"
                );
            }
            if !evicted.is_empty() {
                tracing::info!(
                    count = evicted.len(),
                    remaining = state.registry.len(),
                    "Session sweeper: evicted idle transfers"
                );
            }

            let purged = state.registry.purge_tombstones();
            if purged > 0 {
                tracing::debug!(purged, "Session sweeper: expired completion tombstones");
            }
        }
    })
}
