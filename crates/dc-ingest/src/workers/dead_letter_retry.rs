//! Dead-letter retry: re-attempts failed handoffs on a fixed interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::AppState;

pub fn start(state: Arc<AppState>) -> JoinHandle<()> {
    let interval_secs = state.config.transfers.dead_letter_retry_secs.max(1);
    let max_attempts = state.config.transfers.dead_letter_max_attempts;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

        tracing::info!(
            "Dead-letter retry worker started (every {}s, max {} attempts)",
            interval_secs,
            max_attempts
        );

        loop {
            interval.tick().await;

            if state.engine.dead_letters().is_empty() {
                continue;
            }

            let summary = state.engine.retry_dead_letters(max_attempts).await;
            tracing::info!(
                succeeded = summary.succeeded,
                requeued = summary.requeued,
                abandoned = summary.abandoned,
                "Dead-letter retry pass finished"
            );
        }
    })
}
