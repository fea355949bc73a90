//! Background workers: periodic tasks running alongside the ingest loop.

pub mod dead_letter_retry;
pub mod session_sweeper;

use std::sync::Arc;
use tokio::task::JoinHandle;

use dc_common::config::HandoffFailurePolicy;

use crate::AppState;

/// Start all background worker tasks. Returns handles that can be
/// used to abort them on shutdown.
pub fn start_all_workers(state: Arc<AppState>) -> Vec<JoinHandle<()>> {
    let mut handles = vec![session_sweeper::start(state.clone())];
    if state.engine.policy() == HandoffFailurePolicy::DeadLetter {
        handles.push(dead_letter_retry::start(state));
    }
    handles
}
