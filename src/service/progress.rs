//! Push-based progress reporting for campaign sends
//!
//! Observers are notified after every batch. Emission must never block or
//! slow the send loop, so the provided channel observer uses a bounded
//! channel with a drop-newest policy: when the consumer lags, the incoming
//! event is discarded and the older ones stay queued.

use crate::domain::StringUuid;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Snapshot emitted after each batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub campaign_id: StringUuid,
    /// Recipients attempted so far
    pub processed: usize,
    pub total: usize,
    /// Recipients whose attempt was accepted by the provider so far
    pub succeeded: usize,
}

/// Observer of campaign send progress
///
/// Implementations must return promptly: `on_progress` is called from inside
/// the send loop.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// Bounded-channel observer with drop-newest overflow behavior
pub struct ChannelProgressObserver {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelProgressObserver {
    /// Create the observer and the receiving half consumed by the caller
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self { tx }), rx)
    }
}

impl ProgressObserver for ChannelProgressObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::debug!(
                    campaign_id = %dropped.campaign_id,
                    processed = dropped.processed,
                    "progress channel full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Consumer went away; progress is best-effort
            }
        }
    }
}
