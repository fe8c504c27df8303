//! Typed channel for abandonment event hand-off
//!
//! Decouples the per-frame engine loop from Event Store delivery. Uses a
//! bounded mpsc channel with `try_send`: a slow or failing downstream can
//! drop events but can never back up frame processing.

use crate::domain::event::AbandonEvent;
use crate::infra::metrics::Metrics;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Sender handle for abandonment events
///
/// Clone this to share across stream engines. Non-blocking - if the channel
/// is full, the event is dropped and counted.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<AbandonEvent>,
    site_id: String,
    metrics: Arc<Metrics>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<AbandonEvent>, site_id: String, metrics: Arc<Metrics>) -> Self {
        Self { tx, site_id, metrics }
    }

    /// Hand an event to the publisher.
    /// Injects site_id into the payload.
    pub fn send_abandon(&self, mut event: AbandonEvent) {
        event.site = Some(self.site_id.clone());
        match self.tx.try_send(event) {
            Ok(()) => self.metrics.record_event_emitted(),
            Err(TrySendError::Full(ev)) => {
                self.metrics.record_event_dropped();
                warn!(
                    event_id = %ev.event_id,
                    stream_id = %ev.stream_id,
                    "abandon_event_dropped_queue_full"
                );
            }
            Err(TrySendError::Closed(ev)) => {
                self.metrics.record_event_dropped();
                warn!(event_id = %ev.event_id, "abandon_event_dropped_channel_closed");
            }
        }
    }
}

/// Create a new event channel pair
///
/// Returns (sender, receiver) where the sender can be cloned and shared.
/// Buffer size bounds how many undelivered events can be queued.
pub fn create_event_channel(
    buffer_size: usize,
    site_id: String,
    metrics: Arc<Metrics>,
) -> (EventSender, mpsc::Receiver<AbandonEvent>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EventSender::new(tx, site_id, metrics), rx)
}
