//! Event Store delivery - sink trait, HTTP implementation and publisher actor
//!
//! The publisher consumes flagged events off the bounded channel and owns
//! all delivery concerns (journaling, timeouts, bounded retries). Delivery
//! failures never reach back into the frame loop: a flagged object stays
//! flagged whether or not its event made it out.

use crate::domain::event::AbandonEvent;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::journal::Journal;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Destination for abandonment events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &AbandonEvent) -> anyhow::Result<()>;
}

/// Sink that POSTs events as JSON to the Event Store intake endpoint
pub struct HttpEventSink {
    client: reqwest::Client,
    url: String,
}

impl HttpEventSink {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.event_store_timeout_ms()))
            .build()
            .context("Failed to build Event Store HTTP client")?;
        Ok(Self { client, url: config.event_store_url().to_string() })
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn deliver(&self, event: &AbandonEvent) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?;
        response.error_for_status().context("Event Store rejected the event")?;
        Ok(())
    }
}

/// Publisher actor
///
/// Receives events from the channel, journals them locally and delivers them
/// to the sink with a bounded retry budget.
pub struct EventPublisher {
    sink: Arc<dyn EventSink>,
    rx: mpsc::Receiver<AbandonEvent>,
    journal: Journal,
    /// Delivery attempts per event before it is dropped
    retry_attempts: u32,
    metrics: Arc<Metrics>,
}

impl EventPublisher {
    pub fn new(
        sink: Arc<dyn EventSink>,
        rx: mpsc::Receiver<AbandonEvent>,
        journal: Journal,
        retry_attempts: u32,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { sink, rx, journal, retry_attempts: retry_attempts.max(1), metrics }
    }

    /// Run the publisher loop until shutdown, draining queued events first.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(retry_attempts = %self.retry_attempts, "event_publisher_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("event_publisher_shutdown");
                        // Drain remaining events
                        while let Ok(event) = self.rx.try_recv() {
                            self.publish(event).await;
                        }
                        return;
                    }
                }
                Some(event) = self.rx.recv() => {
                    self.publish(event).await;
                }
            }
        }
    }

    async fn publish(&self, event: AbandonEvent) {
        // Journal before attempting delivery
        self.journal.write_event(&event);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.sink.deliver(&event).await {
                Ok(()) => {
                    self.metrics.record_sink_delivered();
                    info!(
                        event_id = %event.event_id,
                        stream_id = %event.stream_id,
                        attempt = %attempt,
                        "abandon_event_delivered"
                    );
                    return;
                }
                Err(e) if attempt < self.retry_attempts => {
                    warn!(
                        event_id = %event.event_id,
                        attempt = %attempt,
                        error = %e,
                        "event_delivery_retry"
                    );
                    tokio::time::sleep(Duration::from_millis(250 * attempt as u64)).await;
                }
                Err(e) => {
                    self.metrics.record_sink_failure();
                    error!(
                        event_id = %event.event_id,
                        attempts = %attempt,
                        error = %e,
                        "abandon_event_delivery_failed_dropped"
                    );
                    return;
                }
            }
        }
    }
}
