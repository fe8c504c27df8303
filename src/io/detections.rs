//! MQTT client for receiving detector frame messages
//!
//! Frames arrive as JSON, one message per sampled frame per stream. Parsed
//! frames go to the supervisor via `try_send` so a slow engine can never
//! block the MQTT eventloop. Connection errors back off exponentially up to
//! a cap and surface through a `StreamHealth` watch channel instead of
//! retrying silently forever.

use crate::domain::geometry::BBox;
use crate::domain::types::{Detection, FrameMessage, FrameObservations, TrackId};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use base64::Engine as _;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Connection health of the detection ingest, observable by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHealth {
    Live,
    /// Transient errors; backoff in progress
    Degraded,
    /// Repeated failures; no frames are flowing
    Stalled,
}

impl StreamHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamHealth::Live => "live",
            StreamHealth::Degraded => "degraded",
            StreamHealth::Stalled => "stalled",
        }
    }
}

/// Consecutive failures after which the ingest is considered stalled
const STALLED_AFTER: u32 = 5;

/// Exponential backoff, 500ms doubling up to 16s
fn backoff_delay(consecutive_failures: u32) -> Duration {
    let exp = consecutive_failures.saturating_sub(1).min(5);
    Duration::from_millis(500u64 << exp)
}

/// Start the MQTT client and send parsed frames to the channel
///
/// Frames are sent via try_send to avoid blocking the MQTT eventloop;
/// dropped frames are counted in metrics and logged (rate-limited).
pub async fn start_detection_ingest(
    config: &Config,
    frame_tx: mpsc::Sender<FrameObservations>,
    metrics: Arc<Metrics>,
    health_tx: watch::Sender<StreamHealth>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("leftwatch-ingest-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.mqtt_topic(), QoS::AtMostOnce).await?;

    info!(
        topic = %config.mqtt_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "detection_ingest_subscribed"
    );

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            // Check for shutdown signal
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("detection_ingest_shutdown");
                    return Ok(());
                }
            }
            // Process MQTT events
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let received_at = Instant::now();
                        match std::str::from_utf8(&publish.payload) {
                            Ok(json_str) => {
                                let Some(frame) =
                                    parse_frame_message(&publish.topic, json_str, received_at)
                                else {
                                    continue;
                                };
                                if let Err(e) = frame_tx.try_send(frame) {
                                    match e {
                                        TrySendError::Full(_) => {
                                            metrics.record_frame_dropped();
                                            if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                                warn!("frame_dropped: ingest channel full");
                                                last_drop_warn = Instant::now();
                                            }
                                        }
                                        TrySendError::Closed(_) => {
                                            warn!("Frame channel closed");
                                            return Ok(());
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Invalid UTF-8 in MQTT payload");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("detection_ingest_connected");
                        consecutive_failures = 0;
                        let _ = health_tx.send(StreamHealth::Live);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        consecutive_failures += 1;
                        let backoff = backoff_delay(consecutive_failures);
                        let health = if consecutive_failures >= STALLED_AFTER {
                            StreamHealth::Stalled
                        } else {
                            StreamHealth::Degraded
                        };
                        let _ = health_tx.send(health);
                        error!(
                            error = %e,
                            consecutive_failures = %consecutive_failures,
                            backoff_ms = %backoff.as_millis(),
                            "detection_ingest_error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
    }
}

/// Parse a detector frame JSON message into engine input.
///
/// The stream id falls back to the last topic segment when the payload
/// omits it. Returns None for unparseable or dimensionless frames; an
/// invalid snapshot is discarded while the frame itself is kept.
pub fn parse_frame_message(
    topic: &str,
    json_str: &str,
    received_at: Instant,
) -> Option<FrameObservations> {
    let message: FrameMessage = match serde_json::from_str(json_str) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "Failed to parse frame message");
            return None;
        }
    };

    if message.frame_width == 0 || message.frame_height == 0 {
        debug!(topic = %topic, "frame_without_dimensions_skipped");
        return None;
    }

    let stream_id = message.stream_id.unwrap_or_else(|| stream_id_from_topic(topic));

    let detections: Vec<Detection> = message
        .detections
        .iter()
        .map(|d| Detection {
            bbox: BBox::from_corners(d.bbox),
            class_id: d.class_id,
            confidence: d.confidence,
            track_id: d.track_id.map(TrackId),
        })
        .collect();

    let snapshot = message.snapshot_base64.and_then(validate_snapshot);

    Some(FrameObservations {
        stream_id,
        frame_index: message.frame_index,
        frame_width: message.frame_width,
        frame_height: message.frame_height,
        detections,
        snapshot,
        received_at,
    })
}

fn stream_id_from_topic(topic: &str) -> String {
    topic.rsplit('/').next().unwrap_or(topic).to_string()
}

/// Snapshot payloads are passed through verbatim; anything that does not
/// decode as base64 is rejected at the boundary.
fn validate_snapshot(snapshot: String) -> Option<String> {
    match base64::engine::general_purpose::STANDARD.decode(snapshot.as_bytes()) {
        Ok(bytes) => {
            debug!(snapshot_bytes = %bytes.len(), "snapshot_attached");
            Some(snapshot)
        }
        Err(e) => {
            warn!(error = %e, "snapshot_base64_invalid_discarded");
            None
        }
    }
}
