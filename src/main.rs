//! Leftwatch - abandoned object detection engine
//!
//! Consumes per-frame detections from an upstream detector/tracker, infers
//! which person owns which object, and emits an abandonment event exactly
//! once per incident.
//!
//! Module structure:
//! - `domain/` - Core value types (geometry, detections, events)
//! - `io/` - External interfaces (MQTT ingest, Event Store sink, journal)
//! - `services/` - Business logic (registry, association, ownership, engine)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use leftwatch::infra::{Config, Metrics};
use leftwatch::io::{
    create_event_channel, start_detection_ingest, EventPublisher, HttpEventSink, Journal,
    StreamHealth,
};
use leftwatch::services::EngineSupervisor;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Leftwatch - abandoned object detection daemon
#[derive(Parser, Debug)]
#[command(name = "leftwatchd", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full per-frame visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("leftwatchd starting");

    // Parse command line arguments using clap
    let args = Args::parse();

    // Load configuration from TOML file; fail fast on inconsistent knobs
    let config = Config::load_from_path(&args.config);
    config.validate()?;

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        mqtt_topic = %config.mqtt_topic(),
        event_store_url = %config.event_store_url(),
        target_fps = %config.target_fps(),
        left_seconds = %config.left_seconds(),
        threshold_frames = %config.abandonment_threshold_frames(),
        appear_window_frames = %config.appear_window_frames(),
        max_coord_distance = %config.max_coord_distance(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());

    // Event channel (bounded) and publisher for Event Store delivery
    let (event_sender, event_rx) = create_event_channel(
        config.event_queue_capacity(),
        config.site_id().to_string(),
        metrics.clone(),
    );
    let sink = Arc::new(HttpEventSink::new(&config)?);
    let journal = Journal::new(config.journal_file());
    let publisher =
        EventPublisher::new(sink, event_rx, journal, config.event_retry_attempts(), metrics.clone());
    let publisher_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        publisher.run(publisher_shutdown).await;
    });

    // Frame channel (bounded for backpressure)
    let (frame_tx, frame_rx) = mpsc::channel(config.frame_queue_capacity());

    // Ingest health signal, logged on every change
    let (health_tx, mut health_rx) = watch::channel(StreamHealth::Live);
    tokio::spawn(async move {
        while health_rx.changed().await.is_ok() {
            let health = *health_rx.borrow();
            match health {
                StreamHealth::Live => info!(health = %health.as_str(), "ingest_health_changed"),
                _ => warn!(health = %health.as_str(), "ingest_health_changed"),
            }
        }
    });

    // Start MQTT detection ingest
    let ingest_config = config.clone();
    let ingest_metrics = metrics.clone();
    let ingest_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_detection_ingest(
            &ingest_config,
            frame_tx,
            ingest_metrics,
            health_tx,
            ingest_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "Detection ingest error");
        }
    });

    // Start metrics reporter (lock-free reads)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the supervisor - routes frames to per-stream engines until the
    // ingest channel closes
    let mut supervisor = EngineSupervisor::new(config, event_sender, metrics);
    info!("supervisor_started");
    supervisor.run(frame_rx).await;

    info!("leftwatchd shutdown complete");
    Ok(())
}
