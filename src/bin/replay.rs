//! Offline replay of a recorded detection capture
//!
//! Reads detector frame messages (one JSON object per line) from a file,
//! runs them through a stream engine with the same configuration as the
//! daemon, and prints every abandonment event to stdout as JSON. Useful for
//! tuning thresholds against recorded footage without a broker or backend.

use clap::Parser;
use leftwatch::infra::{Config, Metrics};
use leftwatch::io::create_event_channel;
use leftwatch::io::detections::parse_frame_message;
use leftwatch::services::StreamEngine;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Replay recorded detection frames through the abandonment engine
#[derive(Parser, Debug)]
#[command(name = "replay", version, about)]
struct Args {
    /// Path to a JSONL capture of detector frame messages
    input: String,

    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Stream id to use for frames that do not carry one
    #[arg(long, default_value = "replay")]
    stream_id: String,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    let config = Config::load_from_path(&args.config);
    config.validate()?;

    let metrics = Arc::new(Metrics::new());
    let (sender, mut event_rx) = create_event_channel(
        config.event_queue_capacity(),
        config.site_id().to_string(),
        metrics.clone(),
    );
    let mut engine = StreamEngine::new(args.stream_id.clone(), config, sender, metrics);

    let file = File::open(&args.input)?;
    let reader = BufReader::new(file);

    let mut frames = 0usize;
    let mut events = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(frame) = parse_frame_message(&args.stream_id, &line, Instant::now()) else {
            warn!(line = %(line_no + 1), "unparseable_frame_skipped");
            continue;
        };
        engine.process_frame(frame);
        frames += 1;

        while let Ok(event) = event_rx.try_recv() {
            events += 1;
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    info!(
        frames = %frames,
        events = %events,
        tracked_objects = %engine.tracked_objects(),
        "replay_complete"
    );
    Ok(())
}
