//! End-to-end pipeline tests: supervisor routing, per-stream isolation and
//! event hand-off

use leftwatch::domain::geometry::BBox;
use leftwatch::domain::types::{Detection, FrameObservations, TrackId};
use leftwatch::infra::{Config, Metrics};
use leftwatch::io::create_event_channel;
use leftwatch::services::EngineSupervisor;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

const OBJECT_CLASS: i64 = 24;
const PERSON_CLASS: i64 = 0;

fn detection(class_id: i64, track_id: Option<i64>) -> Detection {
    Detection {
        bbox: BBox::new(300.0, 400.0, 400.0, 500.0),
        class_id,
        confidence: 0.8,
        track_id: track_id.map(TrackId),
    }
}

fn frame(stream_id: &str, index: u64, detections: Vec<Detection>) -> FrameObservations {
    FrameObservations {
        stream_id: stream_id.to_string(),
        frame_index: index,
        frame_width: 1920,
        frame_height: 1080,
        detections,
        snapshot: None,
        received_at: Instant::now(),
    }
}

/// Frames reproducing one abandonment incident: owner present through frame
/// 5, object visible alone until one frame past the 40-frame threshold.
fn incident_frames(stream_id: &str) -> Vec<FrameObservations> {
    let mut frames = Vec::new();
    for i in 0..=5 {
        frames.push(frame(
            stream_id,
            i,
            vec![detection(OBJECT_CLASS, Some(100)), detection(PERSON_CLASS, Some(9))],
        ));
    }
    for i in 6..=46 {
        frames.push(frame(stream_id, i, vec![detection(OBJECT_CLASS, Some(100))]));
    }
    frames
}

#[tokio::test]
async fn test_independent_streams_each_emit_their_own_event() {
    let config = Config::default();
    let metrics = Arc::new(Metrics::new());
    let (event_sender, mut event_rx) =
        create_event_channel(64, "test-site".to_string(), metrics.clone());

    let (frame_tx, frame_rx) = mpsc::channel(256);
    let mut supervisor = EngineSupervisor::new(config, event_sender, metrics.clone());
    let supervisor_task = tokio::spawn(async move {
        supervisor.run(frame_rx).await;
    });

    // Interleave two cameras observing identical incidents
    let cam_a = incident_frames("cam-a");
    let cam_b = incident_frames("cam-b");
    for (a, b) in cam_a.into_iter().zip(cam_b.into_iter()) {
        frame_tx.send(a).await.unwrap();
        frame_tx.send(b).await.unwrap();
    }

    let mut streams_seen = Vec::new();
    for _ in 0..2 {
        let event = timeout(Duration::from_secs(5), event_rx.recv())
            .await
            .expect("event should arrive")
            .expect("channel open");
        assert_eq!(event.frame_index, 46);
        assert_eq!(event.object_class_id, OBJECT_CLASS);
        assert_eq!(event.site.as_deref(), Some("test-site"));
        streams_seen.push(event.stream_id);
    }
    streams_seen.sort();
    assert_eq!(streams_seen, vec!["cam-a".to_string(), "cam-b".to_string()]);

    // Exactly one event per stream, none extra
    assert!(event_rx.try_recv().is_err());

    drop(frame_tx);
    timeout(Duration::from_secs(5), supervisor_task).await.unwrap().unwrap();
    assert_eq!(metrics.report().events_emitted, 2);
}

#[tokio::test]
async fn test_supervisor_spawns_engine_per_stream() {
    let config = Config::default();
    let metrics = Arc::new(Metrics::new());
    let (event_sender, _event_rx) = create_event_channel(8, "test".to_string(), metrics.clone());

    let (frame_tx, frame_rx) = mpsc::channel(64);
    let mut supervisor = EngineSupervisor::new(config, event_sender, metrics.clone());
    let supervisor_task = tokio::spawn(async move {
        supervisor.run(frame_rx).await;
    });

    for stream in ["cam-1", "cam-2", "cam-3"] {
        frame_tx.send(frame(stream, 0, vec![])).await.unwrap();
    }

    // Engines stay alive while their channels exist
    timeout(Duration::from_secs(5), async {
        while metrics.active_streams() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("three engines should start");

    drop(frame_tx);
    timeout(Duration::from_secs(5), supervisor_task).await.unwrap().unwrap();

    // Dropping the supervisor's senders winds the engines down
    timeout(Duration::from_secs(5), async {
        while metrics.active_streams() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("engines should stop");
}
