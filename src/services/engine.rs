//! Per-stream frame processing and stream supervision
//!
//! One `StreamEngine` per camera stream, each owning a disjoint registry.
//! Frames within a stream are processed strictly sequentially because the
//! registry's temporal fields are deltas between consecutive frame indices;
//! streams run as independent tasks with no shared mutable state.

use crate::domain::event::{new_event_id, rfc3339_now, AbandonEvent};
use crate::domain::types::{Detection, FrameObservations, PersonObservation};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::event_channel::EventSender;
use crate::services::abandonment::AbandonmentEvaluator;
use crate::services::association::{Association, AssociationEngine};
use crate::services::ownership::OwnershipResolver;
use crate::services::registry::ObjectRegistry;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Frame processor for a single stream
pub struct StreamEngine {
    stream_id: String,
    config: Config,
    registry: ObjectRegistry,
    association: AssociationEngine,
    ownership: OwnershipResolver,
    evaluator: AbandonmentEvaluator,
    events: EventSender,
    metrics: Arc<Metrics>,
    last_frame_index: Option<u64>,
}

impl StreamEngine {
    pub fn new(
        stream_id: String,
        config: Config,
        events: EventSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        let association = AssociationEngine::new(config.max_coord_distance());
        let ownership = OwnershipResolver::new(
            config.appear_window_frames(),
            config.min_initial_iou(),
            config.near_iou(),
        );
        let evaluator = AbandonmentEvaluator::new(config.abandonment_threshold_frames());
        Self {
            stream_id,
            config,
            registry: ObjectRegistry::new(),
            association,
            ownership,
            evaluator,
            events,
            metrics,
            last_frame_index: None,
        }
    }

    /// Consume frames until the channel closes.
    pub async fn run(mut self, mut frame_rx: mpsc::Receiver<FrameObservations>) {
        self.metrics.stream_started();
        info!(
            stream_id = %self.stream_id,
            threshold_frames = %self.evaluator.threshold_frames(),
            "stream_engine_started"
        );

        while let Some(frame) = frame_rx.recv().await {
            self.process_frame(frame);
        }

        self.metrics.stream_stopped();
        info!(
            stream_id = %self.stream_id,
            tracked_objects = %self.registry.len(),
            "stream_engine_stopped"
        );
    }

    /// Run one frame through association, ownership and evaluation.
    pub fn process_frame(&mut self, frame: FrameObservations) {
        let process_start = Instant::now();

        // Temporal deltas assume advancing indices; duplicates and reordered
        // frames from upstream are dropped rather than corrupting them
        if let Some(last) = self.last_frame_index {
            if frame.frame_index <= last {
                self.metrics.record_out_of_order_frame();
                warn!(
                    stream_id = %self.stream_id,
                    frame = %frame.frame_index,
                    last = %last,
                    "frame_index_not_advancing"
                );
                return;
            }
        }
        self.last_frame_index = Some(frame.frame_index);
        let now = frame.frame_index;

        let (persons, objects) = self.partition(&frame);
        self.metrics.record_detections(persons.len() + objects.len());

        for det in &objects {
            match self.association.associate(&self.registry, det) {
                Association::Existing(key) => self.registry.touch(key, det.bbox, now),
                Association::Create => {
                    self.registry.insert_new(det, now);
                    self.metrics.record_object_created();
                }
            }
        }

        self.ownership.resolve(&mut self.registry, &persons, now);

        let outcome = self.evaluator.evaluate(&mut self.registry, now);
        if outcome.removed > 0 {
            self.metrics.record_gc_removed(outcome.removed);
        }

        for flagged in outcome.flagged {
            self.events.send_abandon(AbandonEvent {
                event_id: new_event_id(),
                site: None,
                stream_id: self.stream_id.clone(),
                frame_index: now,
                timestamp: rfc3339_now(),
                bbox: flagged.bbox.to_corners(),
                object_class_id: flagged.class_id,
                owner_id: flagged.owner,
                frame_snapshot_base64: frame.snapshot.clone(),
            });
        }

        self.metrics.record_frame_processed(process_start.elapsed().as_micros() as u64);
    }

    /// Split a frame into person observations and eligible object detections.
    ///
    /// Malformed boxes are filtered silently; objects additionally pass the
    /// confidence threshold and the frame-area fraction band.
    fn partition(
        &self,
        frame: &FrameObservations,
    ) -> (SmallVec<[PersonObservation; 8]>, Vec<Detection>) {
        let frame_area = frame.frame_area();
        let mut persons = SmallVec::new();
        let mut objects = Vec::new();

        for det in &frame.detections {
            if !det.bbox.is_valid() || !det.confidence.is_finite() {
                self.metrics.record_malformed_dropped();
                debug!(stream_id = %self.stream_id, class_id = %det.class_id, "malformed_detection_dropped");
                continue;
            }
            if det.confidence < self.config.object_confidence_threshold() {
                continue;
            }

            if self.config.is_person_class(det.class_id) {
                persons.push(PersonObservation { bbox: det.bbox, track_id: det.track_id });
            } else if self.config.is_leavable_class(det.class_id) {
                let area_fraction = det.bbox.area() / frame_area;
                if area_fraction < self.config.min_object_area_fraction()
                    || area_fraction > self.config.max_object_area_fraction()
                {
                    continue;
                }
                objects.push(det.clone());
            }
        }

        (persons, objects)
    }

    /// Number of live registry entries
    pub fn tracked_objects(&self) -> usize {
        self.registry.len()
    }
}

/// Routes frames to per-stream engines, spawning one on first sight
pub struct EngineSupervisor {
    config: Config,
    events: EventSender,
    metrics: Arc<Metrics>,
    streams: FxHashMap<String, mpsc::Sender<FrameObservations>>,
    last_drop_warn: Instant,
}

impl EngineSupervisor {
    pub fn new(config: Config, events: EventSender, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            events,
            metrics,
            streams: FxHashMap::default(),
            last_drop_warn: Instant::now() - Duration::from_secs(2),
        }
    }

    /// Dispatch frames until the ingest channel closes. Dropping the
    /// supervisor closes every per-stream channel, which stops the engines.
    pub async fn run(&mut self, mut frame_rx: mpsc::Receiver<FrameObservations>) {
        while let Some(frame) = frame_rx.recv().await {
            self.dispatch(frame);
        }
        info!(streams = %self.streams.len(), "supervisor_stopped");
    }

    fn dispatch(&mut self, frame: FrameObservations) {
        if !self.streams.contains_key(&frame.stream_id) {
            let (tx, rx) = mpsc::channel(self.config.frame_queue_capacity());
            let engine = StreamEngine::new(
                frame.stream_id.clone(),
                self.config.clone(),
                self.events.clone(),
                self.metrics.clone(),
            );
            info!(stream_id = %frame.stream_id, "stream_engine_spawned");
            tokio::spawn(engine.run(rx));
            self.streams.insert(frame.stream_id.clone(), tx);
        }

        let Some(tx) = self.streams.get(&frame.stream_id) else { return };
        match tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                self.metrics.record_frame_dropped();
                if self.last_drop_warn.elapsed() > Duration::from_secs(1) {
                    warn!(stream_id = %frame.stream_id, "frame_dropped_engine_queue_full");
                    self.last_drop_warn = Instant::now();
                }
            }
            Err(TrySendError::Closed(frame)) => {
                warn!(stream_id = %frame.stream_id, "stream_engine_gone");
                self.streams.remove(&frame.stream_id);
            }
        }
    }
}
