//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600
const BUCKET_BOUNDS: [u64; 10] = [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps interval counters for a
/// consistent snapshot.
pub struct Metrics {
    /// Frames ever processed across all streams (monotonic)
    frames_total: AtomicU64,
    /// Frames since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Sum of per-frame processing latencies in microseconds (reset on report)
    frame_latency_sum_us: AtomicU64,
    /// Max per-frame processing latency (reset on report)
    frame_latency_max_us: AtomicU64,
    /// Frame processing latency histogram buckets (reset on report)
    frame_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Detections accepted into the pipeline (monotonic)
    detections_total: AtomicU64,
    /// Detections dropped as malformed before the registry (monotonic)
    malformed_dropped_total: AtomicU64,
    /// Frames dropped because the frame queue was full (monotonic)
    frames_dropped_total: AtomicU64,
    /// Frames dropped for non-advancing frame index (monotonic)
    out_of_order_frames_total: AtomicU64,
    /// Tracked objects created (monotonic)
    objects_created_total: AtomicU64,
    /// Tracked objects purged by GC (monotonic)
    gc_removed_total: AtomicU64,
    /// Abandonment events emitted into the channel (monotonic)
    events_emitted_total: AtomicU64,
    /// Abandonment events dropped because the event queue was full (monotonic)
    events_dropped_total: AtomicU64,
    /// Events delivered to the Event Store (monotonic)
    sink_delivered_total: AtomicU64,
    /// Events abandoned after exhausting delivery retries (monotonic)
    sink_failures_total: AtomicU64,
    /// Currently running stream engines (gauge)
    active_streams: AtomicU64,
    /// Last report time (only accessed from the reporter task)
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            frame_latency_sum_us: AtomicU64::new(0),
            frame_latency_max_us: AtomicU64::new(0),
            frame_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            detections_total: AtomicU64::new(0),
            malformed_dropped_total: AtomicU64::new(0),
            frames_dropped_total: AtomicU64::new(0),
            out_of_order_frames_total: AtomicU64::new(0),
            objects_created_total: AtomicU64::new(0),
            gc_removed_total: AtomicU64::new(0),
            events_emitted_total: AtomicU64::new(0),
            events_dropped_total: AtomicU64::new(0),
            sink_delivered_total: AtomicU64::new(0),
            sink_failures_total: AtomicU64::new(0),
            active_streams: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record one processed frame with its processing latency
    pub fn record_frame_processed(&self, latency_us: u64) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        self.frame_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.frame_latency_max_us, latency_us);
        self.frame_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detections(&self, count: usize) {
        self.detections_total.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_malformed_dropped(&self) {
        self.malformed_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_out_of_order_frame(&self) {
        self.out_of_order_frames_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_object_created(&self) {
        self.objects_created_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gc_removed(&self, count: usize) {
        self.gc_removed_total.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_event_emitted(&self) {
        self.events_emitted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_delivered(&self) {
        self.sink_delivered_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_started(&self) {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_stopped(&self) {
        self.active_streams.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_streams(&self) -> u64 {
        self.active_streams.load(Ordering::Relaxed)
    }

    /// Snapshot interval counters (swapping them to zero) and monotonic totals
    pub fn report(&self) -> MetricsSummary {
        let frames_interval = self.frames_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.frame_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.frame_latency_max_us.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.frame_latency_buckets);

        let avg_latency_us =
            if frames_interval > 0 { latency_sum / frames_interval } else { 0 };

        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_interval,
            avg_frame_latency_us: avg_latency_us,
            max_frame_latency_us: latency_max,
            frame_lat_p50_us: percentile_from_buckets(&buckets, 0.50),
            frame_lat_p95_us: percentile_from_buckets(&buckets, 0.95),
            frame_lat_p99_us: percentile_from_buckets(&buckets, 0.99),
            detections_total: self.detections_total.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped_total.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped_total.load(Ordering::Relaxed),
            out_of_order_frames: self.out_of_order_frames_total.load(Ordering::Relaxed),
            objects_created: self.objects_created_total.load(Ordering::Relaxed),
            gc_removed: self.gc_removed_total.load(Ordering::Relaxed),
            events_emitted: self.events_emitted_total.load(Ordering::Relaxed),
            events_dropped: self.events_dropped_total.load(Ordering::Relaxed),
            sink_delivered: self.sink_delivered_total.load(Ordering::Relaxed),
            sink_failures: self.sink_failures_total.load(Ordering::Relaxed),
            active_streams: self.active_streams.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of all metrics at report time
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub frames_total: u64,
    pub frames_interval: u64,
    pub avg_frame_latency_us: u64,
    pub max_frame_latency_us: u64,
    pub frame_lat_p50_us: u64,
    pub frame_lat_p95_us: u64,
    pub frame_lat_p99_us: u64,
    pub detections_total: u64,
    pub malformed_dropped: u64,
    pub frames_dropped: u64,
    pub out_of_order_frames: u64,
    pub objects_created: u64,
    pub gc_removed: u64,
    pub events_emitted: u64,
    pub events_dropped: u64,
    pub sink_delivered: u64,
    pub sink_failures: u64,
    pub active_streams: u64,
}

impl MetricsSummary {
    /// Emit the summary as a structured log record
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            frames_total = %self.frames_total,
            frames_interval = %self.frames_interval,
            avg_frame_latency_us = %self.avg_frame_latency_us,
            max_frame_latency_us = %self.max_frame_latency_us,
            frame_lat_p50_us = %self.frame_lat_p50_us,
            frame_lat_p95_us = %self.frame_lat_p95_us,
            frame_lat_p99_us = %self.frame_lat_p99_us,
            detections_total = %self.detections_total,
            malformed_dropped = %self.malformed_dropped,
            frames_dropped = %self.frames_dropped,
            out_of_order_frames = %self.out_of_order_frames,
            objects_created = %self.objects_created,
            gc_removed = %self.gc_removed,
            events_emitted = %self.events_emitted,
            events_dropped = %self.events_dropped,
            sink_delivered = %self.sink_delivered,
            sink_failures = %self.sink_failures,
            active_streams = %self.active_streams,
            "metrics_report"
        );
    }
}
