//! Configuration loading from TOML files
//!
//! All detection thresholds are numeric knobs with defaults matching the
//! production deployment; a config file only needs to override what differs.
//! `validate()` runs before any frame is processed and is the only fatal
//! error path in the system.

use anyhow::{bail, Context};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier included in every emitted event
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "leftwatch".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Topic filter for detector frame messages; one topic per stream
    #[serde(default = "default_frames_topic")]
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Bounded frame queue between ingest and the engines
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            topic: default_frames_topic(),
            username: None,
            password: None,
            frame_queue_capacity: default_frame_queue_capacity(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_frames_topic() -> String {
    "leftwatch/frames/#".to_string()
}

fn default_frame_queue_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventStoreConfig {
    /// Event intake endpoint of the backend
    #[serde(default = "default_event_store_url")]
    pub url: String,
    #[serde(default = "default_event_timeout_ms")]
    pub timeout_ms: u64,
    /// Delivery attempts per event before it is dropped
    #[serde(default = "default_event_retry_attempts")]
    pub retry_attempts: u32,
    /// Bounded event queue between the engines and the publisher
    #[serde(default = "default_event_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            url: default_event_store_url(),
            timeout_ms: default_event_timeout_ms(),
            retry_attempts: default_event_retry_attempts(),
            queue_capacity: default_event_queue_capacity(),
        }
    }
}

fn default_event_store_url() -> String {
    "http://127.0.0.1:8000/internal/events".to_string()
}

fn default_event_timeout_ms() -> u64 {
    5000
}

fn default_event_retry_attempts() -> u32 {
    3
}

fn default_event_queue_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    /// File path for the local event journal (JSONL format)
    #[serde(default = "default_journal_file")]
    pub file: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self { file: default_journal_file() }
    }
}

fn default_journal_file() -> String {
    "events.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Frame rate the upstream detector samples at
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    #[serde(default = "default_object_confidence_threshold")]
    pub object_confidence_threshold: f64,
    /// Boxes smaller than this fraction of the frame are noise
    #[serde(default = "default_min_object_area_fraction")]
    pub min_object_area_fraction: f64,
    /// Boxes larger than this fraction of the frame are not portable objects
    #[serde(default = "default_max_object_area_fraction")]
    pub max_object_area_fraction: f64,
    #[serde(default = "default_person_class_id")]
    pub person_class_id: i64,
    /// Categories eligible for abandonment; empty means use the default set
    #[serde(default)]
    pub leavable_class_ids: Vec<i64>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            object_confidence_threshold: default_object_confidence_threshold(),
            min_object_area_fraction: default_min_object_area_fraction(),
            max_object_area_fraction: default_max_object_area_fraction(),
            person_class_id: default_person_class_id(),
            leavable_class_ids: Vec::new(),
        }
    }
}

fn default_target_fps() -> u32 {
    10
}

fn default_object_confidence_threshold() -> f64 {
    0.4
}

fn default_min_object_area_fraction() -> f64 {
    0.0005
}

fn default_max_object_area_fraction() -> f64 {
    0.2
}

fn default_person_class_id() -> i64 {
    0
}

/// COCO classes minus persons and vehicles; vehicles linger legitimately
fn default_leavable_class_ids() -> Vec<i64> {
    (0..80).filter(|c| ![0, 2, 3, 4, 5, 6, 7].contains(c)).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationConfig {
    /// Maximum center distance (pixels) for nearest-neighbor matching
    #[serde(default = "default_max_coord_distance")]
    pub max_coord_distance: f64,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self { max_coord_distance: default_max_coord_distance() }
    }
}

fn default_max_coord_distance() -> f64 {
    40.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnershipConfig {
    /// Grace period after first detection during which ownership may form
    #[serde(default = "default_appear_window_frames")]
    pub appear_window_frames: u64,
    /// Minimum person-object IoU for initial ownership
    #[serde(default = "default_min_initial_iou")]
    pub min_initial_iou: f64,
    /// Low overlap threshold for "person still nearby" evidence
    #[serde(default = "default_near_iou")]
    pub near_iou: f64,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            appear_window_frames: default_appear_window_frames(),
            min_initial_iou: default_min_initial_iou(),
            near_iou: default_near_iou(),
        }
    }
}

fn default_appear_window_frames() -> u64 {
    12
}

fn default_min_initial_iou() -> f64 {
    0.05
}

fn default_near_iou() -> f64 {
    0.05
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbandonmentConfig {
    /// Seconds of owner absence before a visible object is flagged
    #[serde(default = "default_left_seconds")]
    pub left_seconds: u32,
}

impl Default for AbandonmentConfig {
    fn default() -> Self {
        Self { left_seconds: default_left_seconds() }
    }
}

fn default_left_seconds() -> u32 {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub event_store: EventStoreConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub association: AssociationConfig,
    #[serde(default)]
    pub ownership: OwnershipConfig,
    #[serde(default)]
    pub abandonment: AbandonmentConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    frame_queue_capacity: usize,
    event_store_url: String,
    event_store_timeout_ms: u64,
    event_retry_attempts: u32,
    event_queue_capacity: usize,
    journal_file: String,
    target_fps: u32,
    object_confidence_threshold: f64,
    min_object_area_fraction: f64,
    max_object_area_fraction: f64,
    person_class_id: i64,
    leavable_class_ids: FxHashSet<i64>,
    max_coord_distance: f64,
    appear_window_frames: u64,
    min_initial_iou: f64,
    near_iou: f64,
    left_seconds: u32,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, source: &str) -> Self {
        let leavable = if toml_config.detection.leavable_class_ids.is_empty() {
            default_leavable_class_ids()
        } else {
            toml_config.detection.leavable_class_ids
        };

        Self {
            site_id: toml_config.site.id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_topic: toml_config.mqtt.topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            frame_queue_capacity: toml_config.mqtt.frame_queue_capacity,
            event_store_url: toml_config.event_store.url,
            event_store_timeout_ms: toml_config.event_store.timeout_ms,
            event_retry_attempts: toml_config.event_store.retry_attempts,
            event_queue_capacity: toml_config.event_store.queue_capacity,
            journal_file: toml_config.journal.file,
            target_fps: toml_config.detection.target_fps,
            object_confidence_threshold: toml_config.detection.object_confidence_threshold,
            min_object_area_fraction: toml_config.detection.min_object_area_fraction,
            max_object_area_fraction: toml_config.detection.max_object_area_fraction,
            person_class_id: toml_config.detection.person_class_id,
            leavable_class_ids: leavable.into_iter().collect(),
            max_coord_distance: toml_config.association.max_coord_distance,
            appear_window_frames: toml_config.ownership.appear_window_frames,
            min_initial_iou: toml_config.ownership.min_initial_iou,
            near_iou: toml_config.ownership.near_iou,
            left_seconds: toml_config.abandonment.left_seconds,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: source.to_string(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {e:#}. Using defaults.");
                Self::default()
            }
        }
    }

    /// Fail-fast precondition check, run once at startup before any frame.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.target_fps == 0 {
            bail!("detection.target_fps must be at least 1");
        }
        if self.left_seconds == 0 {
            bail!("abandonment.left_seconds must be at least 1");
        }
        if !(self.max_coord_distance.is_finite() && self.max_coord_distance > 0.0) {
            bail!("association.max_coord_distance must be a positive finite number");
        }
        if !(0.0..=1.0).contains(&self.min_initial_iou) {
            bail!("ownership.min_initial_iou must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.near_iou) {
            bail!("ownership.near_iou must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.object_confidence_threshold) {
            bail!("detection.object_confidence_threshold must be within [0, 1]");
        }
        if self.min_object_area_fraction < 0.0
            || self.max_object_area_fraction > 1.0
            || self.min_object_area_fraction >= self.max_object_area_fraction
        {
            bail!(
                "detection object area band [{}, {}] must satisfy 0 <= min < max <= 1",
                self.min_object_area_fraction,
                self.max_object_area_fraction
            );
        }
        if self.leavable_class_ids.is_empty() {
            bail!("detection.leavable_class_ids must not be empty");
        }
        if self.leavable_class_ids.contains(&self.person_class_id) {
            bail!(
                "detection.person_class_id {} must not appear in leavable_class_ids",
                self.person_class_id
            );
        }
        if self.event_store_url.is_empty() {
            bail!("event_store.url must not be empty");
        }
        if self.event_queue_capacity == 0 || self.frame_queue_capacity == 0 {
            bail!("queue capacities must be at least 1");
        }
        Ok(())
    }

    /// Frames of owner absence before a visible object is flagged
    #[inline]
    pub fn abandonment_threshold_frames(&self) -> u64 {
        self.left_seconds as u64 * self.target_fps as u64
    }

    /// Frames of total invisibility before an entry is purged
    #[inline]
    pub fn gc_threshold_frames(&self) -> u64 {
        5 * self.abandonment_threshold_frames()
    }

    #[inline]
    pub fn is_person_class(&self, class_id: i64) -> bool {
        class_id == self.person_class_id
    }

    #[inline]
    pub fn is_leavable_class(&self, class_id: i64) -> bool {
        self.leavable_class_ids.contains(&class_id)
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn frame_queue_capacity(&self) -> usize {
        self.frame_queue_capacity
    }

    pub fn event_store_url(&self) -> &str {
        &self.event_store_url
    }

    pub fn event_store_timeout_ms(&self) -> u64 {
        self.event_store_timeout_ms
    }

    pub fn event_retry_attempts(&self) -> u32 {
        self.event_retry_attempts
    }

    pub fn event_queue_capacity(&self) -> usize {
        self.event_queue_capacity
    }

    pub fn journal_file(&self) -> &str {
        &self.journal_file
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    pub fn object_confidence_threshold(&self) -> f64 {
        self.object_confidence_threshold
    }

    pub fn min_object_area_fraction(&self) -> f64 {
        self.min_object_area_fraction
    }

    pub fn max_object_area_fraction(&self) -> f64 {
        self.max_object_area_fraction
    }

    pub fn person_class_id(&self) -> i64 {
        self.person_class_id
    }

    pub fn max_coord_distance(&self) -> f64 {
        self.max_coord_distance
    }

    pub fn appear_window_frames(&self) -> u64 {
        self.appear_window_frames
    }

    pub fn min_initial_iou(&self) -> f64 {
        self.min_initial_iou
    }

    pub fn near_iou(&self) -> f64 {
        self.near_iou
    }

    pub fn left_seconds(&self) -> u32 {
        self.left_seconds
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to shrink the abandonment window
    #[cfg(test)]
    pub fn with_left_seconds(mut self, secs: u32) -> Self {
        self.left_seconds = secs;
        self
    }

    /// Builder method for tests to set the sampling rate
    #[cfg(test)]
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Builder method for tests to widen or narrow the appear window
    #[cfg(test)]
    pub fn with_appear_window_frames(mut self, frames: u64) -> Self {
        self.appear_window_frames = frames;
        self
    }
}
