//! Integration tests for configuration loading

use leftwatch::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "station-west"

[mqtt]
host = "broker.internal"
port = 1884
topic = "detectors/frames/#"

[event_store]
url = "http://backend.internal:8000/internal/events"
timeout_ms = 2000
retry_attempts = 5
queue_capacity = 64

[journal]
file = "/var/log/leftwatch/events.jsonl"

[detection]
target_fps = 15
object_confidence_threshold = 0.5
min_object_area_fraction = 0.001
max_object_area_fraction = 0.3
person_class_id = 0
leavable_class_ids = [24, 26, 28]

[association]
max_coord_distance = 60.0

[ownership]
appear_window_frames = 20
min_initial_iou = 0.1
near_iou = 0.03

[abandonment]
left_seconds = 6

[metrics]
interval_secs = 30
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "station-west");
    assert_eq!(config.mqtt_host(), "broker.internal");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_topic(), "detectors/frames/#");
    assert_eq!(config.event_store_url(), "http://backend.internal:8000/internal/events");
    assert_eq!(config.event_store_timeout_ms(), 2000);
    assert_eq!(config.event_retry_attempts(), 5);
    assert_eq!(config.event_queue_capacity(), 64);
    assert_eq!(config.journal_file(), "/var/log/leftwatch/events.jsonl");
    assert_eq!(config.target_fps(), 15);
    assert!((config.object_confidence_threshold() - 0.5).abs() < 1e-12);
    assert_eq!(config.person_class_id(), 0);
    assert!(config.is_leavable_class(24));
    assert!(config.is_leavable_class(28));
    assert!(!config.is_leavable_class(25));
    assert!((config.max_coord_distance() - 60.0).abs() < 1e-12);
    assert_eq!(config.appear_window_frames(), 20);
    assert_eq!(config.left_seconds(), 6);
    assert_eq!(config.abandonment_threshold_frames(), 90);
    assert_eq!(config.gc_threshold_frames(), 450);
    assert_eq!(config.metrics_interval_secs(), 30);

    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_config_fills_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[mqtt]
host = "10.0.0.5"

[abandonment]
left_seconds = 8
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.mqtt_host(), "10.0.0.5");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.left_seconds(), 8);
    assert_eq!(config.target_fps(), 10);
    assert_eq!(config.abandonment_threshold_frames(), 80);
    // Default leavable set kicks in when the section is absent
    assert!(config.is_leavable_class(24));
    assert!(!config.is_leavable_class(0));
}

#[test]
fn test_missing_file_errors() {
    let result = Config::from_file("/nonexistent/leftwatch.toml");
    assert!(result.is_err());
    let err = format!("{:#}", result.unwrap_err());
    assert!(err.contains("Failed to read config file"));
}

#[test]
fn test_malformed_toml_errors() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"this is { not toml").unwrap();
    temp_file.flush().unwrap();

    let result = Config::from_file(temp_file.path());
    assert!(result.is_err());
    let err = format!("{:#}", result.unwrap_err());
    assert!(err.contains("Failed to parse config file"));
}

#[test]
fn test_inconsistent_config_fails_validation() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[detection]
target_fps = 0
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    // Parsing succeeds; validation is the fail-fast gate at startup
    let config = Config::from_file(temp_file.path()).unwrap();
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("target_fps"));
}

#[test]
fn test_person_class_in_leavable_set_fails_validation() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[detection]
person_class_id = 0
leavable_class_ids = [0, 24]
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert!(config.validate().is_err());
}
