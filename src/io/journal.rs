//! Local event journal - appends emitted events to a file
//!
//! Events are written in JSONL format (one JSON object per line) as they are
//! published, independent of Event Store delivery, so incidents survive a
//! backend outage for offline inspection.

use crate::domain::event::AbandonEvent;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Journal writer for abandonment events
pub struct Journal {
    file_path: String,
}

impl Journal {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "journal_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write an event to the journal file
    /// Returns true if successful, false otherwise
    pub fn write_event(&self, event: &AbandonEvent) -> bool {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!(event_id = %event.event_id, error = %e, "journal_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => {
                debug!(
                    event_id = %event.event_id,
                    stream_id = %event.stream_id,
                    "event_journaled"
                );
                true
            }
            Err(e) => {
                error!(
                    event_id = %event.event_id,
                    error = %e,
                    "journal_write_failed"
                );
                false
            }
        }
    }

    /// Append a line to the journal file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{new_event_id, rfc3339_now};
    use crate::domain::types::{Owner, TrackId};
    use std::fs;
    use tempfile::tempdir;

    fn sample_event() -> AbandonEvent {
        AbandonEvent {
            event_id: new_event_id(),
            site: Some("test".to_string()),
            stream_id: "cam-1".to_string(),
            frame_index: 46,
            timestamp: rfc3339_now(),
            bbox: [10.0, 20.0, 60.0, 90.0],
            object_class_id: 24,
            owner_id: Some(Owner::Person(TrackId(9))),
            frame_snapshot_base64: None,
        }
    }

    #[test]
    fn test_write_event() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("events.jsonl");
        let journal = Journal::new(file_path.to_str().unwrap());

        let event = sample_event();
        assert!(journal.write_event(&event));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["event_id"], event.event_id);
        assert_eq!(parsed["owner_id"], serde_json::json!(9));
        assert_eq!(parsed["object_class_id"], serde_json::json!(24));
    }

    #[test]
    fn test_append_mode_keeps_existing_lines() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("events.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let journal = Journal::new(file_path.to_str().unwrap());
        journal.write_event(&sample_event());

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("existing"));
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("events.jsonl");
        let journal = Journal::new(nested.to_str().unwrap());

        assert!(journal.write_event(&sample_event()));
        assert!(nested.exists());
    }
}
