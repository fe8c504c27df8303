//! Abandonment event payload handed to the Event Store boundary

use crate::domain::types::Owner;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_event_id() -> String {
    Uuid::now_v7().to_string()
}

/// Current wall-clock time as an RFC 3339 string
pub fn rfc3339_now() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Payload emitted once per abandonment incident.
///
/// `owner_id` serializes as the concrete person id, the string `"unknown"`,
/// or null, matching the Event Store's tri-state contract.
#[derive(Debug, Clone, Serialize)]
pub struct AbandonEvent {
    pub event_id: String,
    /// Site identifier, injected by the event sender
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub stream_id: String,
    pub frame_index: u64,
    /// RFC 3339 wall-clock time at flagging
    pub timestamp: String,
    /// `[x1, y1, x2, y2]` of the object at flagging
    pub bbox: [f64; 4],
    pub object_class_id: i64,
    pub owner_id: Option<Owner>,
    /// Base64 JPEG snapshot passthrough from the flagging frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_snapshot_base64: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TrackId;

    fn sample_event(owner: Option<Owner>) -> AbandonEvent {
        AbandonEvent {
            event_id: new_event_id(),
            site: None,
            stream_id: "cam-1".to_string(),
            frame_index: 46,
            timestamp: rfc3339_now(),
            bbox: [10.0, 20.0, 60.0, 90.0],
            object_class_id: 24,
            owner_id: owner,
            frame_snapshot_base64: None,
        }
    }

    #[test]
    fn test_concrete_owner_serializes_as_number() {
        let json = serde_json::to_value(sample_event(Some(Owner::Person(TrackId(7))))).unwrap();
        assert_eq!(json["owner_id"], serde_json::json!(7));
        assert_eq!(json["object_class_id"], serde_json::json!(24));
        assert!(json.get("frame_snapshot_base64").is_none());
    }

    #[test]
    fn test_unknown_owner_serializes_as_sentinel_string() {
        let json = serde_json::to_value(sample_event(Some(Owner::Unknown))).unwrap();
        assert_eq!(json["owner_id"], serde_json::json!("unknown"));
    }

    #[test]
    fn test_absent_owner_serializes_as_null() {
        let json = serde_json::to_value(sample_event(None)).unwrap();
        assert!(json["owner_id"].is_null());
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ts = rfc3339_now();
        assert!(OffsetDateTime::parse(&ts, &Rfc3339).is_ok());
    }

    #[test]
    fn test_event_ids_are_unique_and_sortable() {
        let a = new_event_id();
        let b = new_event_id();
        assert_ne!(a, b);
        // UUIDv7 is time-ordered, so consecutive ids sort in creation order
        assert!(a < b);
    }
}
