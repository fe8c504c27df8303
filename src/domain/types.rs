//! Shared types for the abandonment engine

use crate::domain::geometry::BBox;
use serde::{Deserialize, Serialize, Serializer};
use std::time::Instant;

/// Newtype wrapper for upstream tracker ids to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TrackId(pub i64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry key for a tracked object.
///
/// Detections that carry an upstream track id are keyed by it; untracked
/// detections get a surrogate from the registry's monotonic counter. The
/// derived `Ord` (variant order, then value) gives association a total order
/// for deterministic tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKey {
    External(TrackId),
    Synthetic(u64),
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKey::External(id) => write!(f, "ext:{id}"),
            ObjectKey::Synthetic(n) => write!(f, "syn:{n}"),
        }
    }
}

/// Owner attribution for a tracked object.
///
/// `Unknown` records that a person was present near the object while its
/// identity could not be resolved; together with `Option<Owner>` this gives
/// an explicit concrete/unknown/none tri-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Person(TrackId),
    Unknown,
}

impl Serialize for Owner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Owner::Person(id) => serializer.serialize_i64(id.0),
            Owner::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::Person(id) => write!(f, "person:{id}"),
            Owner::Unknown => write!(f, "unknown"),
        }
    }
}

/// Lifecycle state of a tracked object; transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Tracking,
    Owned,
    Left,
}

impl ObjectState {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectState::Tracking => "tracking",
            ObjectState::Owned => "owned",
            ObjectState::Left => "left",
        }
    }
}

/// One observed object instance in one frame
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BBox,
    pub class_id: i64,
    pub confidence: f64,
    pub track_id: Option<TrackId>,
}

/// One observed person in one frame
#[derive(Debug, Clone)]
pub struct PersonObservation {
    pub bbox: BBox,
    pub track_id: Option<TrackId>,
}

/// All observations for one frame of one stream, as handed to the engine
#[derive(Debug)]
pub struct FrameObservations {
    pub stream_id: String,
    /// Monotonically increasing frame index assigned by the upstream detector
    pub frame_index: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub detections: Vec<Detection>,
    /// Base64 JPEG passthrough, validated at the ingest boundary
    pub snapshot: Option<String>,
    pub received_at: Instant,
}

impl FrameObservations {
    /// Pixel area of the full frame, for the object-size eligibility band.
    #[inline]
    pub fn frame_area(&self) -> f64 {
        self.frame_width as f64 * self.frame_height as f64
    }
}

/// Detector frame message structure for parsing
#[derive(Debug, Deserialize)]
pub struct FrameMessage {
    #[serde(default)]
    pub stream_id: Option<String>,
    pub frame_index: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    #[serde(default)]
    pub detections: Vec<WireDetection>,
    #[serde(default)]
    pub snapshot_base64: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireDetection {
    pub bbox: [f64; 4],
    pub class_id: i64,
    pub confidence: f64,
    /// Absent or null means the upstream tracker had no stable id
    #[serde(default)]
    pub track_id: Option<i64>,
}

/// Mutable per-object state owned exclusively by the registry
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub key: ObjectKey,
    /// Latest known rectangle
    pub bbox: BBox,
    /// Category, immutable after creation
    pub class_id: i64,
    pub appeared_frame: u64,
    pub last_seen_frame: u64,
    pub owner: Option<Owner>,
    /// Most recent frame with evidence of owner proximity
    pub last_owner_frame: Option<u64>,
    /// Most recent frame in which any person overlapped this object
    pub last_person_near_frame: Option<u64>,
    pub state: ObjectState,
}

impl TrackedObject {
    pub fn new(key: ObjectKey, bbox: BBox, class_id: i64, frame_index: u64) -> Self {
        Self {
            key,
            bbox,
            class_id,
            appeared_frame: frame_index,
            last_seen_frame: frame_index,
            owner: None,
            last_owner_frame: None,
            last_person_near_frame: None,
            state: ObjectState::Tracking,
        }
    }

    /// Record a fresh detection match for this object.
    #[inline]
    pub fn mark_seen(&mut self, bbox: BBox, frame_index: u64) {
        self.bbox = bbox;
        self.last_seen_frame = frame_index;
    }

    /// Set the owner if none is set yet and stamp the proximity evidence.
    /// An owner identity, once set, is never replaced.
    pub fn assign_owner(&mut self, owner: Owner, frame_index: u64) {
        if self.owner.is_none() {
            self.owner = Some(owner);
            if self.state == ObjectState::Tracking {
                self.state = ObjectState::Owned;
            }
        }
        self.last_owner_frame = Some(frame_index);
    }

    /// Refresh owner-proximity evidence without touching the identity.
    #[inline]
    pub fn refresh_owner(&mut self, frame_index: u64) {
        self.last_owner_frame = Some(frame_index);
    }

    #[inline]
    pub fn note_person_near(&mut self, frame_index: u64) {
        self.last_person_near_frame = Some(frame_index);
    }

    /// Transition to `Left`. Terminal for event emission; never reverts.
    #[inline]
    pub fn mark_left(&mut self) {
        self.state = ObjectState::Left;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_ordering_is_total() {
        let a = ObjectKey::External(TrackId(3));
        let b = ObjectKey::External(TrackId(7));
        let c = ObjectKey::Synthetic(1);
        assert!(a < b);
        assert!(b < c);
        assert!(ObjectKey::Synthetic(1) < ObjectKey::Synthetic(2));
    }

    #[test]
    fn test_owner_serialization() {
        let concrete = serde_json::to_value(Owner::Person(TrackId(17))).unwrap();
        assert_eq!(concrete, serde_json::json!(17));
        let unknown = serde_json::to_value(Owner::Unknown).unwrap();
        assert_eq!(unknown, serde_json::json!("unknown"));
    }

    #[test]
    fn test_assign_owner_is_sticky() {
        let mut obj =
            TrackedObject::new(ObjectKey::Synthetic(0), BBox::new(0.0, 0.0, 1.0, 1.0), 24, 0);
        obj.assign_owner(Owner::Person(TrackId(5)), 3);
        assert_eq!(obj.owner, Some(Owner::Person(TrackId(5))));
        assert_eq!(obj.state, ObjectState::Owned);

        // A later assignment refreshes evidence but keeps the identity
        obj.assign_owner(Owner::Person(TrackId(9)), 8);
        assert_eq!(obj.owner, Some(Owner::Person(TrackId(5))));
        assert_eq!(obj.last_owner_frame, Some(8));
    }

    #[test]
    fn test_state_does_not_regress_from_left() {
        let mut obj =
            TrackedObject::new(ObjectKey::Synthetic(0), BBox::new(0.0, 0.0, 1.0, 1.0), 24, 0);
        obj.assign_owner(Owner::Unknown, 1);
        obj.mark_left();
        assert_eq!(obj.state, ObjectState::Left);

        // Further owner evidence must not reopen the state machine
        obj.assign_owner(Owner::Person(TrackId(1)), 10);
        assert_eq!(obj.state, ObjectState::Left);
    }

    #[test]
    fn test_parse_frame_message() {
        let json = r#"{
            "stream_id": "cam-entrance",
            "frame_index": 120,
            "frame_width": 1920,
            "frame_height": 1080,
            "detections": [
                {"bbox": [10.0, 20.0, 110.0, 220.0], "class_id": 0, "confidence": 0.91, "track_id": 4},
                {"bbox": [300.0, 400.0, 360.0, 460.0], "class_id": 24, "confidence": 0.55}
            ]
        }"#;

        let msg: FrameMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.stream_id.as_deref(), Some("cam-entrance"));
        assert_eq!(msg.frame_index, 120);
        assert_eq!(msg.detections.len(), 2);
        assert_eq!(msg.detections[0].track_id, Some(4));
        assert_eq!(msg.detections[1].track_id, None);
        assert!(msg.snapshot_base64.is_none());
    }
}
