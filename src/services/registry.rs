//! Object registry - owns tracked objects and their lifecycle
//!
//! One registry per stream; keys are unique among live entries at all times.
//! Surrogate keys come from a monotonic counter, so a synthetic key can never
//! collide with one handed out earlier in the stream's lifetime.

use crate::domain::geometry::BBox;
use crate::domain::types::{Detection, ObjectKey, TrackedObject};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Owned collection of tracked objects for a single stream
pub struct ObjectRegistry {
    objects: FxHashMap<ObjectKey, TrackedObject>,
    next_synthetic: u64,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self { objects: FxHashMap::default(), next_synthetic: 0 }
    }

    /// Create a new entry for an unmatched detection.
    ///
    /// The key is the external track id when the detection carries one and
    /// that id is not already live (an upstream tracker can reuse an id for
    /// a different class); otherwise the next surrogate counter value.
    pub fn insert_new(&mut self, detection: &Detection, frame_index: u64) -> ObjectKey {
        let key = match detection.track_id {
            Some(tid) if !self.objects.contains_key(&ObjectKey::External(tid)) => {
                ObjectKey::External(tid)
            }
            _ => {
                let key = ObjectKey::Synthetic(self.next_synthetic);
                self.next_synthetic += 1;
                key
            }
        };

        debug!(
            key = %key,
            class_id = %detection.class_id,
            frame = %frame_index,
            "object_created"
        );

        self.objects.insert(
            key,
            TrackedObject::new(key, detection.bbox, detection.class_id, frame_index),
        );
        key
    }

    /// Update an existing entry with a fresh detection match.
    pub fn touch(&mut self, key: ObjectKey, bbox: BBox, frame_index: u64) {
        if let Some(obj) = self.objects.get_mut(&key) {
            obj.mark_seen(bbox, frame_index);
        }
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&TrackedObject> {
        self.objects.get(key)
    }

    pub fn get_mut(&mut self, key: &ObjectKey) -> Option<&mut TrackedObject> {
        self.objects.get_mut(key)
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.contains_key(key)
    }

    pub fn remove(&mut self, key: &ObjectKey) -> Option<TrackedObject> {
        self.objects.remove(key)
    }

    pub fn values(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut TrackedObject> {
        self.objects.values_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
