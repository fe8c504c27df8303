//! Abandonment evaluation and registry garbage collection
//!
//! An object is flagged once its owner has been absent beyond the threshold
//! while the object itself is still visible. Entries unseen for five times
//! the threshold are purged regardless of state, so a removed object can
//! never emit later.

use crate::domain::geometry::BBox;
use crate::domain::types::{ObjectKey, ObjectState, Owner};
use crate::services::registry::ObjectRegistry;
use smallvec::SmallVec;
use tracing::{debug, info};

/// Snapshot of a newly flagged object, taken at the moment of transition
#[derive(Debug, Clone)]
pub struct FlaggedObject {
    pub key: ObjectKey,
    pub bbox: BBox,
    pub class_id: i64,
    pub owner: Option<Owner>,
}

/// Result of one per-frame evaluation pass
#[derive(Debug, Default)]
pub struct EvaluationOutcome {
    /// Objects that transitioned to `Left` this frame, in key order
    pub flagged: SmallVec<[FlaggedObject; 2]>,
    /// Entries removed by garbage collection
    pub removed: usize,
}

/// Flags abandoned objects and garbage-collects stale entries
pub struct AbandonmentEvaluator {
    /// Frames of owner absence before a visible object is flagged
    threshold_frames: u64,
    /// Frames of total invisibility before an entry is purged
    gc_threshold_frames: u64,
}

impl AbandonmentEvaluator {
    pub fn new(threshold_frames: u64) -> Self {
        Self { threshold_frames, gc_threshold_frames: 5 * threshold_frames }
    }

    #[inline]
    pub fn threshold_frames(&self) -> u64 {
        self.threshold_frames
    }

    /// Run the per-frame evaluation over the whole registry.
    ///
    /// The flag condition and the GC condition are disjoint (`not_seen_for`
    /// cannot be both ≤ threshold and > 5×threshold), so an object never
    /// emits in the frame it is collected.
    pub fn evaluate(&self, registry: &mut ObjectRegistry, now: u64) -> EvaluationOutcome {
        let mut outcome = EvaluationOutcome::default();

        for obj in registry.values_mut() {
            if obj.state == ObjectState::Left {
                continue;
            }
            let Some(owner) = obj.owner else { continue };
            let Some(last_owner_frame) = obj.last_owner_frame else { continue };

            let no_owner_for = now.saturating_sub(last_owner_frame);
            let not_seen_for = now.saturating_sub(obj.last_seen_frame);

            if no_owner_for > self.threshold_frames && not_seen_for <= self.threshold_frames {
                obj.mark_left();
                info!(
                    key = %obj.key,
                    class_id = %obj.class_id,
                    owner = %owner,
                    no_owner_for = %no_owner_for,
                    not_seen_for = %not_seen_for,
                    frame = %now,
                    "object_left"
                );
                outcome.flagged.push(FlaggedObject {
                    key: obj.key,
                    bbox: obj.bbox,
                    class_id: obj.class_id,
                    owner: obj.owner,
                });
            }
        }

        // GC applies to every entry, whatever its state or ownership
        let stale: Vec<ObjectKey> = registry
            .values()
            .filter(|obj| now.saturating_sub(obj.last_seen_frame) > self.gc_threshold_frames)
            .map(|obj| obj.key)
            .collect();
        for key in &stale {
            if let Some(obj) = registry.remove(key) {
                debug!(
                    key = %key,
                    state = %obj.state.as_str(),
                    last_seen_frame = %obj.last_seen_frame,
                    frame = %now,
                    "object_gc_removed"
                );
                outcome.removed += 1;
            }
        }

        // Deterministic emission order for same-frame incidents
        outcome.flagged.sort_by_key(|f| f.key);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Detection, TrackId};

    const THRESHOLD: u64 = 40;

    fn evaluator() -> AbandonmentEvaluator {
        AbandonmentEvaluator::new(THRESHOLD)
    }

    fn registry_with_owned_object(
        owner_frame: u64,
    ) -> (ObjectRegistry, crate::domain::types::ObjectKey) {
        let mut registry = ObjectRegistry::new();
        let det = Detection {
            bbox: BBox::new(10.0, 10.0, 50.0, 50.0),
            class_id: 24,
            confidence: 0.8,
            track_id: Some(TrackId(1)),
        };
        let key = registry.insert_new(&det, 0);
        let obj = registry.get_mut(&key).unwrap();
        obj.assign_owner(Owner::Person(TrackId(9)), owner_frame);
        (registry, key)
    }

    #[test]
    fn test_visible_unaccompanied_object_is_flagged_once() {
        let (mut registry, key) = registry_with_owned_object(5);
        // Object seen every frame
        registry.get_mut(&key).unwrap().last_seen_frame = 46;

        let outcome = evaluator().evaluate(&mut registry, 46);
        assert_eq!(outcome.flagged.len(), 1);
        assert_eq!(outcome.flagged[0].key, key);
        assert_eq!(outcome.flagged[0].owner, Some(Owner::Person(TrackId(9))));
        assert_eq!(registry.get(&key).unwrap().state, ObjectState::Left);

        // Re-evaluation never emits twice
        registry.get_mut(&key).unwrap().last_seen_frame = 47;
        let outcome = evaluator().evaluate(&mut registry, 47);
        assert!(outcome.flagged.is_empty());
    }

    #[test]
    fn test_owner_recent_enough_is_not_flagged() {
        let (mut registry, key) = registry_with_owned_object(5);
        registry.get_mut(&key).unwrap().last_seen_frame = 44;

        // no_owner_for = 39 <= threshold
        let outcome = evaluator().evaluate(&mut registry, 44);
        assert!(outcome.flagged.is_empty());
        assert_eq!(registry.get(&key).unwrap().state, ObjectState::Owned);
    }

    #[test]
    fn test_invisible_object_fails_visibility_condition() {
        let (mut registry, key) = registry_with_owned_object(5);
        // Object also vanished at frame 5: both deltas exceed the threshold
        registry.get_mut(&key).unwrap().last_seen_frame = 5;

        let outcome = evaluator().evaluate(&mut registry, 46);
        assert!(outcome.flagged.is_empty());
        assert_eq!(registry.get(&key).unwrap().state, ObjectState::Owned);
        assert_eq!(outcome.removed, 0);
    }

    #[test]
    fn test_gc_removes_stale_entry_regardless_of_state() {
        let (mut registry, key) = registry_with_owned_object(5);
        registry.get_mut(&key).unwrap().last_seen_frame = 5;

        // Unseen for more than 5x threshold: purged without ever flagging
        let outcome = evaluator().evaluate(&mut registry, 5 + 5 * THRESHOLD + 1);
        assert_eq!(outcome.removed, 1);
        assert!(outcome.flagged.is_empty());
        assert!(!registry.contains(&key));
    }

    #[test]
    fn test_gc_removes_unowned_and_left_entries() {
        let mut registry = ObjectRegistry::new();
        let det = Detection {
            bbox: BBox::new(10.0, 10.0, 50.0, 50.0),
            class_id: 24,
            confidence: 0.8,
            track_id: None,
        };
        let _unowned = registry.insert_new(&det, 0);
        let left = registry.insert_new(&det, 0);
        {
            let obj = registry.get_mut(&left).unwrap();
            obj.assign_owner(Owner::Unknown, 0);
            obj.mark_left();
        }

        let outcome = evaluator().evaluate(&mut registry, 5 * THRESHOLD + 1);
        assert_eq!(outcome.removed, 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_exact_threshold_boundary_is_not_flagged() {
        let (mut registry, key) = registry_with_owned_object(5);
        registry.get_mut(&key).unwrap().last_seen_frame = 45;

        // no_owner_for == threshold exactly: strictly-greater is required
        let outcome = evaluator().evaluate(&mut registry, 45);
        assert!(outcome.flagged.is_empty());
        assert_eq!(registry.get(&key).unwrap().state, ObjectState::Owned);
    }

    #[test]
    fn test_object_without_owner_is_never_flagged() {
        let mut registry = ObjectRegistry::new();
        let det = Detection {
            bbox: BBox::new(10.0, 10.0, 50.0, 50.0),
            class_id: 24,
            confidence: 0.8,
            track_id: None,
        };
        let key = registry.insert_new(&det, 0);
        registry.get_mut(&key).unwrap().last_seen_frame = 100;

        let outcome = evaluator().evaluate(&mut registry, 100);
        assert!(outcome.flagged.is_empty());
        assert_eq!(registry.get(&key).unwrap().state, ObjectState::Tracking);
    }

    #[test]
    fn test_same_frame_flags_emit_in_key_order() {
        let mut registry = ObjectRegistry::new();
        for tid in [7, 3, 5] {
            let det = Detection {
                bbox: BBox::new(10.0, 10.0, 50.0, 50.0),
                class_id: 24,
                confidence: 0.8,
                track_id: Some(TrackId(tid)),
            };
            let key = registry.insert_new(&det, 0);
            let obj = registry.get_mut(&key).unwrap();
            obj.assign_owner(Owner::Unknown, 5);
            obj.last_seen_frame = 46;
        }

        let outcome = evaluator().evaluate(&mut registry, 46);
        let keys: Vec<_> = outcome.flagged.iter().map(|f| f.key).collect();
        assert_eq!(
            keys,
            vec![
                ObjectKey::External(TrackId(3)),
                ObjectKey::External(TrackId(5)),
                ObjectKey::External(TrackId(7)),
            ]
        );
    }
}
