//! Ownership resolution between tracked objects and person observations
//!
//! Upstream person ids are unreliable: they can be absent for a whole
//! incident or reused later. Ownership therefore forms in two tiers: a
//! concrete person id when one overlapped the object early enough, or the
//! anonymous `Owner::Unknown` when presence is certain but identity never
//! resolved. Losing the id must not lose the abandonment clock.

use crate::domain::types::{ObjectState, Owner, PersonObservation};
use crate::services::registry::ObjectRegistry;
use tracing::debug;

/// Computes and refreshes owner attribution once per frame
pub struct OwnershipResolver {
    /// Grace period after first detection during which ownership may form
    appear_window_frames: u64,
    /// Minimum person-object IoU for initial ownership
    min_initial_iou: f64,
    /// Low overlap threshold for "person still nearby" evidence
    near_iou: f64,
}

impl OwnershipResolver {
    pub fn new(appear_window_frames: u64, min_initial_iou: f64, near_iou: f64) -> Self {
        Self { appear_window_frames, min_initial_iou, near_iou }
    }

    /// Update owner state for every non-terminal object against this frame's
    /// person observations.
    ///
    /// Person-presence memory (`last_person_near_frame`) refreshes first so
    /// the anonymous-owner path can fire in the same frame the overlap
    /// happened.
    pub fn resolve(&self, registry: &mut ObjectRegistry, persons: &[PersonObservation], now: u64) {
        for obj in registry.values_mut() {
            if obj.state == ObjectState::Left {
                continue;
            }

            // Highest-overlap person; ties keep the first-seen person
            let mut best_iou = 0.0;
            let mut best_person: Option<PersonObservation> = None;
            for person in persons {
                let overlap = person.bbox.iou(&obj.bbox);
                if overlap > self.near_iou {
                    obj.note_person_near(now);
                }
                if overlap > best_iou {
                    best_iou = overlap;
                    best_person = Some(person.clone());
                }
            }

            match obj.owner {
                None => {
                    let in_appear_window = now - obj.appeared_frame <= self.appear_window_frames;
                    if best_iou > self.min_initial_iou && in_appear_window {
                        match best_person.as_ref().and_then(|p| p.track_id) {
                            Some(tid) => {
                                obj.assign_owner(Owner::Person(tid), now);
                                debug!(
                                    key = %obj.key,
                                    owner = %tid,
                                    iou = %best_iou,
                                    "owner_assigned"
                                );
                            }
                            // Identity unresolved: stamp the evidence and
                            // let the anonymous path decide on a later frame
                            None => obj.refresh_owner(now),
                        }
                    } else if let Some(near_frame) = obj.last_person_near_frame {
                        if now - near_frame <= self.appear_window_frames {
                            obj.assign_owner(Owner::Unknown, now);
                            debug!(key = %obj.key, "owner_assigned_unknown");
                        }
                    }
                }
                Some(_) => {
                    // Owner identity is immutable; only proximity refreshes
                    if best_iou > self.near_iou {
                        obj.refresh_owner(now);
                    }
                }
            }
        }
    }
}
