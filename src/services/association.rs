//! Association of per-frame detections to registry entries
//!
//! External track ids match directly; untracked detections fall back to a
//! nearest-center search over same-class entries. Ambiguity is never an
//! error: anything unmatched becomes a new entry.

use crate::domain::types::{Detection, ObjectKey};
use crate::services::registry::ObjectRegistry;

/// Decision for one detection against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// Update this existing entry
    Existing(ObjectKey),
    /// No acceptable match; create a new entry
    Create,
}

/// Matches detections to tracked objects
pub struct AssociationEngine {
    /// Maximum center distance (pixels) for the nearest-neighbor fallback
    max_coord_distance: f64,
}

impl AssociationEngine {
    pub fn new(max_coord_distance: f64) -> Self {
        Self { max_coord_distance }
    }

    /// Decide how a detection maps onto the registry.
    ///
    /// 1. An external track id that keys a live same-class entry matches it
    ///    directly.
    /// 2. Otherwise the nearest same-class entry by center distance below the
    ///    configured maximum wins; ties break on smallest distance, then on
    ///    lowest key, so the result is deterministic for identical inputs.
    /// 3. Otherwise the detection starts a new entry.
    pub fn associate(&self, registry: &ObjectRegistry, detection: &Detection) -> Association {
        if let Some(tid) = detection.track_id {
            let key = ObjectKey::External(tid);
            if let Some(obj) = registry.get(&key) {
                if obj.class_id == detection.class_id {
                    return Association::Existing(key);
                }
                // Id reused for a different class: fall through to the
                // spatial search rather than corrupt the existing entry.
            }
        }

        let mut best: Option<(ObjectKey, f64)> = None;
        for obj in registry.values() {
            if obj.class_id != detection.class_id {
                continue;
            }
            let dist = detection.bbox.center_distance(&obj.bbox);
            if dist >= self.max_coord_distance {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_key, best_dist)) => {
                    dist < best_dist || (dist == best_dist && obj.key < best_key)
                }
            };
            if better {
                best = Some((obj.key, dist));
            }
        }

        match best {
            Some((key, _)) => Association::Existing(key),
            None => Association::Create,
        }
    }
}
