//! Domain - core value types
//!
//! - `geometry` - Bounding box math (center, area, IoU)
//! - `types` - Detections, registry entries, owner attribution
//! - `event` - Abandonment event payloads

pub mod event;
pub mod geometry;
pub mod types;
