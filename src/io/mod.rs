//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `detections` - MQTT client for receiving detector frame messages
//! - `event_channel` - Typed channel for abandonment event hand-off
//! - `event_sink` - Event Store delivery (HTTP) and publisher actor
//! - `journal` - Local event journal (JSONL format)

pub mod detections;
pub mod event_channel;
pub mod event_sink;
pub mod journal;

// Re-export commonly used types
pub use detections::{start_detection_ingest, StreamHealth};
pub use event_channel::{create_event_channel, EventSender};
pub use event_sink::{EventPublisher, EventSink, HttpEventSink};
pub use journal::Journal;
