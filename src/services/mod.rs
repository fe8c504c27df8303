//! Services - business logic and state management
//!
//! This module contains the core abandonment-detection services:
//! - `registry` - Tracked object collection and lifecycle
//! - `association` - Detection-to-object matching
//! - `ownership` - Owner attribution from person observations
//! - `abandonment` - Abandonment flagging and garbage collection
//! - `engine` - Per-stream orchestration and stream supervision

pub mod abandonment;
pub mod association;
pub mod engine;
pub mod ownership;
pub mod registry;

// Re-export commonly used types
pub use engine::{EngineSupervisor, StreamEngine};
pub use registry::ObjectRegistry;
