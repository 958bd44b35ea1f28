//! Lumina Core Engine
//!
//! Client-side visual search engine.
//! Handles upload validation, object detection, overlay rendering, and the
//! search workflow against a remote detection / similarity service.

pub mod overlay;
pub mod search;
pub mod settings;
pub mod upload;
pub mod workflow;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
