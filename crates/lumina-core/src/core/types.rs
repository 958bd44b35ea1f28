//! Lumina Core Type Definitions
//!
//! Defines fundamental types shared across subsystems.

use serde::{Deserialize, Serialize};

// =============================================================================
// Limits
// =============================================================================

/// Upload size ceiling in bytes (10 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Label vocabulary sent with every detection request
pub const DEFAULT_LABEL_HINTS: &[&str] = &["clothing", "shoes", "accessories"];

/// Default number of results requested by a text search
pub const DEFAULT_TOP_K: u32 = 10;

/// Default number of results requested by a similarity search
pub const DEFAULT_SIMILAR_LIMIT: u32 = 10;

// =============================================================================
// Request Kinds
// =============================================================================

/// Kind of remote operation, used to key stale-response sequencing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Object detection on an uploaded image
    Detect,
    /// Text or region similarity search
    Search,
}

impl RequestKind {
    /// Returns all request kinds
    pub fn all() -> [RequestKind; 2] {
        [RequestKind::Detect, RequestKind::Search]
    }

    pub(crate) fn index(self) -> usize {
        match self {
            RequestKind::Detect => 0,
            RequestKind::Search => 1,
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Detect => write!(f, "detect"),
            RequestKind::Search => write!(f, "search"),
        }
    }
}
