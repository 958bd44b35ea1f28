//! Lumina Error Definitions
//!
//! Defines error types used throughout the visual search engine.

use thiserror::Error;

use super::RequestKind;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Upload Errors
    // =========================================================================
    #[error("Invalid file type: {0}")]
    InvalidType(String),

    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    // =========================================================================
    // Remote Errors
    // =========================================================================
    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Similarity search failed: {0}")]
    SimilarSearchFailed(String),

    #[error("Stale {kind} response (sequence {seq}, latest {latest})")]
    StaleResponse {
        kind: RequestKind,
        seq: u64,
        latest: u64,
    },

    // =========================================================================
    // Rendering Errors
    // =========================================================================
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    #[error("Render failed: {0}")]
    Render(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Fixed message shown to the user for this error kind.
    ///
    /// Remote failures collapse to one message per operation; the detail
    /// carried by `Display` goes to the log instead.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::InvalidType(_) => "Please select an image file".to_string(),
            CoreError::TooLarge { limit, .. } => {
                format!("Image size must be less than {}", format_limit(*limit))
            }
            CoreError::DetectionFailed(_) => {
                "Failed to detect objects. Please try again.".to_string()
            }
            CoreError::SearchFailed(_) => "Failed to search. Please try again.".to_string(),
            CoreError::SimilarSearchFailed(_) => {
                "Failed to search for similar products. Please try again.".to_string()
            }
            CoreError::ImageDecode(_) | CoreError::Render(_) => {
                "Failed to display the image. Please try another file.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Returns true for responses that were superseded by a newer request
    pub fn is_stale(&self) -> bool {
        matches!(self, CoreError::StaleResponse { .. })
    }
}

/// Formats a byte limit as whole MB, or with one decimal place when it is
/// not a whole number of MiB. Limits under 1 MiB are given in KB.
fn format_limit(limit: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    if limit % MIB == 0 {
        format!("{}MB", limit / MIB)
    } else if limit >= MIB {
        format!("{:.1}MB", limit as f64 / MIB as f64)
    } else {
        format!("{}KB", (limit + KIB - 1) / KIB)
    }
}

// =============================================================================
// Tests
// =============================================================================
