//! Search Backend Trait
//!
//! Defines the interface to the remote detection and similarity-search
//! service. The HTTP implementation lives in `providers::http`; tests drive
//! the workflow through in-memory implementations.

use async_trait::async_trait;

use crate::core::{upload::UploadedImage, CoreError, CoreResult};

use super::{DetectedRegion, NormalizedBox, SearchResult};

/// Remote detection and similarity-search service
///
/// Implementations report failures as `DetectionFailed`, `SearchFailed` or
/// `SimilarSearchFailed`, and never reorder or filter what the service returns.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Returns a short identifier for logs
    fn name(&self) -> &str;

    /// Detects labeled regions in an image
    async fn detect(
        &self,
        image: &UploadedImage,
        label_hints: &[String],
    ) -> CoreResult<Vec<DetectedRegion>>;

    /// Ranks catalog items against a text query
    async fn search_by_text(&self, query: &str, top_k: u32) -> CoreResult<Vec<SearchResult>>;

    /// Ranks catalog items against one region of an image
    async fn search_similar(
        &self,
        image: &UploadedImage,
        region: &NormalizedBox,
        limit: u32,
    ) -> CoreResult<Vec<SearchResult>>;

    /// Verifies the service is reachable
    async fn health_check(&self) -> CoreResult<()>;
}

/// Rejects empty or whitespace-only queries before any dispatch
pub fn validate_query(query: &str) -> CoreResult<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(CoreError::SearchFailed(
            "Search query cannot be empty".to_string(),
        ));
    }
    Ok(trimmed)
}
