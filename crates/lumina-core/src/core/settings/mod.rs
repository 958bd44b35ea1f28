//! Settings
//!
//! Runtime configuration for the search engine:
//! - Backend base URL and request timeout
//! - Upload ceiling and detection label vocabulary
//! - Result counts, overlay font, and log directory
//!
//! Values come from `LUMINA_*` environment variables layered over defaults.
//! Out-of-range values are clamped by [`Settings::normalize`] rather than
//! rejected; only an unusable base URL is an error.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::core::{
    CoreError, CoreResult, DEFAULT_LABEL_HINTS, DEFAULT_SIMILAR_LIMIT, DEFAULT_TOP_K,
    MAX_UPLOAD_BYTES,
};

/// Environment variable names
pub const ENV_API_URL: &str = "LUMINA_API_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "LUMINA_REQUEST_TIMEOUT_SECS";
pub const ENV_MAX_UPLOAD_BYTES: &str = "LUMINA_MAX_UPLOAD_BYTES";
pub const ENV_LABEL_HINTS: &str = "LUMINA_LABEL_HINTS";
pub const ENV_TOP_K: &str = "LUMINA_TOP_K";
pub const ENV_SIMILAR_LIMIT: &str = "LUMINA_SIMILAR_LIMIT";
pub const ENV_FONT_PATH: &str = "LUMINA_FONT_PATH";
pub const ENV_LOG_DIR: &str = "LUMINA_LOG_DIR";

/// Default backend base URL
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Base URL the detection and search endpoints hang off
    #[serde(default = "default_api_url")]
    pub api_base_url: String,

    /// Per-request timeout applied by the HTTP client
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upload size ceiling in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Label vocabulary sent with detection requests
    #[serde(default = "default_label_hints")]
    pub label_hints: Vec<String>,

    /// Result count for text search
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Result count for region similarity search
    #[serde(default = "default_similar_limit")]
    pub similar_limit: u32,

    /// TrueType/OpenType font used for overlay labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_path: Option<PathBuf>,

    /// Directory for rolling log files (stdout only when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_upload_bytes() -> u64 {
    MAX_UPLOAD_BYTES
}

fn default_label_hints() -> Vec<String> {
    DEFAULT_LABEL_HINTS.iter().map(|s| s.to_string()).collect()
}

fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}

fn default_similar_limit() -> u32 {
    DEFAULT_SIMILAR_LIMIT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            label_hints: default_label_hints(),
            top_k: default_top_k(),
            similar_limit: default_similar_limit(),
            font_path: None,
            log_dir: None,
        }
    }
}

impl Settings {
    /// Loads settings from the process environment
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary key lookup.
    ///
    /// Unparseable numeric values are logged and replaced by their default.
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(url) = lookup(ENV_API_URL) {
            settings.api_base_url = url;
        }
        if let Some(value) = parse_number(&lookup, ENV_REQUEST_TIMEOUT_SECS) {
            settings.request_timeout_secs = value;
        }
        if let Some(value) = parse_number(&lookup, ENV_MAX_UPLOAD_BYTES) {
            settings.max_upload_bytes = value;
        }
        if let Some(hints) = lookup(ENV_LABEL_HINTS) {
            settings.label_hints = hints
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(value) = parse_number(&lookup, ENV_TOP_K) {
            settings.top_k = value;
        }
        if let Some(value) = parse_number(&lookup, ENV_SIMILAR_LIMIT) {
            settings.similar_limit = value;
        }
        settings.font_path = lookup(ENV_FONT_PATH)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        settings.log_dir = lookup(ENV_LOG_DIR)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        settings.normalize()?;
        Ok(settings)
    }

    /// Normalizes and clamps settings so they are always usable.
    ///
    /// Fails only when the base URL cannot be used at all.
    pub fn normalize(&mut self) -> CoreResult<()> {
        self.api_base_url = validate_base_url(&self.api_base_url)?;
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 600);
        if self.max_upload_bytes == 0 {
            self.max_upload_bytes = MAX_UPLOAD_BYTES;
        }
        if self.label_hints.is_empty() {
            self.label_hints = default_label_hints();
        }
        self.top_k = self.top_k.clamp(1, 100);
        self.similar_limit = self.similar_limit.clamp(1, 100);
        Ok(())
    }

    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_number<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}; using default", key, raw);
            None
        }
    }
}

/// Validate and normalize a backend base URL.
///
/// - Requires http/https
/// - Trims whitespace
/// - Removes trailing slash
pub fn validate_base_url(url: &str) -> CoreResult<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Config("Base URL cannot be empty".to_string()));
    }

    let parsed = reqwest::Url::parse(trimmed)
        .map_err(|e| CoreError::Config(format!("Invalid base URL '{}': {}", trimmed, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.trim_end_matches('/').to_string()),
        scheme => Err(CoreError::Config(format!(
            "Invalid base URL scheme '{}'. Use http or https.",
            scheme
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================
