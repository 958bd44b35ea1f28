//! Upload Validation
//!
//! Checks a user-selected file before it can enter the search workflow and
//! produces a displayable preview for it.
//!
//! - Declared content type must be `image/*` ([`CoreError::InvalidType`])
//! - Size must not exceed the configured ceiling ([`CoreError::TooLarge`])
//! - Previews are `data:` URIs built off the async executor
//!
//! Validation never touches the network.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{settings::Settings, CoreError, CoreResult, MAX_UPLOAD_BYTES};

/// Content type used when a file's type cannot be determined
pub const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

// =============================================================================
// Selected File
// =============================================================================

/// A file picked by the user, not yet validated
#[derive(Clone, Debug, PartialEq)]
pub struct SelectedFile {
    /// File name as reported by the picker
    pub name: String,
    /// Declared MIME type
    pub content_type: String,
    /// Raw file content
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    /// Creates a selected file from in-memory content
    pub fn new(name: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            content_type: content_type.to_string(),
            bytes,
        }
    }

    /// Reads a file from disk, declaring its type from the extension
    pub async fn from_path(path: &Path) -> CoreResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Self {
            name,
            content_type: content_type_for_path(path),
            bytes,
        })
    }

    /// Returns the size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Guesses a MIME type from a path's extension
pub fn content_type_for_path(path: &Path) -> String {
    image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| UNKNOWN_CONTENT_TYPE.to_string())
}

// =============================================================================
// Uploaded Image
// =============================================================================

/// A validated image owned by the workflow for one search session
#[derive(Clone, Debug, PartialEq)]
pub struct UploadedImage {
    name: String,
    content_type: String,
    bytes: Arc<[u8]>,
}

impl UploadedImage {
    /// File name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIME type
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Raw image content
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Displayable preview of an uploaded image
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    /// `data:{mime};base64,{payload}` URI
    pub data_uri: String,
}

impl Preview {
    /// Builds a data URI preview from raw bytes
    pub fn from_bytes(content_type: &str, bytes: &[u8]) -> Self {
        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self {
            data_uri: format!("data:{};base64,{}", content_type, payload),
        }
    }

    /// Returns the base64 payload following the comma
    pub fn payload(&self) -> Option<&str> {
        self.data_uri
            .split_once(";base64,")
            .map(|(_, payload)| payload)
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Validates user-selected files against type and size rules
#[derive(Clone, Debug)]
pub struct UploadValidator {
    max_bytes: u64,
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::new(MAX_UPLOAD_BYTES)
    }
}

impl UploadValidator {
    /// Creates a validator with the given size ceiling
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Creates a validator from engine settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.max_upload_bytes)
    }

    /// Size ceiling in bytes
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Validates a selected file.
    ///
    /// Type is checked before size, so a file failing both reports
    /// `InvalidType` only.
    pub fn validate(&self, file: SelectedFile) -> CoreResult<UploadedImage> {
        let content_type = file.content_type.trim().to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(CoreError::InvalidType(if content_type.is_empty() {
                UNKNOWN_CONTENT_TYPE.to_string()
            } else {
                content_type
            }));
        }

        let size = file.size();
        if size > self.max_bytes {
            return Err(CoreError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        debug!("Accepted upload '{}' ({}, {} bytes)", file.name, content_type, size);

        Ok(UploadedImage {
            name: file.name,
            content_type,
            bytes: Arc::from(file.bytes),
        })
    }

    /// Produces a preview for a validated image without blocking the executor
    pub async fn preview(&self, image: &UploadedImage) -> CoreResult<Preview> {
        let content_type = image.content_type.clone();
        let bytes = Arc::clone(&image.bytes);

        tokio::task::spawn_blocking(move || Preview::from_bytes(&content_type, &bytes))
            .await
            .map_err(|e| CoreError::Internal(format!("Preview task failed: {}", e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
