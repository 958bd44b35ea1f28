//! Label Font
//!
//! Loads the font used for overlay labels. Rendering works without one:
//! label backgrounds are still sized and drawn, glyphs are skipped.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use tracing::{debug, warn};

use crate::core::{CoreError, CoreResult};

/// Fonts tried when no font path is configured
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Average advance of a glyph relative to the font size, used when no font is loaded
const FALLBACK_ADVANCE_RATIO: f32 = 0.6;

/// A parsed font for overlay labels
pub struct LabelFont {
    font: FontVec,
    source: Option<PathBuf>,
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelFont")
            .field("source", &self.source)
            .finish()
    }
}

impl LabelFont {
    /// Parses a font from raw TrueType/OpenType data
    pub fn from_bytes(data: Vec<u8>) -> CoreResult<Self> {
        let font = FontVec::try_from_vec(data)
            .map_err(|e| CoreError::Render(format!("Invalid font data: {}", e)))?;
        Ok(Self { font, source: None })
    }

    /// Loads a font file
    pub fn load(path: &Path) -> CoreResult<Self> {
        let data = std::fs::read(path)?;
        let mut font = Self::from_bytes(data)?;
        font.source = Some(path.to_path_buf());
        Ok(font)
    }

    /// Loads the configured font, else the first usable system font
    pub fn discover(configured: Option<&Path>) -> Option<Self> {
        if let Some(path) = configured {
            match Self::load(path) {
                Ok(font) => return Some(font),
                Err(e) => warn!("Configured label font {} unusable: {}", path.display(), e),
            }
        }

        let found = SYSTEM_FONT_CANDIDATES
            .iter()
            .map(Path::new)
            .filter(|p| p.is_file())
            .find_map(|p| Self::load(p).ok());

        match &found {
            Some(font) => debug!("Using label font {:?}", font.source),
            None => warn!("No label font found; overlay labels will be drawn without text"),
        }
        found
    }

    /// Path the font was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub(crate) fn font(&self) -> &FontVec {
        &self.font
    }
}

/// Measures a label, falling back to a fixed advance without a font
pub(crate) fn measure_text(font: Option<&LabelFont>, size: f32, text: &str) -> (u32, u32) {
    match font {
        Some(font) => imageproc::drawing::text_size(PxScale::from(size), font.font(), text),
        None => {
            let advance = (size * FALLBACK_ADVANCE_RATIO).ceil() as u32;
            (advance * text.chars().count() as u32, size.ceil() as u32)
        }
    }
}
