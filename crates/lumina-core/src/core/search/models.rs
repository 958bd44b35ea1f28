//! Search Data Models
//!
//! Detection regions and ranked search results exchanged with the backend.
//! Coordinates are normalized to the image (0.0 - 1.0), independent of pixel
//! resolution or display scaling.

use serde::{Deserialize, Serialize};

// =============================================================================
// Normalized Box
// =============================================================================

/// Axis-aligned rectangle in normalized image coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    /// Left edge (fraction of image width)
    pub xmin: f64,
    /// Top edge (fraction of image height)
    pub ymin: f64,
    /// Right edge (fraction of image width)
    pub xmax: f64,
    /// Bottom edge (fraction of image height)
    pub ymax: f64,
}

impl NormalizedBox {
    /// Creates a new box
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Returns the normalized width
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Returns the normalized height
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Returns the area (0.0 - 1.0)
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns the center point
    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) / 2.0,
            (self.ymin + self.ymax) / 2.0,
        )
    }

    /// Returns true when the box lies in [0, 1] with positive extent
    pub fn is_valid(&self) -> bool {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        in_unit(self.xmin)
            && in_unit(self.ymin)
            && in_unit(self.xmax)
            && in_unit(self.ymax)
            && self.xmin < self.xmax
            && self.ymin < self.ymax
    }

    /// Maps the box onto a surface of the given pixel size
    pub fn to_pixel_rect(&self, surface_width: u32, surface_height: u32) -> PixelRect {
        let w = surface_width as f64;
        let h = surface_height as f64;
        PixelRect {
            x: self.xmin * w,
            y: self.ymin * h,
            width: self.width() * w,
            height: self.height() * h,
        }
    }
}

/// Rectangle in pixel space, unrounded
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    /// Returns true if the point lies inside the rectangle
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

// =============================================================================
// Detected Region
// =============================================================================

/// A labeled region found by the detection service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    /// Detected category
    pub label: String,
    /// Detection confidence (0.0 - 1.0)
    pub score: f64,
    /// Region in normalized coordinates
    #[serde(rename = "box")]
    pub bbox: NormalizedBox,
}

impl DetectedRegion {
    /// Creates a new detected region
    pub fn new(label: &str, score: f64, bbox: NormalizedBox) -> Self {
        Self {
            label: label.to_string(),
            score,
            bbox,
        }
    }

    /// Confidence as a whole percentage
    pub fn score_percent(&self) -> i64 {
        (self.score * 100.0).round() as i64
    }

    /// Label drawn on the overlay, e.g. `shoe (91%)`
    pub fn display_label(&self) -> String {
        format!("{} ({}%)", self.label, self.score_percent())
    }
}

/// Body returned by the detection endpoint
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct DetectionResponse {
    #[serde(default, alias = "data")]
    pub detections: Vec<DetectedRegion>,
}

// =============================================================================
// Search Result
// =============================================================================

/// A ranked item returned by the search service.
///
/// Result lists keep the service's order; that order is the ranking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Item identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Item title
    #[serde(default)]
    pub title: String,
    /// Item image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// External product page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    /// Price in the catalog currency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Catalog category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Similarity score (higher is more similar, not necessarily bounded)
    pub score: f64,
}

impl SearchResult {
    /// Creates a result with a title and score
    pub fn new(title: &str, score: f64) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            image_url: None,
            product_url: None,
            price: None,
            category: None,
            score,
        }
    }

    /// Sets the image URL
    pub fn with_image_url(mut self, url: &str) -> Self {
        self.image_url = Some(url.to_string());
        self
    }

    /// Sets the product URL
    pub fn with_product_url(mut self, url: &str) -> Self {
        self.product_url = Some(url.to_string());
        self
    }

    /// Sets the price
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Sets the category
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Title for display, with a placeholder for untitled items
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled Product"
        } else {
            &self.title
        }
    }

    /// Score as a whole percentage for result badges
    pub fn score_percent(&self) -> i64 {
        (self.score * 100.0).round() as i64
    }
}

/// Body returned by the search endpoints: either a bare list or wrapped
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SearchResponse {
    List(Vec<SearchResult>),
    Wrapped {
        #[serde(default)]
        results: Vec<SearchResult>,
    },
}

impl SearchResponse {
    pub fn into_results(self) -> Vec<SearchResult> {
        match self {
            SearchResponse::List(results) => results,
            SearchResponse::Wrapped { results } => results,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
