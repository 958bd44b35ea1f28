//! Overlay Renderer
//!
//! Draws detected regions over an image at its natural resolution.
//!
//! - The surface matches the image's pixel dimensions, never a display size
//! - Regions are drawn in input order, colored by `index % PALETTE.len()`
//! - Each box gets a 4px stroke and a `"{label} ({pct}%)"` tag above it
//! - The same image and regions always produce the same pixels
//!
//! Labels that would start above the surface are moved inside the box so
//! they stay visible.

mod font;

use std::path::Path;
use std::sync::Arc;

use ab_glyph::PxScale;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::{
    search::{DetectedRegion, PixelRect},
    settings::Settings,
    upload::UploadedImage,
    CoreError, CoreResult,
};

pub use font::{LabelFont, SYSTEM_FONT_CANDIDATES};

// =============================================================================
// Style
// =============================================================================

/// Stroke colors, assigned by region index
pub const PALETTE: [Rgba<u8>; 5] = [
    Rgba([0x66, 0x7e, 0xea, 0xff]),
    Rgba([0xf0, 0x93, 0xfb, 0xff]),
    Rgba([0x4f, 0xac, 0xfe, 0xff]),
    Rgba([0x00, 0xf2, 0xfe, 0xff]),
    Rgba([0x43, 0xe9, 0x7b, 0xff]),
];

/// Box outline width in natural pixels
pub const STROKE_WIDTH: u32 = 4;

/// Label font size in pixels
pub const LABEL_FONT_SIZE: f32 = 16.0;

/// Line height reserved for label text
pub const LABEL_TEXT_HEIGHT: u32 = 24;

/// Padding around label text
pub const LABEL_PADDING: u32 = 8;

/// Label text color
pub const LABEL_TEXT_COLOR: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);

/// Returns the palette slot for a region index
pub fn palette_index(region_index: usize) -> usize {
    region_index % PALETTE.len()
}

/// Returns the stroke color for a region index
pub fn palette_color(region_index: usize) -> Rgba<u8> {
    PALETTE[palette_index(region_index)]
}

// =============================================================================
// Layout
// =============================================================================

/// Pixel placement of a label background
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Where and how one region was drawn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionLayout {
    /// Position in the input list
    pub index: usize,
    /// Palette slot used for the stroke and label background
    pub color_index: usize,
    /// Box in natural pixels, unrounded
    pub rect: PixelRect,
    /// Label text
    pub label: String,
    /// Label background placement
    pub label_box: LabelBox,
}

// =============================================================================
// Rendered Overlay
// =============================================================================

/// A drawn surface and the geometry of every region on it
#[derive(Clone, Debug)]
pub struct RenderedOverlay {
    surface: RgbaImage,
    layouts: Vec<RegionLayout>,
}

impl RenderedOverlay {
    /// The drawn pixels
    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// Consumes the overlay, returning its pixels
    pub fn into_surface(self) -> RgbaImage {
        self.surface
    }

    /// Region geometry in input order
    pub fn layouts(&self) -> &[RegionLayout] {
        &self.layouts
    }

    /// Natural width in pixels
    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    /// Natural height in pixels
    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    /// Returns the topmost region under a natural-resolution point.
    ///
    /// Later regions are drawn over earlier ones, so they win on overlap.
    pub fn region_at(&self, x: f64, y: f64) -> Option<usize> {
        self.layouts
            .iter()
            .rev()
            .find(|layout| layout.rect.contains(x, y))
            .map(|layout| layout.index)
    }

    /// Converts a point on a scaled display of the surface to natural pixels
    pub fn scale_pointer(&self, display_width: f64, display_height: f64, x: f64, y: f64) -> (f64, f64) {
        if display_width <= 0.0 || display_height <= 0.0 {
            return (x, y);
        }
        (
            x * self.width() as f64 / display_width,
            y * self.height() as f64 / display_height,
        )
    }

    /// Writes the surface as an image file; format follows the extension
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        self.surface
            .save(path)
            .map_err(|e| CoreError::Render(format!("Failed to write {}: {}", path.display(), e)))
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// Draws detection overlays
#[derive(Clone, Debug, Default)]
pub struct OverlayRenderer {
    font: Option<Arc<LabelFont>>,
}

impl OverlayRenderer {
    /// Creates a renderer; without a font, labels are drawn as blank tags
    pub fn new(font: Option<LabelFont>) -> Self {
        Self {
            font: font.map(Arc::new),
        }
    }

    /// Creates a renderer using the configured or a system font
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(LabelFont::discover(settings.font_path.as_deref()))
    }

    /// Returns true when label text will be drawn
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Computes region geometry on a surface without drawing
    pub fn layout(&self, width: u32, height: u32, regions: &[DetectedRegion]) -> Vec<RegionLayout> {
        regions
            .iter()
            .enumerate()
            .map(|(index, region)| {
                let rect = region.bbox.to_pixel_rect(width, height);
                let label = region.display_label();
                let (text_width, _) =
                    font::measure_text(self.font.as_deref(), LABEL_FONT_SIZE, &label);

                let label_height = LABEL_TEXT_HEIGHT + LABEL_PADDING;
                let box_top = surface_px(rect.y, height);
                let above = box_top - label_height as i32;
                let label_y = if above < 0 { box_top.max(0) } else { above };

                RegionLayout {
                    index,
                    color_index: palette_index(index),
                    rect,
                    label,
                    label_box: LabelBox {
                        x: surface_px(rect.x, width),
                        y: label_y,
                        width: text_width + LABEL_PADDING * 2,
                        height: label_height,
                    },
                }
            })
            .collect()
    }

    /// Draws regions over a decoded image
    pub fn render(&self, base: &RgbaImage, regions: &[DetectedRegion]) -> RenderedOverlay {
        let mut surface = base.clone();
        let layouts = self.layout(surface.width(), surface.height(), regions);

        for layout in &layouts {
            let color = PALETTE[layout.color_index];
            stroke_rect(&mut surface, &layout.rect, color);
            self.draw_label(&mut surface, layout, color);
        }

        RenderedOverlay { surface, layouts }
    }

    /// Decodes an uploaded image and draws regions over it.
    ///
    /// Rendering waits for the decode to finish.
    #[instrument(skip(self, image, regions), fields(image = image.name(), regions = regions.len()))]
    pub async fn render_uploaded(
        &self,
        image: &UploadedImage,
        regions: &[DetectedRegion],
    ) -> CoreResult<RenderedOverlay> {
        let bytes: Arc<[u8]> = Arc::from(image.bytes());
        let base = tokio::task::spawn_blocking(move || decode_image(&bytes))
            .await
            .map_err(|e| CoreError::Internal(format!("Decode task failed: {}", e)))??;

        debug!("Decoded {}x{} image", base.width(), base.height());
        Ok(self.render(&base, regions))
    }

    fn draw_label(&self, surface: &mut RgbaImage, layout: &RegionLayout, color: Rgba<u8>) {
        let label_box = layout.label_box;
        draw_filled_rect_mut(
            surface,
            Rect::at(label_box.x, label_box.y).of_size(label_box.width, label_box.height),
            color,
        );

        if let Some(font) = self.font.as_deref() {
            let text_y = label_box.y + ((label_box.height - LABEL_TEXT_HEIGHT) / 2) as i32;
            draw_text_mut(
                surface,
                LABEL_TEXT_COLOR,
                label_box.x + LABEL_PADDING as i32,
                text_y,
                PxScale::from(LABEL_FONT_SIZE),
                font.font(),
                &layout.label,
            );
        }
    }
}

/// Decodes image bytes into RGBA pixels
pub fn decode_image(bytes: &[u8]) -> CoreResult<RgbaImage> {
    image::load_from_memory(bytes)
        .map(|decoded| decoded.to_rgba8())
        .map_err(|e| CoreError::ImageDecode(e.to_string()))
}

/// Rounds a pixel coordinate after clamping it to just past the surface edge
fn surface_px(value: f64, limit: u32) -> i32 {
    let margin = STROKE_WIDTH as f64;
    value.clamp(-margin, limit as f64 + margin).round() as i32
}

/// Strokes a rectangle with `STROKE_WIDTH` nested outlines centered on its edge
fn stroke_rect(surface: &mut RgbaImage, rect: &PixelRect, color: Rgba<u8>) {
    let (surface_width, surface_height) = surface.dimensions();
    let x = surface_px(rect.x, surface_width);
    let y = surface_px(rect.y, surface_height);
    let width = surface_px(rect.x + rect.width, surface_width) - x;
    let height = surface_px(rect.y + rect.height, surface_height) - y;
    let half = (STROKE_WIDTH / 2) as i32;

    for offset in -half..(STROKE_WIDTH as i32 - half) {
        let w = width - 2 * offset;
        let h = height - 2 * offset;
        if w <= 0 || h <= 0 {
            continue;
        }
        draw_hollow_rect_mut(
            surface,
            Rect::at(x + offset, y + offset).of_size(w as u32, h as u32),
            color,
        );
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::search::NormalizedBox;
    use crate::core::upload::{SelectedFile, UploadValidator};
    use image::ImageFormat;
    use std::io::Cursor;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn blank(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, BLACK)
    }

    fn shoe_regions() -> Vec<DetectedRegion> {
        vec![
            DetectedRegion::new("shoe", 0.91, NormalizedBox::new(0.1, 0.2, 0.5, 0.6)),
            DetectedRegion::new("shoe", 0.77, NormalizedBox::new(0.55, 0.25, 0.9, 0.65)),
        ]
    }

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    // -------------------------------------------------------------------------
    // Palette Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_palette_wraps() {
        assert_eq!(palette_index(0), 0);
        assert_eq!(palette_index(4), 4);
        assert_eq!(palette_index(5), 0);
        assert_eq!(palette_color(7), PALETTE[2]);
    }

    // -------------------------------------------------------------------------
    // Layout Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_layout_maps_boxes_to_natural_pixels() {
        let renderer = OverlayRenderer::new(None);
        let layouts = renderer.layout(400, 300, &shoe_regions());

        assert_eq!(layouts.len(), 2);
        let first = &layouts[0].rect;
        assert!((first.x - 40.0).abs() < 1e-9);
        assert!((first.y - 60.0).abs() < 1e-9);
        assert!((first.width - 160.0).abs() < 1e-9);
        assert!((first.height - 120.0).abs() < 1e-9);

        let second = &layouts[1].rect;
        assert!((second.x - 220.0).abs() < 1e-9);
        assert!((second.y - 75.0).abs() < 1e-9);
        assert!((second.width - 140.0).abs() < 1e-9);
        assert!((second.height - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_layout_keeps_input_order_and_labels() {
        let renderer = OverlayRenderer::new(None);
        let regions = vec![
            DetectedRegion::new("bag", 0.2, NormalizedBox::new(0.0, 0.5, 1.0, 1.0)),
            DetectedRegion::new("hat", 0.99, NormalizedBox::new(0.2, 0.5, 0.3, 0.6)),
        ];
        let layouts = renderer.layout(100, 100, &regions);

        assert_eq!(layouts[0].label, "bag (20%)");
        assert_eq!(layouts[0].color_index, 0);
        assert_eq!(layouts[1].label, "hat (99%)");
        assert_eq!(layouts[1].color_index, 1);
    }

    #[test]
    fn test_label_sits_above_box() {
        let renderer = OverlayRenderer::new(None);
        let layouts = renderer.layout(400, 300, &shoe_regions());
        let label = layouts[0].label_box;

        assert_eq!(label.x, 40);
        assert_eq!(label.y, 60 - 32);
        assert_eq!(label.height, LABEL_TEXT_HEIGHT + LABEL_PADDING);
        // "shoe (91%)" at the fallback advance of 10px per char
        assert_eq!(label.width, 100 + 16);
    }

    #[test]
    fn test_label_clamped_at_top_edge() {
        let renderer = OverlayRenderer::new(None);
        let regions = vec![DetectedRegion::new(
            "hat",
            0.5,
            NormalizedBox::new(0.1, 0.0, 0.4, 0.3),
        )];
        let layouts = renderer.layout(200, 200, &regions);
        assert_eq!(layouts[0].label_box.y, 0);

        let overlay = renderer.render(&blank(200, 200), &regions);
        assert_eq!(*overlay.surface().get_pixel(25, 10), PALETTE[0]);
    }

    // -------------------------------------------------------------------------
    // Render Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_render_surface_matches_natural_size() {
        let renderer = OverlayRenderer::new(None);
        let overlay = renderer.render(&blank(321, 123), &shoe_regions());
        assert_eq!(overlay.width(), 321);
        assert_eq!(overlay.height(), 123);
    }

    #[test]
    fn test_render_uses_palette_by_index() {
        let renderer = OverlayRenderer::new(None);
        let overlay = renderer.render(&blank(400, 300), &shoe_regions());
        let surface = overlay.surface();

        // Left edge of box 1 and right edge of box 2
        assert_eq!(*surface.get_pixel(40, 120), PALETTE[0]);
        assert_eq!(*surface.get_pixel(360, 150), PALETTE[1]);
        // Label background of box 1
        assert_eq!(*surface.get_pixel(45, 35), PALETTE[0]);
        // Untouched background
        assert_eq!(*surface.get_pixel(10, 290), BLACK);
        assert_eq!(*surface.get_pixel(120, 120), BLACK);
    }

    #[test]
    fn test_render_is_idempotent() {
        let renderer = OverlayRenderer::new(None);
        let base = blank(400, 300);
        let first = renderer.render(&base, &shoe_regions());
        let second = renderer.render(&base, &shoe_regions());

        assert_eq!(first.surface().as_raw(), second.surface().as_raw());
        assert_eq!(first.layouts(), second.layouts());
    }

    #[test]
    fn test_render_without_regions_is_base_image() {
        let renderer = OverlayRenderer::new(None);
        let base = blank(50, 40);
        let overlay = renderer.render(&base, &[]);
        assert_eq!(overlay.surface().as_raw(), base.as_raw());
        assert!(overlay.layouts().is_empty());
    }

    #[test]
    fn test_render_degenerate_box_does_not_panic() {
        let renderer = OverlayRenderer::new(None);
        let regions = vec![
            DetectedRegion::new("dot", 0.5, NormalizedBox::new(0.5, 0.5, 0.5, 0.5)),
            DetectedRegion::new("edge", 0.5, NormalizedBox::new(0.9, 0.9, 1.0, 1.0)),
        ];
        let overlay = renderer.render(&blank(20, 20), &regions);
        assert_eq!(overlay.layouts().len(), 2);
    }

    #[test]
    fn test_render_out_of_range_box_does_not_panic() {
        let renderer = OverlayRenderer::new(None);
        let regions = vec![
            DetectedRegion::new("huge", 0.5, NormalizedBox::new(0.0, 0.0, 1e12, 1e12)),
            DetectedRegion::new("far", 0.5, NormalizedBox::new(-1e12, -1e12, 0.5, 0.5)),
            DetectedRegion::new("nan", 0.5, NormalizedBox::new(f64::NAN, 0.0, 1.0, f64::NAN)),
        ];
        let overlay = renderer.render(&blank(20, 20), &regions);

        assert_eq!(overlay.layouts().len(), 3);
        assert_eq!((overlay.width(), overlay.height()), (20, 20));
        // Clamped regions are still drawn
        assert_ne!(*overlay.surface().get_pixel(0, 19), BLACK);
    }

    // -------------------------------------------------------------------------
    // Hit-Testing Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_region_at_prefers_last_drawn() {
        let renderer = OverlayRenderer::new(None);
        let regions = vec![
            DetectedRegion::new("outer", 0.9, NormalizedBox::new(0.0, 0.0, 1.0, 1.0)),
            DetectedRegion::new("inner", 0.8, NormalizedBox::new(0.4, 0.4, 0.6, 0.6)),
        ];
        let overlay = renderer.render(&blank(100, 100), &regions);

        assert_eq!(overlay.region_at(50.0, 50.0), Some(1));
        assert_eq!(overlay.region_at(10.0, 10.0), Some(0));
    }

    #[test]
    fn test_region_at_misses() {
        let renderer = OverlayRenderer::new(None);
        let overlay = renderer.render(&blank(400, 300), &shoe_regions());
        assert_eq!(overlay.region_at(5.0, 5.0), None);
    }

    #[test]
    fn test_scale_pointer_to_natural_pixels() {
        let renderer = OverlayRenderer::new(None);
        let overlay = renderer.render(&blank(400, 300), &[]);

        let (x, y) = overlay.scale_pointer(200.0, 150.0, 50.0, 30.0);
        assert!((x - 100.0).abs() < 1e-9);
        assert!((y - 60.0).abs() < 1e-9);
        assert_eq!(overlay.scale_pointer(0.0, 150.0, 5.0, 6.0), (5.0, 6.0));
    }

    // -------------------------------------------------------------------------
    // Decode Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_render_uploaded_decodes_first() {
        let base = blank(40, 30);
        let image = UploadValidator::default()
            .validate(SelectedFile::new("a.png", "image/png", png_bytes(&base)))
            .unwrap();

        let overlay = OverlayRenderer::new(None)
            .render_uploaded(&image, &[])
            .await
            .unwrap();
        assert_eq!((overlay.width(), overlay.height()), (40, 30));
    }

    #[tokio::test]
    async fn test_render_uploaded_rejects_undecodable() {
        let image = UploadValidator::default()
            .validate(SelectedFile::new("a.png", "image/png", b"not a png".to_vec()))
            .unwrap();

        let result = OverlayRenderer::new(None).render_uploaded(&image, &[]).await;
        assert!(matches!(result, Err(CoreError::ImageDecode(_))));
    }

    #[test]
    fn test_save_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.png");
        let overlay = OverlayRenderer::new(None).render(&blank(10, 10), &shoe_regions());

        overlay.save(&path).unwrap();
        let reloaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(reloaded.as_raw(), overlay.surface().as_raw());
    }
}
