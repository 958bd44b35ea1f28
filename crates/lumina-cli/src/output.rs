//! Output formatting for workflow results.
//!
//! Supports human-readable terminal output and JSON for scripting.

use lumina_core::core::workflow::WorkflowView;
use lumina_core::{DetectedRegion, NormalizedBox, SearchResult};
use serde::Serialize;

/// JSON output structure for a finished command
#[derive(Serialize)]
pub struct JsonOutput<'a> {
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<&'a [DetectedRegion]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_region: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<&'a [SearchResult]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

/// Formats the workflow view as JSON.
pub fn format_json(view: &WorkflowView) -> String {
    let detection = view.detection.as_ref();
    let output = JsonOutput {
        phase: view.phase.to_string(),
        query: view.query.as_deref(),
        image: detection.map(|d| d.image.name()),
        regions: detection.map(|d| d.regions.as_slice()),
        selected_region: detection.and_then(|d| d.selected),
        results: view.results.as_deref(),
        error: view.error.as_deref(),
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

/// Formats the workflow view for the terminal.
pub fn format_human(view: &WorkflowView) -> String {
    let mut out = Vec::new();

    if let Some(detection) = &view.detection {
        out.push(format_regions(
            detection.image.name(),
            &detection.regions,
            detection.selected,
        ));
    }
    if let Some(results) = &view.results {
        out.push(format_results(results));
    }

    out.join("\n")
}

/// Lists detected regions with their index, for use with `similar --region`
pub fn format_regions(image: &str, regions: &[DetectedRegion], selected: Option<usize>) -> String {
    if regions.is_empty() {
        return format!("No objects detected in {}", image);
    }

    let mut lines = vec![format!("Detected {} regions in {}", regions.len(), image)];
    for (index, region) in regions.iter().enumerate() {
        let marker = if selected == Some(index) { "*" } else { " " };
        lines.push(format!(
            "{} [{}] {}  {}",
            marker,
            index,
            region.display_label(),
            format_box(&region.bbox)
        ));
    }
    lines.join("\n")
}

/// Lists ranked results in service order
pub fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No similar products found".to_string();
    }

    let mut lines = Vec::with_capacity(results.len() * 2);
    for (rank, result) in results.iter().enumerate() {
        let mut line = format!("{:>2}. {}", rank + 1, result.display_title());
        if let Some(price) = result.price {
            line.push_str(&format!("  ${:.2}", price));
        }
        if let Some(category) = &result.category {
            line.push_str(&format!("  [{}]", category));
        }
        line.push_str(&format!("  {}%", result.score_percent()));
        lines.push(line);

        if let Some(url) = result.product_url.as_ref().or(result.image_url.as_ref()) {
            lines.push(format!("    {}", url));
        }
    }
    lines.join("\n")
}

fn format_box(bbox: &NormalizedBox) -> String {
    format!(
        "({:.2}, {:.2}, {:.2}, {:.2})",
        bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax
    )
}
