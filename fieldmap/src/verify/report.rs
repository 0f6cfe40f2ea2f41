//! Verification report types and renderings.

use std::fmt;

use serde::Serialize;

/// Installation state of one region as seen on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionStatus {
    /// The region folder does not exist.
    Missing,
    /// The folder exists but holds no zoom level.
    Empty,
    /// Some expected zoom levels are absent or hold no tiles.
    Partial,
    /// Every expected zoom level is present with tiles.
    Complete,
}

impl RegionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Empty => "empty",
            Self::Partial => "partial",
            Self::Complete => "complete",
        }
    }

    /// Installed means at least one zoom level exists.
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Partial | Self::Complete)
    }
}

impl fmt::Display for RegionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tile picked as evidence for a zoom level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSample {
    /// Path relative to the region folder, e.g. `5/12/7.pbf`.
    pub path: String,
    pub size: u64,
}

/// One zoom level of one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomLevelReport {
    pub level: u8,
    pub exists: bool,
    /// Number of x folders.
    pub tile_folders: usize,
    /// Number of `.pbf` files across all x folders.
    pub tile_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_tile_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_tile_size: Option<u64>,
    /// Up to three sample tiles.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<TileSample>,
    /// Level outside the expected zoom range.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unexpected: bool,
}

/// One catalog region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionReport {
    pub id: String,
    pub display_name: String,
    pub folder: String,
    pub exists: bool,
    pub status: RegionStatus,
    pub zoom_levels: Vec<ZoomLevelReport>,
}

impl RegionReport {
    /// Zoom levels present on disk, ascending.
    pub fn present_levels(&self) -> Vec<u8> {
        self.zoom_levels
            .iter()
            .filter(|z| z.exists)
            .map(|z| z.level)
            .collect()
    }

    pub fn tile_count(&self) -> usize {
        self.zoom_levels.iter().map(|z| z.tile_count).sum()
    }
}

/// Structured verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDetails {
    pub maps_directory: String,
    pub maps_directory_exists: bool,
    pub regions: Vec<RegionReport>,
}

/// Result of walking the tile tree once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    /// At least one region has at least one zoom level.
    pub success: bool,
    pub summary: String,
    /// Human-readable tree, built from the same walk as `details`.
    pub tree: String,
    pub details: VerificationDetails,
}

impl VerificationReport {
    /// Assemble a report from walked details.
    pub fn from_details(details: VerificationDetails) -> Self {
        let success = details.regions.iter().any(|r| r.status.is_installed());
        let summary = summarize(&details);
        let tree = render_tree(&details);
        Self {
            success,
            summary,
            tree,
            details,
        }
    }

    pub fn region(&self, id: &str) -> Option<&RegionReport> {
        self.details.regions.iter().find(|r| r.id == id)
    }

    /// Generate a JSON-formatted report string.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }

    /// Generate a text-formatted report string.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();

        lines.push("Map Data Verification".to_string());
        lines.push("=====================".to_string());
        lines.push(String::new());

        lines.push("Summary".to_string());
        lines.push("-------".to_string());
        lines.push(self.summary.clone());
        lines.push(String::new());

        lines.push("Regions".to_string());
        lines.push("-------".to_string());
        for region in &self.details.regions {
            let levels = region.present_levels();
            if levels.is_empty() {
                lines.push(format!("  {} ({}): {}", region.display_name, region.id, region.status));
            } else {
                lines.push(format!(
                    "  {} ({}): {}, zoom {:?}, {} tiles",
                    region.display_name,
                    region.id,
                    region.status,
                    levels,
                    region.tile_count()
                ));
            }
        }
        lines.push(String::new());

        lines.push("Directory Tree".to_string());
        lines.push("--------------".to_string());
        lines.push(self.tree.clone());

        lines.join("\n")
    }
}

fn summarize(details: &VerificationDetails) -> String {
    if !details.maps_directory_exists {
        return format!("Maps directory {} does not exist", details.maps_directory);
    }

    let installed: Vec<&RegionReport> = details
        .regions
        .iter()
        .filter(|r| r.status.is_installed())
        .collect();

    if installed.is_empty() {
        return format!("No regions installed ({} in catalog)", details.regions.len());
    }

    let names: Vec<String> = installed
        .iter()
        .map(|r| {
            let levels = r.present_levels();
            match (levels.first(), levels.last()) {
                (Some(lo), Some(hi)) if lo != hi => format!("{} (zoom {}-{})", r.id, lo, hi),
                (Some(lo), _) => format!("{} (zoom {})", r.id, lo),
                _ => r.id.clone(),
            }
        })
        .collect();

    format!(
        "{} of {} regions installed: {}",
        installed.len(),
        details.regions.len(),
        names.join(", ")
    )
}

fn render_tree(details: &VerificationDetails) -> String {
    let mut lines = vec![details.maps_directory.clone()];
    if !details.maps_directory_exists {
        lines.push("└── (missing)".to_string());
        return lines.join("\n");
    }

    let region_count = details.regions.len();
    for (i, region) in details.regions.iter().enumerate() {
        let last_region = i + 1 == region_count;
        let (branch, indent) = if last_region {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        lines.push(format!("{}{}/ [{}]", branch, region.folder, region.status));

        let present: Vec<&ZoomLevelReport> =
            region.zoom_levels.iter().filter(|z| z.exists).collect();
        for (j, zoom) in present.iter().enumerate() {
            let last_zoom = j + 1 == present.len();
            let (zoom_branch, zoom_indent) = if last_zoom {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            lines.push(format!(
                "{}{}{}/ ({} folders, {} tiles)",
                indent, zoom_branch, zoom.level, zoom.tile_folders, zoom.tile_count
            ));
            for sample in &zoom.samples {
                lines.push(format!(
                    "{}{}    {} ({})",
                    indent,
                    zoom_indent,
                    sample.path,
                    format_size(sample.size)
                ));
            }
        }
    }

    lines.join("\n")
}

/// Format a size in bytes as a human-readable string.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
