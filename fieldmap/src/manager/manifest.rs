//! Per-region style manifest.
//!
//! The renderer opens `style-{id}.json`, which points its single vector
//! source at the region's tile pyramid and carries a fixed set of layers.

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{MapError, MapResult};
use crate::region::Region;

/// Style specification version understood by the renderer.
pub const STYLE_VERSION: u8 = 8;

/// Name of the vector source every layer draws from.
pub const SOURCE_NAME: &str = "offline";

/// Prefix of the manifest `name` field.
pub const NAME_PREFIX: &str = "FieldMap Offline";

/// Style document written next to the tile folders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleManifest {
    pub version: u8,
    pub name: String,
    /// `[lon, lat]`
    pub center: [f64; 2],
    pub zoom: u8,
    pub sources: serde_json::Map<String, Value>,
    pub layers: Vec<StyleLayer>,
}

/// One entry of the `layers` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleLayer {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "source-layer", skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<Value>,
    pub paint: Value,
}

impl StyleLayer {
    fn background(color: &str) -> Self {
        Self {
            id: "background".to_string(),
            kind: "background".to_string(),
            source: None,
            source_layer: None,
            layout: None,
            paint: json!({ "background-color": color }),
        }
    }

    fn vector(id: &str, kind: &str, source_layer: &str, layout: Option<Value>, paint: Value) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            source: Some(SOURCE_NAME.to_string()),
            source_layer: Some(source_layer.to_string()),
            layout,
            paint,
        }
    }
}

impl StyleManifest {
    /// Build the manifest for a region whose tiles are served from
    /// `tile_template`.
    pub fn for_region(region: &Region, tile_template: &str, zoom_range: RangeInclusive<u8>) -> Self {
        let mut sources = serde_json::Map::new();
        sources.insert(
            SOURCE_NAME.to_string(),
            json!({
                "type": "vector",
                "tiles": [tile_template],
                "minzoom": zoom_range.start(),
                "maxzoom": zoom_range.end(),
            }),
        );

        Self {
            version: STYLE_VERSION,
            name: format!("{} - {}", NAME_PREFIX, region.display_name),
            center: [region.center.lon, region.center.lat],
            zoom: region.default_zoom,
            sources,
            layers: default_layers(),
        }
    }

    pub fn to_json_pretty(&self) -> MapResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| MapError::Unknown(format!("failed to serialize style manifest: {}", e)))
    }

    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.id.as_str()).collect()
    }
}

fn default_layers() -> Vec<StyleLayer> {
    vec![
        StyleLayer::background("#f2efe9"),
        StyleLayer::vector("water", "fill", "water", None, json!({ "fill-color": "#a0c8f0" })),
        StyleLayer::vector(
            "landuse",
            "fill",
            "landuse",
            None,
            json!({ "fill-color": "#d8e8c8", "fill-opacity": 0.7 }),
        ),
        StyleLayer::vector(
            "roads",
            "line",
            "transportation",
            Some(json!({ "line-cap": "round", "line-join": "round" })),
            json!({ "line-color": "#ffffff", "line-width": 1.5 }),
        ),
        StyleLayer::vector(
            "labels",
            "symbol",
            "place",
            Some(json!({ "text-field": "{name}", "text-size": 12 })),
            json!({ "text-color": "#333333", "text-halo-color": "#ffffff", "text-halo-width": 1 }),
        ),
    ]
}

/// Write the manifest whole: a sibling temp file is renamed over `path`.
pub fn write_manifest(path: &Path, manifest: &StyleManifest) -> MapResult<()> {
    let failed = |reason: String| MapError::ManifestWriteFailed {
        path: path.to_path_buf(),
        reason,
    };

    let content = manifest.to_json_pretty()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| failed(e.to_string()))?;
    }

    let temp = temp_path(path);
    fs::write(&temp, content).map_err(|e| failed(e.to_string()))?;
    if let Err(e) = fs::rename(&temp, path) {
        fs::remove_file(&temp).ok();
        return Err(failed(e.to_string()));
    }

    debug!(path = %path.display(), "Style manifest written");
    Ok(())
}

/// Read a manifest back.
pub fn read_manifest(path: &Path) -> MapResult<StyleManifest> {
    let content = fs::read_to_string(path).map_err(|e| MapError::read(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| MapError::Unknown(format!("invalid style manifest {}: {}", path.display(), e)))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
