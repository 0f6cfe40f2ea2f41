//! Region catalog for downloadable offline map areas.
//!
//! A [`Region`] describes one archive that can be fetched from the tile
//! server: its id (also the archive name), a display name, the folder the
//! archive unpacks into, and the map framing used by the style manifest.
//!
//! The built-in catalog covers the plantation provinces served by the
//! default tile server. Deployments with a different server can load their
//! own catalog from JSON with [`RegionCatalog::from_json_file`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::coord::{self, CoordError, TileRange};
use crate::error::{MapError, MapResult};

/// Geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeoBounds {
    /// Returns true if the point lies inside the box (edges included).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.min_lon..=self.max_lon).contains(&lon) && (self.min_lat..=self.max_lat).contains(&lat)
    }
}

/// A downloadable map region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Catalog identity, also the archive file stem on the server.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Top-level folder inside the archive and under the maps root.
    pub folder_name: String,
    /// Approximate archive size, for display before download.
    pub approx_size_bytes: u64,
    /// Initial map center.
    pub center: LatLon,
    /// Initial map zoom.
    pub default_zoom: u8,
    /// Area covered by the archive.
    pub bounds: GeoBounds,
}

impl Region {
    /// Tiles covering the region at the given zoom level.
    pub fn tile_range(&self, zoom: u8) -> Result<TileRange, CoordError> {
        coord::tile_range(
            self.bounds.min_lon,
            self.bounds.min_lat,
            self.bounds.max_lon,
            self.bounds.max_lat,
            zoom,
        )
    }

    /// Returns true if the point lies inside the region bounds.
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        self.bounds.contains(lon, lat)
    }
}

/// Read-only collection of regions, looked up by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionCatalog {
    regions: Vec<Region>,
}

impl Default for RegionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RegionCatalog {
    /// Create a catalog from an explicit region list.
    ///
    /// Fails if two regions share an id or a folder name.
    pub fn new(regions: Vec<Region>) -> MapResult<Self> {
        for (i, region) in regions.iter().enumerate() {
            if regions[..i].iter().any(|r| r.id == region.id) {
                return Err(MapError::Config(format!(
                    "duplicate region id '{}'",
                    region.id
                )));
            }
            if regions[..i].iter().any(|r| r.folder_name == region.folder_name) {
                return Err(MapError::Config(format!(
                    "duplicate region folder '{}'",
                    region.folder_name
                )));
            }
        }
        Ok(Self { regions })
    }

    /// Load a catalog from a JSON file containing an array of regions.
    pub fn from_json_file(path: &Path) -> MapResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| MapError::read(path, e))?;
        let regions: Vec<Region> = serde_json::from_str(&content).map_err(|e| {
            MapError::Config(format!("invalid catalog {}: {}", path.display(), e))
        })?;
        Self::new(regions)
    }

    /// The catalog shipped with the app.
    pub fn builtin() -> Self {
        Self {
            regions: vec![
                region(
                    "sumut",
                    "Sumatera Utara",
                    "sumut",
                    180 * MB,
                    (2.1154, 99.5451),
                    GeoBounds {
                        min_lon: 97.0,
                        min_lat: -0.7,
                        max_lon: 100.5,
                        max_lat: 4.4,
                    },
                ),
                region(
                    "riau",
                    "Riau",
                    "riau",
                    150 * MB,
                    (0.2933, 101.7068),
                    GeoBounds {
                        min_lon: 100.0,
                        min_lat: -1.2,
                        max_lon: 103.9,
                        max_lat: 2.6,
                    },
                ),
                region(
                    "jambi",
                    "Jambi",
                    "jambi",
                    110 * MB,
                    (-1.6101, 103.6131),
                    GeoBounds {
                        min_lon: 101.1,
                        min_lat: -2.8,
                        max_lon: 104.5,
                        max_lat: -0.7,
                    },
                ),
                region(
                    "sumsel",
                    "Sumatera Selatan",
                    "sumsel",
                    160 * MB,
                    (-3.3194, 103.9144),
                    GeoBounds {
                        min_lon: 102.0,
                        min_lat: -5.0,
                        max_lon: 106.2,
                        max_lat: -1.5,
                    },
                ),
                region(
                    "kalbar",
                    "Kalimantan Barat",
                    "kalbar",
                    170 * MB,
                    (-0.2788, 111.4753),
                    GeoBounds {
                        min_lon: 108.5,
                        min_lat: -3.1,
                        max_lon: 114.2,
                        max_lat: 2.1,
                    },
                ),
            ],
        }
    }

    /// Look up a region by id.
    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    /// Look up a region by id, failing with `RegionNotFound`.
    pub fn require(&self, id: &str) -> MapResult<&Region> {
        self.get(id)
            .ok_or_else(|| MapError::RegionNotFound(id.to_string()))
    }

    /// All regions in catalog order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Regions whose bounds contain the point.
    pub fn regions_at(&self, lon: f64, lat: f64) -> Vec<&Region> {
        self.regions.iter().filter(|r| r.covers(lon, lat)).collect()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

const MB: u64 = 1024 * 1024;

fn region(
    id: &str,
    display_name: &str,
    folder_name: &str,
    approx_size_bytes: u64,
    (lat, lon): (f64, f64),
    bounds: GeoBounds,
) -> Region {
    Region {
        id: id.to_string(),
        display_name: display_name.to_string(),
        folder_name: folder_name.to_string(),
        approx_size_bytes,
        center: LatLon { lat, lon },
        default_zoom: 8,
        bounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_lookup() {
        let catalog = RegionCatalog::builtin();
        let sumut = catalog.get("sumut").unwrap();
        assert_eq!(sumut.display_name, "Sumatera Utara");
        assert_eq!(sumut.folder_name, "sumut");
        assert!(catalog.get("atlantis").is_none());
    }

    #[test]
    fn test_require_unknown_region() {
        let catalog = RegionCatalog::builtin();
        let err = catalog.require("atlantis").unwrap_err();
        assert!(matches!(err, MapError::RegionNotFound(id) if id == "atlantis"));
    }

    #[test]
    fn test_builtin_centers_inside_bounds() {
        for region in RegionCatalog::builtin().regions() {
            assert!(
                region.covers(region.center.lon, region.center.lat),
                "{} center outside its bounds",
                region.id
            );
        }
    }

    #[test]
    fn test_builtin_is_valid_catalog() {
        let builtin = RegionCatalog::builtin();
        let rebuilt = RegionCatalog::new(builtin.regions().to_vec()).unwrap();
        assert_eq!(rebuilt.len(), builtin.len());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let sumut = RegionCatalog::builtin().get("sumut").unwrap().clone();
        let mut copy = sumut.clone();
        copy.folder_name = "other".to_string();

        let result = RegionCatalog::new(vec![sumut, copy]);
        assert!(matches!(result, Err(MapError::Config(_))));
    }

    #[test]
    fn test_regions_at_point() {
        let catalog = RegionCatalog::builtin();
        let found = catalog.regions_at(98.6722, 3.5952);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "sumut");
    }

    #[test]
    fn test_tile_range_for_region() {
        let sumut = RegionCatalog::builtin().get("sumut").unwrap().clone();
        let low = sumut.tile_range(5).unwrap();
        let high = sumut.tile_range(14).unwrap();
        assert!(high.tile_count() > low.tile_count());
    }

    #[test]
    fn test_from_json_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.json");
        let regions = RegionCatalog::builtin().regions()[..2].to_vec();
        fs::write(&path, serde_json::to_string(&regions).unwrap()).unwrap();

        let catalog = RegionCatalog::from_json_file(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("riau").is_some());
    }

    #[test]
    fn test_from_json_file_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.json");
        fs::write(&path, "{not json").unwrap();

        let result = RegionCatalog::from_json_file(&path);
        assert!(matches!(result, Err(MapError::Config(_))));
    }
}
