//! On-disk tile pyramid layout.
//!
//! ```text
//! {maps_root}/
//! ├── style-{region.id}.json
//! └── {region.folder_name}/
//!     ├── .normalized
//!     └── {zoom}/{x}/{y}.pbf
//! ```
//!
//! [`TileStore`] only answers path and existence/size questions; it never
//! mutates the tree. Mutations go through the lifecycle manager.

use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::coord::TileCoordinate;
use crate::error::{MapError, MapResult};
use crate::region::Region;

/// File extension of vector tiles.
pub const TILE_EXTENSION: &str = "pbf";

/// Zoom levels shipped in region archives.
pub const DEFAULT_ZOOM_RANGE: RangeInclusive<u8> = 5..=14;

/// Marker written into a region folder after an exhaustive decompression
/// pass finished without failures.
pub const NORMALIZED_MARKER: &str = ".normalized";

/// Path and existence queries over the tile pyramid.
#[derive(Debug, Clone)]
pub struct TileStore {
    maps_root: PathBuf,
    zoom_range: RangeInclusive<u8>,
}

impl TileStore {
    /// Create a store rooted at `maps_root` with the default zoom range.
    pub fn new(maps_root: impl Into<PathBuf>) -> Self {
        Self {
            maps_root: maps_root.into(),
            zoom_range: DEFAULT_ZOOM_RANGE,
        }
    }

    /// Set the zoom levels regions are expected to contain.
    pub fn with_zoom_range(mut self, zoom_range: RangeInclusive<u8>) -> Self {
        self.zoom_range = zoom_range;
        self
    }

    pub fn maps_root(&self) -> &Path {
        &self.maps_root
    }

    pub fn zoom_range(&self) -> RangeInclusive<u8> {
        self.zoom_range.clone()
    }

    /// Folder holding the region's tile pyramid.
    pub fn region_dir(&self, region: &Region) -> PathBuf {
        self.maps_root.join(&region.folder_name)
    }

    pub fn tile_path(&self, region: &Region, tile: &TileCoordinate) -> PathBuf {
        self.region_dir(region).join(tile.relative_path())
    }

    /// Tile URL template handed to the renderer.
    pub fn tile_template(&self, region: &Region) -> String {
        format!(
            "file://{}/{{z}}/{{x}}/{{y}}.{}",
            self.region_dir(region).display(),
            TILE_EXTENSION
        )
    }

    pub fn manifest_path(&self, region: &Region) -> PathBuf {
        self.maps_root.join(format!("style-{}.json", region.id))
    }

    pub fn marker_path(&self, region: &Region) -> PathBuf {
        self.region_dir(region).join(NORMALIZED_MARKER)
    }

    pub fn region_exists(&self, region: &Region) -> bool {
        self.region_dir(region).is_dir()
    }

    /// Numeric zoom folders present under the region, ascending.
    pub fn zoom_levels(&self, region: &Region) -> Vec<u8> {
        zoom_levels_in(&self.region_dir(region))
    }

    /// A region is installed when its folder holds at least one zoom level.
    pub fn is_installed(&self, region: &Region) -> bool {
        has_zoom_level(&self.region_dir(region))
    }

    pub fn has_manifest(&self, region: &Region) -> bool {
        self.manifest_path(region).is_file()
    }

    /// A region is ready when it is installed and its style manifest exists.
    pub fn is_ready(&self, region: &Region) -> bool {
        self.is_installed(region) && self.has_manifest(region)
    }

    pub fn is_normalized(&self, region: &Region) -> bool {
        self.marker_path(region).is_file()
    }

    pub fn tile_exists(&self, region: &Region, tile: &TileCoordinate) -> bool {
        self.tile_path(region, tile).is_file()
    }

    /// Total size of the region's tile files in bytes.
    pub fn region_size(&self, region: &Region) -> MapResult<u64> {
        tiles_size(&self.region_dir(region))
    }
}

/// Returns true if the path has the tile extension.
pub fn is_tile_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == TILE_EXTENSION)
        .unwrap_or(false)
}

/// Parse a directory name as a zoom level.
pub(crate) fn parse_zoom(name: &str) -> Option<u8> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Numeric subdirectories of `dir`, ascending. Missing dirs yield nothing.
pub(crate) fn zoom_levels_in(dir: &Path) -> Vec<u8> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut levels: Vec<u8> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| parse_zoom(&e.file_name().to_string_lossy()))
        .collect();
    levels.sort_unstable();
    levels
}

pub(crate) fn has_zoom_level(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };

    entries
        .flatten()
        .any(|e| e.path().is_dir() && parse_zoom(&e.file_name().to_string_lossy()).is_some())
}

/// Collect every tile file under `dir`, sorted by path.
///
/// A missing directory yields an empty list.
pub fn collect_tiles(dir: &Path) -> MapResult<Vec<PathBuf>> {
    let mut tiles = Vec::new();
    if dir.exists() {
        collect_tiles_into(dir, &mut tiles)?;
    }
    tiles.sort();
    Ok(tiles)
}

fn collect_tiles_into(dir: &Path, tiles: &mut Vec<PathBuf>) -> MapResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| MapError::read(dir, e))?;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tiles_into(&path, tiles)?;
        } else if is_tile_file(&path) {
            tiles.push(path);
        }
    }

    Ok(())
}

/// Collect up to `limit` tile files, descending at most `max_depth` levels.
///
/// Directories are visited in name order so the sample is deterministic.
pub fn sample_tiles(dir: &Path, limit: usize, max_depth: usize) -> Vec<PathBuf> {
    let mut sample = Vec::new();
    sample_tiles_into(dir, limit, max_depth, &mut sample);
    sample
}

fn sample_tiles_into(dir: &Path, limit: usize, depth_left: usize, sample: &mut Vec<PathBuf>) {
    if sample.len() >= limit {
        return;
    }

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        if sample.len() >= limit {
            return;
        }
        if path.is_dir() {
            if depth_left > 0 {
                sample_tiles_into(&path, limit, depth_left - 1, sample);
            }
        } else if is_tile_file(&path) {
            sample.push(path);
        }
    }
}

/// Sum of tile file sizes under `dir`. A missing directory is zero bytes.
pub fn tiles_size(dir: &Path) -> MapResult<u64> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut total = 0u64;
    for tile in collect_tiles(dir)? {
        match fs::metadata(&tile) {
            Ok(meta) => total += meta.len(),
            // Removed between listing and stat.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(MapError::read(tile, e)),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionCatalog;
    use tempfile::TempDir;

    fn sumut() -> Region {
        RegionCatalog::builtin().get("sumut").unwrap().clone()
    }

    fn write_tile(store: &TileStore, region: &Region, tile: TileCoordinate, bytes: &[u8]) {
        let path = store.tile_path(region, &tile);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_paths() {
        let store = TileStore::new("/data/maps");
        let region = sumut();

        assert_eq!(store.region_dir(&region), PathBuf::from("/data/maps/sumut"));
        assert_eq!(
            store.tile_path(&region, &TileCoordinate::new(5, 12, 7)),
            PathBuf::from("/data/maps/sumut/5/12/7.pbf")
        );
        assert_eq!(
            store.manifest_path(&region),
            PathBuf::from("/data/maps/style-sumut.json")
        );
        assert_eq!(
            store.tile_template(&region),
            "file:///data/maps/sumut/{z}/{x}/{y}.pbf"
        );
    }

    #[test]
    fn test_missing_region_is_not_installed() {
        let temp = TempDir::new().unwrap();
        let store = TileStore::new(temp.path());
        let region = sumut();

        assert!(!store.region_exists(&region));
        assert!(!store.is_installed(&region));
        assert!(!store.is_ready(&region));
        assert!(store.zoom_levels(&region).is_empty());
        assert_eq!(store.region_size(&region).unwrap(), 0);
    }

    #[test]
    fn test_empty_region_folder_is_not_installed() {
        let temp = TempDir::new().unwrap();
        let store = TileStore::new(temp.path());
        let region = sumut();
        fs::create_dir_all(store.region_dir(&region).join("not-a-zoom")).unwrap();

        assert!(store.region_exists(&region));
        assert!(!store.is_installed(&region));
    }

    #[test]
    fn test_installed_and_ready() {
        let temp = TempDir::new().unwrap();
        let store = TileStore::new(temp.path());
        let region = sumut();
        write_tile(&store, &region, TileCoordinate::new(5, 12, 7), b"abc");

        assert!(store.is_installed(&region));
        assert!(!store.is_ready(&region));

        fs::write(store.manifest_path(&region), "{}").unwrap();
        assert!(store.is_ready(&region));
    }

    #[test]
    fn test_zoom_levels_sorted_numeric_only() {
        let temp = TempDir::new().unwrap();
        let store = TileStore::new(temp.path());
        let region = sumut();
        for name in ["14", "5", "6", "tmp", "7a"] {
            fs::create_dir_all(store.region_dir(&region).join(name)).unwrap();
        }

        assert_eq!(store.zoom_levels(&region), vec![5, 6, 14]);
    }

    #[test]
    fn test_region_size_counts_only_tiles() {
        let temp = TempDir::new().unwrap();
        let store = TileStore::new(temp.path());
        let region = sumut();
        write_tile(&store, &region, TileCoordinate::new(5, 12, 7), &[0u8; 100]);
        write_tile(&store, &region, TileCoordinate::new(6, 25, 14), &[0u8; 50]);
        fs::write(store.marker_path(&region), "ok").unwrap();

        assert_eq!(store.region_size(&region).unwrap(), 150);
    }

    #[test]
    fn test_tile_exists() {
        let temp = TempDir::new().unwrap();
        let store = TileStore::new(temp.path());
        let region = sumut();
        let tile = TileCoordinate::new(5, 12, 7);
        assert!(!store.tile_exists(&region, &tile));

        write_tile(&store, &region, tile, b"x");
        assert!(store.tile_exists(&region, &tile));
    }

    #[test]
    fn test_sample_tiles_respects_limit_and_depth() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for x in 0..5 {
            let dir = root.join("5").join(x.to_string());
            fs::create_dir_all(&dir).unwrap();
            for y in 0..5 {
                fs::write(dir.join(format!("{}.pbf", y)), b"t").unwrap();
            }
        }

        assert_eq!(sample_tiles(root, 10, 4).len(), 10);
        // Tiles live two directories down.
        assert!(sample_tiles(root, 10, 1).is_empty());
    }

    #[test]
    fn test_collect_tiles_sorted() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("6/1")).unwrap();
        fs::create_dir_all(root.join("5/1")).unwrap();
        fs::write(root.join("6/1/2.pbf"), b"b").unwrap();
        fs::write(root.join("5/1/2.pbf"), b"a").unwrap();
        fs::write(root.join("5/1/readme.txt"), b"a").unwrap();

        let tiles = collect_tiles(root).unwrap();
        assert_eq!(tiles, vec![root.join("5/1/2.pbf"), root.join("6/1/2.pbf")]);
    }

    #[test]
    fn test_parse_zoom() {
        assert_eq!(parse_zoom("5"), Some(5));
        assert_eq!(parse_zoom("14"), Some(14));
        assert_eq!(parse_zoom("-1"), None);
        assert_eq!(parse_zoom("+5"), None);
        assert_eq!(parse_zoom(""), None);
        assert_eq!(parse_zoom("999"), None);
    }
}
