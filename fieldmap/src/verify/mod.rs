//! On-disk structure verification.
//!
//! [`StructureVerifier`] walks the tile tree once per region and produces
//! a [`VerificationReport`] carrying both a structured view and a
//! human-readable tree. It only reads; nothing is repaired here.

mod report;

pub use report::{
    format_size, RegionReport, RegionStatus, TileSample, VerificationDetails, VerificationReport,
    ZoomLevelReport,
};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::region::{Region, RegionCatalog};
use crate::store::{is_tile_file, zoom_levels_in, TileStore};

/// Sample tiles recorded per zoom level.
pub const SAMPLES_PER_LEVEL: usize = 3;

/// Read-only walker over the tile tree.
pub struct StructureVerifier<'a> {
    store: &'a TileStore,
    catalog: &'a RegionCatalog,
}

impl<'a> StructureVerifier<'a> {
    pub fn new(store: &'a TileStore, catalog: &'a RegionCatalog) -> Self {
        Self { store, catalog }
    }

    /// Walk every catalog region and build the report.
    pub fn verify(&self) -> VerificationReport {
        let maps_root = self.store.maps_root();
        let maps_directory_exists = maps_root.is_dir();

        let regions = self
            .catalog
            .regions()
            .iter()
            .map(|region| self.verify_region(region))
            .collect();

        let report = VerificationReport::from_details(VerificationDetails {
            maps_directory: maps_root.display().to_string(),
            maps_directory_exists,
            regions,
        });

        info!(success = report.success, summary = %report.summary, "Map data verified");
        report
    }

    /// Walk a single region.
    pub fn verify_region(&self, region: &Region) -> RegionReport {
        let region_dir = self.store.region_dir(region);
        let exists = region_dir.is_dir();
        let expected = self.store.zoom_range();

        let present: BTreeSet<u8> = zoom_levels_in(&region_dir).into_iter().collect();
        let levels: BTreeSet<u8> = expected.clone().chain(present.iter().copied()).collect();

        let zoom_levels: Vec<ZoomLevelReport> = levels
            .into_iter()
            .map(|level| {
                let mut report = if present.contains(&level) {
                    walk_zoom_level(&region_dir, level)
                } else {
                    absent_level(level)
                };
                report.unexpected = !expected.contains(&level);
                report
            })
            .collect();

        let status = if !exists {
            RegionStatus::Missing
        } else if present.is_empty() {
            RegionStatus::Empty
        } else if zoom_levels
            .iter()
            .filter(|z| !z.unexpected)
            .all(|z| z.exists && z.tile_count > 0)
        {
            RegionStatus::Complete
        } else {
            RegionStatus::Partial
        };

        debug!(region = %region.id, status = %status, levels = present.len(), "Region walked");

        RegionReport {
            id: region.id.clone(),
            display_name: region.display_name.clone(),
            folder: region.folder_name.clone(),
            exists,
            status,
            zoom_levels,
        }
    }
}

fn absent_level(level: u8) -> ZoomLevelReport {
    ZoomLevelReport {
        level,
        exists: false,
        tile_folders: 0,
        tile_count: 0,
        sample_tile_path: None,
        sample_tile_size: None,
        samples: Vec::new(),
        unexpected: false,
    }
}

fn walk_zoom_level(region_dir: &Path, level: u8) -> ZoomLevelReport {
    let zoom_dir = region_dir.join(level.to_string());
    let mut tile_folders = 0;
    let mut tile_count = 0;
    let mut samples = Vec::new();

    for x_dir in sorted_entries(&zoom_dir).into_iter().filter(|p| p.is_dir()) {
        tile_folders += 1;

        for tile in sorted_entries(&x_dir)
            .into_iter()
            .filter(|p| p.is_file() && is_tile_file(p))
        {
            tile_count += 1;
            if samples.len() < SAMPLES_PER_LEVEL {
                let size = fs::metadata(&tile).map(|m| m.len()).unwrap_or(0);
                let path = tile
                    .strip_prefix(region_dir)
                    .unwrap_or(&tile)
                    .to_string_lossy()
                    .replace('\\', "/");
                samples.push(TileSample { path, size });
            }
        }
    }

    let first = samples.first();
    ZoomLevelReport {
        level,
        exists: true,
        tile_folders,
        tile_count,
        sample_tile_path: first.map(|s| s.path.clone()),
        sample_tile_size: first.map(|s| s.size),
        samples,
        unexpected: false,
    }
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();
    paths
}
