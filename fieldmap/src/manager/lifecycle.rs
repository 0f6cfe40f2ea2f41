//! Region lifecycle management.
//!
//! This module orchestrates the full download workflow:
//! 1. Check whether the region is already installed
//! 2. Download the archive into a per-region staging directory
//! 3. Extract the archive next to it
//! 4. Decompress tiles left GZIP-encoded
//! 5. Promote the staged region folder into the maps root
//! 6. Write the style manifest
//! 7. Clean up the staging directory
//!
//! It also owns the destructive operations (delete one region, clear all
//! map data) and the read-only queries UI callers need.
//!
//! # Concurrency
//!
//! Every mutation of a region holds that region's mutex, so two downloads
//! or a download and a delete of the same region never interleave. Region
//! mutations share a root lock that [`RegionLifecycleManager::delete_all_map_data`]
//! takes exclusively.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coord::{lon_lat_to_tile, MAX_ZOOM};
use crate::error::{ErrorKind, MapError, MapResult};
use crate::region::{Region, RegionCatalog};
use crate::store::{tiles_size, TileStore};
use crate::verify::{StructureVerifier, VerificationReport};

use super::config::{DecompressionPolicy, ManagerConfig};
use super::decompress::{write_normalized_marker, DecompressStats, TileDecompressor};
use super::download::{ArchiveFetcher, ArchiveTransport, Phase, ProgressSink, RegionProgress, ReqwestTransport};
use super::extractor::{ArchiveExtractor, ZipExtractor};
use super::manifest::{write_manifest, StyleManifest};

/// Stages of a `download_region` call, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    CheckingExisting,
    Downloading,
    Extracting,
    Decompressing,
    Promoting,
    WritingManifest,
    Done,
}

impl PipelineStage {
    /// Get a human-readable name for the stage.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckingExisting => "checking-existing",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Decompressing => "decompressing",
            Self::Promoting => "promoting",
            Self::WritingManifest => "writing-manifest",
            Self::Done => "done",
        }
    }
}

/// How a successful `download_region` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadOutcome {
    /// The archive was fetched and installed.
    Installed,
    /// The region was already on disk; only the manifest was rewritten.
    AlreadyInstalled,
}

/// Success payload of `download_region`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadReport {
    pub region_id: String,
    pub outcome: DownloadOutcome,
    pub bytes_downloaded: u64,
    pub files_extracted: usize,
    /// Absent when no decompression pass ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decompression: Option<DecompressStats>,
}

impl DownloadReport {
    fn already_installed(region_id: &str) -> Self {
        Self {
            region_id: region_id.to_string(),
            outcome: DownloadOutcome::AlreadyInstalled,
            bytes_downloaded: 0,
            files_extracted: 0,
            decompression: None,
        }
    }
}

/// Terminal value handed to UI callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub success: bool,
    pub region_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadResult {
    /// Flatten the typed result of one attempt.
    pub fn from_result(region_id: &str, result: &MapResult<DownloadReport>) -> Self {
        match result {
            Ok(_) => Self {
                success: true,
                region_id: region_id.to_string(),
                error_kind: None,
                error: None,
            },
            Err(e) => Self {
                success: false,
                region_id: region_id.to_string(),
                error_kind: Some(e.kind()),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Snapshot of one region on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionState {
    pub region_id: String,
    pub installed: bool,
    pub ready: bool,
    pub normalized: bool,
    pub zoom_levels: Vec<u8>,
    pub size_bytes: u64,
}

/// Downloads, repairs, verifies and removes offline map regions.
pub struct RegionLifecycleManager {
    config: ManagerConfig,
    catalog: RegionCatalog,
    store: TileStore,
    fetcher: ArchiveFetcher,
    extractor: Arc<dyn ArchiveExtractor>,
    decompressor: TileDecompressor,
    region_locks: DashMap<String, Arc<Mutex<()>>>,
    root_lock: RwLock<()>,
}

impl RegionLifecycleManager {
    /// Create a manager that downloads over HTTP.
    pub fn new(config: ManagerConfig, catalog: RegionCatalog) -> MapResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.download_timeout)?);
        Ok(Self::with_transport(config, catalog, transport))
    }

    /// Create a manager with a custom archive transport.
    pub fn with_transport(
        config: ManagerConfig,
        catalog: RegionCatalog,
        transport: Arc<dyn ArchiveTransport>,
    ) -> Self {
        let store = TileStore::new(&config.maps_root).with_zoom_range(config.zoom_range.clone());
        let fetcher = ArchiveFetcher::new(transport, config.base_url.clone(), config.download_timeout);
        let decompressor = TileDecompressor::with_workers(config.decompress_workers);

        Self {
            config,
            catalog,
            store,
            fetcher,
            extractor: Arc::new(ZipExtractor::new()),
            decompressor,
            region_locks: DashMap::new(),
            root_lock: RwLock::new(()),
        }
    }

    /// Replace the ZIP extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    fn region_lock(&self, region_id: &str) -> Arc<Mutex<()>> {
        self.region_locks
            .entry(region_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn staging_dir(&self, region: &Region) -> PathBuf {
        self.config.staging_dir.join(&region.id)
    }

    /// Download and install a region.
    ///
    /// Progress for every phase goes to `progress`. Cancelling `cancel`
    /// stops the pipeline at the next check; nothing is left behind in the
    /// maps root or the staging directory.
    pub async fn download_region(
        &self,
        region_id: &str,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> MapResult<DownloadReport> {
        let region = self.catalog.require(region_id)?.clone();

        let _root = self.root_lock.read().await;
        let lock = self.region_lock(&region.id);
        let _guard = lock.lock().await;

        enter(&region, PipelineStage::CheckingExisting);
        if self.store.is_installed(&region) {
            info!(region = %region.id, "Region already installed");
            self.write_region_manifest(&region).await?;
            return Ok(DownloadReport::already_installed(&region.id));
        }

        if cancel.is_cancelled() {
            return Err(MapError::Cancelled);
        }

        let staging = self.staging_dir(&region);
        reset_dir(&staging).await?;

        let reporter = progress.for_region(&region.id);
        let result = self.run_pipeline(&region, &staging, &reporter, &cancel).await;

        remove_dir_quietly(&staging).await;

        match &result {
            Ok(report) => {
                enter(&region, PipelineStage::Done);
                info!(
                    region = %region.id,
                    bytes = report.bytes_downloaded,
                    files = report.files_extracted,
                    "Region installed"
                );
            }
            Err(e) if e.is_cancelled() => info!(region = %region.id, "Region download cancelled"),
            Err(e) => warn!(region = %region.id, error = %e, "Region download failed"),
        }

        result
    }

    async fn run_pipeline(
        &self,
        region: &Region,
        staging: &Path,
        reporter: &RegionProgress,
        cancel: &CancellationToken,
    ) -> MapResult<DownloadReport> {
        enter(region, PipelineStage::Downloading);
        let archive = staging.join(format!("{}.zip", region.id));
        let download_progress = reporter.clone();
        let bytes_downloaded = self
            .fetcher
            .fetch(
                region,
                &archive,
                move |written, total| download_progress.report(Phase::Download, written, total),
                cancel,
            )
            .await?;

        enter(region, PipelineStage::Extracting);
        let extract_root = staging.join("extracted");
        let extracted = self.extract(&archive, &extract_root, reporter, cancel).await;
        if let Err(e) = tokio::fs::remove_file(&archive).await {
            debug!(path = %archive.display(), error = %e, "Archive already gone");
        }
        let files_extracted = extracted?;

        let staged_region = extract_root.join(&region.folder_name);
        if !staged_region.is_dir() {
            return Err(MapError::ExtractFailed {
                path: archive,
                reason: format!("archive does not contain folder '{}'", region.folder_name),
            });
        }

        if cancel.is_cancelled() {
            return Err(MapError::Cancelled);
        }

        enter(region, PipelineStage::Decompressing);
        let decompression = self.decompress(region, &staged_region, reporter, cancel).await?;
        if decompression.as_ref().is_some_and(|s| s.cancelled) || cancel.is_cancelled() {
            return Err(MapError::Cancelled);
        }

        enter(region, PipelineStage::Promoting);
        let target = self.store.region_dir(region);
        let parking = staging.join("previous");
        tokio::task::spawn_blocking(move || promote(&staged_region, &target, &parking)).await??;

        enter(region, PipelineStage::WritingManifest);
        self.write_region_manifest(region).await?;

        Ok(DownloadReport {
            region_id: region.id.clone(),
            outcome: DownloadOutcome::Installed,
            bytes_downloaded,
            files_extracted,
            decompression,
        })
    }

    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        reporter: &RegionProgress,
        cancel: &CancellationToken,
    ) -> MapResult<usize> {
        let extractor = Arc::clone(&self.extractor);
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        let reporter = reporter.clone();
        // Child token so a timed-out extraction stops at its next entry.
        let extract_cancel = cancel.child_token();
        let task_cancel = extract_cancel.clone();

        let task = tokio::task::spawn_blocking(move || {
            extractor.extract(&archive, &dest, &task_cancel, &mut |done, total| {
                reporter.report(Phase::Extract, done as u64, total as u64)
            })
        });

        match tokio::time::timeout(self.config.extract_timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => {
                extract_cancel.cancel();
                Err(MapError::Timeout {
                    stage: "extraction",
                    timeout_secs: self.config.extract_timeout.as_secs(),
                })
            }
        }
    }

    /// Run the decompression pass according to the configured policy.
    ///
    /// Returns `None` when the sampled check decided no pass was needed.
    async fn decompress(
        &self,
        region: &Region,
        region_dir: &Path,
        reporter: &RegionProgress,
        cancel: &CancellationToken,
    ) -> MapResult<Option<DecompressStats>> {
        let policy = self.config.decompression_policy;
        let decompressor = self.decompressor.clone();
        let dir = region_dir.to_path_buf();
        let reporter = reporter.clone();
        let cancel = cancel.clone();
        let region_id = region.id.clone();

        tokio::task::spawn_blocking(move || -> MapResult<Option<DecompressStats>> {
            if policy == DecompressionPolicy::Sampled && !decompressor.needs_decompression(&dir) {
                debug!(region = %region_id, "Sampled tiles are raw, skipping decompression");
                return Ok(None);
            }

            let stats = decompressor.decompress_all_until(&dir, &cancel, |index, total, name| {
                reporter.report_item(Phase::Decompress, index as u64, total as u64, name)
            })?;

            if stats.failed == 0 && !stats.cancelled {
                write_normalized_marker(&dir, &stats)?;
            } else if stats.failed > 0 {
                warn!(region = %region_id, failed = stats.failed, "Some tiles could not be decompressed");
            }

            Ok(Some(stats))
        })
        .await?
    }

    async fn write_region_manifest(&self, region: &Region) -> MapResult<()> {
        let path = self.store.manifest_path(region);
        let manifest = StyleManifest::for_region(
            region,
            &self.store.tile_template(region),
            self.store.zoom_range(),
        );
        tokio::task::spawn_blocking(move || write_manifest(&path, &manifest)).await?
    }

    /// Re-run the exhaustive decompression pass over an installed region.
    ///
    /// Repairs regions installed under the sampled policy whose sample
    /// missed compressed tiles. Returns `None` if the region is not
    /// installed.
    pub async fn repair_region(
        &self,
        region_id: &str,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> MapResult<Option<DecompressStats>> {
        let region = self.catalog.require(region_id)?.clone();

        let _root = self.root_lock.read().await;
        let lock = self.region_lock(&region.id);
        let _guard = lock.lock().await;

        if !self.store.is_installed(&region) {
            return Ok(None);
        }
        if cancel.is_cancelled() {
            return Err(MapError::Cancelled);
        }

        let decompressor = self.decompressor.clone();
        let dir = self.store.region_dir(&region);
        let reporter = progress.for_region(&region.id);

        let stats = tokio::task::spawn_blocking(move || -> MapResult<DecompressStats> {
            if !decompressor.has_compressed_tiles(&dir)? {
                return Ok(DecompressStats::default());
            }
            let stats = decompressor.decompress_all_until(&dir, &cancel, |index, total, name| {
                reporter.report_item(Phase::Decompress, index as u64, total as u64, name)
            })?;
            if stats.failed == 0 && !stats.cancelled {
                write_normalized_marker(&dir, &stats)?;
            }
            Ok(stats)
        })
        .await??;

        if stats.cancelled {
            info!(region = %region.id, processed = stats.processed(), "Region repair cancelled");
            return Err(MapError::Cancelled);
        }

        info!(region = %region.id, decompressed = stats.decompressed, "Region repaired");
        Ok(Some(stats))
    }

    /// Remove a region's tiles, marker and manifest.
    ///
    /// Returns `Ok(false)` if nothing existed.
    pub async fn delete_region(&self, region_id: &str) -> MapResult<bool> {
        let region = self.catalog.require(region_id)?.clone();

        let _root = self.root_lock.read().await;
        let lock = self.region_lock(&region.id);
        let _guard = lock.lock().await;

        let region_dir = self.store.region_dir(&region);
        let manifest = self.store.manifest_path(&region);
        let staging = self.staging_dir(&region);

        let removed = tokio::task::spawn_blocking(move || -> MapResult<bool> {
            let mut removed = false;
            if region_dir.exists() {
                fs::remove_dir_all(&region_dir).map_err(|e| MapError::remove(&region_dir, e))?;
                removed = true;
            }
            if manifest.exists() {
                fs::remove_file(&manifest).map_err(|e| MapError::remove(&manifest, e))?;
                removed = true;
            }
            if staging.exists() {
                fs::remove_dir_all(&staging).map_err(|e| MapError::remove(&staging, e))?;
            }
            Ok(removed)
        })
        .await??;

        if removed {
            info!(region = %region.id, "Region deleted");
        } else {
            debug!(region = %region.id, "Nothing to delete");
        }
        Ok(removed)
    }

    /// Remove the whole maps root, staging included.
    ///
    /// Waits for in-flight region operations and blocks new ones until
    /// done. Returns `Ok(false)` if there was nothing to remove.
    pub async fn delete_all_map_data(&self) -> MapResult<bool> {
        let _root = self.root_lock.write().await;

        let maps_root = self.config.maps_root.clone();
        let staging = self.config.staging_dir.clone();

        let removed = tokio::task::spawn_blocking(move || -> MapResult<bool> {
            let mut removed = false;
            if maps_root.exists() {
                fs::remove_dir_all(&maps_root).map_err(|e| MapError::remove(&maps_root, e))?;
                removed = true;
            }
            if staging.exists() {
                fs::remove_dir_all(&staging).map_err(|e| MapError::remove(&staging, e))?;
            }
            Ok(removed)
        })
        .await??;

        info!(maps_root = %self.config.maps_root.display(), removed, "All map data deleted");
        Ok(removed)
    }

    /// Total tile bytes of one region, or of every catalog region.
    pub async fn region_storage_size(&self, region_id: Option<&str>) -> MapResult<u64> {
        let dirs: Vec<PathBuf> = match region_id {
            Some(id) => vec![self.store.region_dir(self.catalog.require(id)?)],
            None => self
                .catalog
                .regions()
                .iter()
                .map(|r| self.store.region_dir(r))
                .collect(),
        };

        tokio::task::spawn_blocking(move || {
            dirs.iter().try_fold(0u64, |total, dir| -> MapResult<u64> {
                Ok(total + tiles_size(dir)?)
            })
        })
        .await?
    }

    /// Walk the tile tree and report what is on disk.
    pub async fn verify(&self) -> MapResult<VerificationReport> {
        let store = self.store.clone();
        let catalog = self.catalog.clone();
        let report =
            tokio::task::spawn_blocking(move || StructureVerifier::new(&store, &catalog).verify())
                .await?;
        Ok(report)
    }

    /// Returns true if the region's tiles and style manifest are in place.
    pub fn check_region_file_exists(&self, region_id: &str) -> MapResult<bool> {
        let region = self.catalog.require(region_id)?;
        Ok(self.store.is_ready(region))
    }

    /// Catalog regions with at least one zoom level on disk.
    pub fn installed_regions(&self) -> Vec<&Region> {
        self.catalog
            .regions()
            .iter()
            .filter(|r| self.store.is_installed(r))
            .collect()
    }

    /// Returns true if any region can be opened by the map screen.
    pub fn has_any_region_ready(&self) -> bool {
        self.catalog.regions().iter().any(|r| self.store.is_ready(r))
    }

    /// Path of the region's style manifest, if written.
    pub fn style_path(&self, region_id: &str) -> MapResult<Option<PathBuf>> {
        let region = self.catalog.require(region_id)?;
        let path = self.store.manifest_path(region);
        Ok(path.is_file().then_some(path))
    }

    /// Tile file covering a position, if present on disk.
    ///
    /// `zoom` defaults to the top of the configured zoom range.
    pub fn tile_path_for_location(
        &self,
        region_id: &str,
        lon: f64,
        lat: f64,
        zoom: Option<u8>,
    ) -> MapResult<Option<PathBuf>> {
        let region = self.catalog.require(region_id)?;
        let zoom = zoom.unwrap_or(*self.store.zoom_range().end()).min(MAX_ZOOM);
        let tile = lon_lat_to_tile(lon, lat, zoom)?;
        let path = self.store.tile_path(region, &tile);
        Ok(path.is_file().then_some(path))
    }

    /// On-disk snapshot of a region.
    pub async fn region_status(&self, region_id: &str) -> MapResult<RegionState> {
        let region = self.catalog.require(region_id)?;
        let store = self.store.clone();
        let region = region.clone();

        tokio::task::spawn_blocking(move || -> MapResult<RegionState> {
            Ok(RegionState {
                region_id: region.id.clone(),
                installed: store.is_installed(&region),
                ready: store.is_ready(&region),
                normalized: store.is_normalized(&region),
                zoom_levels: store.zoom_levels(&region),
                size_bytes: store.region_size(&region)?,
            })
        })
        .await?
    }
}

fn enter(region: &Region, stage: PipelineStage) {
    debug!(region = %region.id, stage = stage.name(), "Pipeline stage");
}

async fn reset_dir(dir: &Path) -> MapResult<()> {
    if tokio::fs::try_exists(dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|e| MapError::remove(dir, e))?;
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| MapError::create_dir(dir, e))
}

async fn remove_dir_quietly(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(path = %dir.display(), "Staging directory removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dir.display(), error = %e, "Failed to remove staging directory"),
    }
}

/// Move the staged region folder into place.
///
/// Whatever sits at `target` (a folder without zoom levels, since
/// installed regions never reach this point) is parked first and restored
/// if the move fails.
fn promote(staged: &Path, target: &Path, parking: &Path) -> MapResult<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| MapError::create_dir(parent, e))?;
    }

    let parked = if target.exists() {
        fs::rename(target, parking).map_err(|e| MapError::write(target, e))?;
        true
    } else {
        false
    };

    let moved = match fs::rename(staged, target) {
        Ok(()) => Ok(()),
        // Staging on another filesystem.
        Err(_) => copy_dir_recursive(staged, target),
    };

    match moved {
        Ok(()) => {
            if parked {
                fs::remove_dir_all(parking).ok();
            }
            Ok(())
        }
        Err(e) => {
            fs::remove_dir_all(target).ok();
            if parked {
                fs::rename(parking, target).ok();
            }
            Err(e)
        }
    }
}

/// Recursively copy a directory.
fn copy_dir_recursive(source: &Path, dest: &Path) -> MapResult<()> {
    fs::create_dir_all(dest).map_err(|e| MapError::create_dir(dest, e))?;

    for entry in fs::read_dir(source).map_err(|e| MapError::read(source, e))? {
        let entry = entry.map_err(|e| MapError::read(source, e))?;
        let source_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if source_path.is_dir() {
            copy_dir_recursive(&source_path, &dest_path)?;
        } else {
            fs::copy(&source_path, &dest_path).map_err(|e| MapError::write(&dest_path, e))?;
        }
    }

    Ok(())
}
