//! Tile decompression.
//!
//! Some archive builds ship tiles still GZIP-encoded, but the renderer
//! needs raw protobuf bytes. This module detects such tiles by their magic
//! bytes and rewrites them decompressed.
//!
//! # Detection
//!
//! - [`TileDecompressor::needs_decompression`] looks at a small,
//!   depth-bounded sample. It is cheap but can miss compressed tiles that
//!   fall outside the sample.
//! - [`TileDecompressor::has_compressed_tiles`] checks the first two bytes
//!   of every tile.
//!
//! # Decompression pass
//!
//! Every tile is handled independently on a rayon pool. A tile that cannot
//! be read, decoded or written is counted as failed and left as it was;
//! the rest of the batch carries on.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use chrono::Utc;
use flate2::read::MultiGzDecoder;
use rayon::prelude::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{MapError, MapResult};
use crate::store::{collect_tiles, sample_tiles, NORMALIZED_MARKER};

/// GZIP magic number.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Number of tiles inspected by the sampled check.
pub const SAMPLE_SIZE: usize = 10;

/// Directory levels the sampled check descends below the region folder.
pub const SAMPLE_DEPTH: usize = 4;

/// Counters for one decompression pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompressStats {
    /// Tiles found under the region folder.
    pub total: usize,
    /// Tiles rewritten decompressed.
    pub decompressed: usize,
    /// Tiles already raw.
    pub skipped: usize,
    /// Tiles that could not be processed.
    pub failed: usize,
    /// Compressed size minus decompressed size, summed over rewritten
    /// tiles. Usually negative, since decoded tiles are larger.
    pub bytes_saved: i64,
    /// The pass stopped early on cancellation.
    pub cancelled: bool,
}

impl DecompressStats {
    /// Tiles actually visited.
    pub fn processed(&self) -> usize {
        self.decompressed + self.skipped + self.failed
    }
}

/// What happened to one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// The tile was GZIP and has been rewritten raw.
    Decompressed { bytes_saved: i64 },
    /// The tile was already raw.
    Skipped,
}

/// Detects and repairs GZIP-compressed tiles.
#[derive(Debug, Clone, Default)]
pub struct TileDecompressor {
    /// Worker threads (0 = rayon's global pool).
    workers: usize,
}

impl TileDecompressor {
    /// Create a decompressor using rayon's global pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a dedicated pool with `workers` threads.
    pub fn with_workers(workers: usize) -> Self {
        Self { workers }
    }

    /// Sampled check: true if any of the first [`SAMPLE_SIZE`] tiles found
    /// within [`SAMPLE_DEPTH`] levels is GZIP.
    ///
    /// Compressed tiles outside the sample go unnoticed.
    pub fn needs_decompression(&self, region_dir: &Path) -> bool {
        let sample = sample_tiles(region_dir, SAMPLE_SIZE, SAMPLE_DEPTH);
        let compressed = sample
            .iter()
            .filter(|path| is_gzip(path).unwrap_or(false))
            .count();

        debug!(
            dir = %region_dir.display(),
            sampled = sample.len(),
            compressed,
            "Sampled tile compression"
        );

        compressed > 0
    }

    /// Exhaustive check: true if any tile under the folder is GZIP.
    pub fn has_compressed_tiles(&self, region_dir: &Path) -> MapResult<bool> {
        let tiles = collect_tiles(region_dir)?;
        Ok(tiles.par_iter().any(|path| is_gzip(path).unwrap_or(false)))
    }

    /// Decompress every GZIP tile under the folder.
    ///
    /// `on_tile(index, total, file_name)` fires once per tile whatever the
    /// outcome; every index in `1..=total` is reported exactly once.
    pub fn decompress_all<F>(&self, region_dir: &Path, on_tile: F) -> MapResult<DecompressStats>
    where
        F: Fn(usize, usize, &str) + Sync,
    {
        self.decompress_all_until(region_dir, &CancellationToken::new(), on_tile)
    }

    /// Like [`decompress_all`](Self::decompress_all), stopping when `cancel`
    /// fires. Tiles not yet visited are left untouched.
    pub fn decompress_all_until<F>(
        &self,
        region_dir: &Path,
        cancel: &CancellationToken,
        on_tile: F,
    ) -> MapResult<DecompressStats>
    where
        F: Fn(usize, usize, &str) + Sync,
    {
        let tiles = collect_tiles(region_dir)?;
        let total = tiles.len();

        info!(dir = %region_dir.display(), tiles = total, "Decompressing tiles");

        let index = AtomicUsize::new(0);
        let decompressed = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let bytes_saved = AtomicI64::new(0);
        let cancelled = AtomicBool::new(false);

        let process = |path: &PathBuf| {
            if cancel.is_cancelled() {
                cancelled.store(true, Ordering::Relaxed);
                return;
            }

            match decompress_file(path) {
                Ok(TileOutcome::Decompressed { bytes_saved: saved }) => {
                    decompressed.fetch_add(1, Ordering::Relaxed);
                    bytes_saved.fetch_add(saved, Ordering::Relaxed);
                }
                Ok(TileOutcome::Skipped) => {
                    skipped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(error = %e, "Tile decompression failed");
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }

            let current = index.fetch_add(1, Ordering::Relaxed) + 1;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            on_tile(current, total, &name);
        };

        if self.workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .thread_name(|i| format!("fieldmap-gunzip-{}", i))
                .build()
                .map_err(|e| MapError::Config(format!("failed to build decompression pool: {}", e)))?;
            pool.install(|| tiles.par_iter().for_each(process));
        } else {
            tiles.par_iter().for_each(process);
        }

        let stats = DecompressStats {
            total,
            decompressed: decompressed.into_inner(),
            skipped: skipped.into_inner(),
            failed: failed.into_inner(),
            bytes_saved: bytes_saved.into_inner(),
            cancelled: cancelled.into_inner(),
        };

        info!(
            dir = %region_dir.display(),
            decompressed = stats.decompressed,
            skipped = stats.skipped,
            failed = stats.failed,
            bytes_saved = stats.bytes_saved,
            cancelled = stats.cancelled,
            "Decompression pass finished"
        );

        Ok(stats)
    }
}

/// Returns true if the file starts with the GZIP magic number.
pub fn is_gzip(path: &Path) -> io::Result<bool> {
    let mut header = [0u8; 2];
    let mut file = File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(header == GZIP_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decompress one tile in place if it is GZIP.
///
/// The decoded bytes go to a sibling temp file that replaces the tile by
/// rename, so a failure never leaves a half-written tile.
pub fn decompress_file(path: &Path) -> MapResult<TileOutcome> {
    let original = fs::read(path).map_err(|e| MapError::read(path, e))?;
    if !original.starts_with(&GZIP_MAGIC) {
        return Ok(TileOutcome::Skipped);
    }

    let mut decoded = Vec::with_capacity(original.len() * 4);
    MultiGzDecoder::new(original.as_slice())
        .read_to_end(&mut decoded)
        .map_err(|e| MapError::DecompressFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let temp = temp_path(path);
    fs::write(&temp, &decoded).map_err(|e| MapError::write(&temp, e))?;
    if let Err(e) = fs::rename(&temp, path) {
        fs::remove_file(&temp).ok();
        return Err(MapError::write(path, e));
    }

    Ok(TileOutcome::Decompressed {
        bytes_saved: original.len() as i64 - decoded.len() as i64,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".gunzip");
    path.with_file_name(name)
}

/// Record that every tile under the folder is known to be raw.
pub fn write_normalized_marker(region_dir: &Path, stats: &DecompressStats) -> MapResult<()> {
    let path = region_dir.join(NORMALIZED_MARKER);
    let content = format!(
        "normalized_at={}\ntiles={}\ndecompressed={}\n",
        Utc::now().to_rfc3339(),
        stats.total,
        stats.decompressed
    );
    fs::write(&path, content).map_err(|e| MapError::write(path, e))
}

#[cfg(test)]
pub(crate) fn gzip(bytes: &[u8]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const RAW_TILE: &[u8] = b"\x1a\x0fvector-tile-payload-with-some-repetition-repetition";

    fn write(root: &Path, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_is_gzip() {
        let temp = TempDir::new().unwrap();
        let compressed = write(temp.path(), "a.pbf", &gzip(RAW_TILE));
        let raw = write(temp.path(), "b.pbf", RAW_TILE);
        let tiny = write(temp.path(), "c.pbf", &[0x1f]);

        assert!(is_gzip(&compressed).unwrap());
        assert!(!is_gzip(&raw).unwrap());
        assert!(!is_gzip(&tiny).unwrap());
        assert!(is_gzip(&temp.path().join("missing.pbf")).is_err());
    }

    #[test]
    fn test_decompress_file_round_trip() {
        let temp = TempDir::new().unwrap();
        let compressed = gzip(RAW_TILE);
        let path = write(temp.path(), "5/12/7.pbf", &compressed);

        let outcome = decompress_file(&path).unwrap();

        let rewritten = fs::read(&path).unwrap();
        assert_eq!(rewritten, RAW_TILE);
        assert_ne!(rewritten[0], 0x1f);
        assert_eq!(
            outcome,
            TileOutcome::Decompressed {
                bytes_saved: compressed.len() as i64 - RAW_TILE.len() as i64
            }
        );
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_decompress_file_concatenated_members() {
        let temp = TempDir::new().unwrap();
        let mut bytes = gzip(b"first-");
        bytes.extend(gzip(b"second"));
        let path = write(temp.path(), "t.pbf", &bytes);

        decompress_file(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first-second");
    }

    #[test]
    fn test_decompress_file_skips_raw() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "t.pbf", RAW_TILE);

        assert_eq!(decompress_file(&path).unwrap(), TileOutcome::Skipped);
        assert_eq!(fs::read(&path).unwrap(), RAW_TILE);
    }

    #[test]
    fn test_decompress_file_corrupt_gzip_left_untouched() {
        let temp = TempDir::new().unwrap();
        let corrupt = [0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad];
        let path = write(temp.path(), "t.pbf", &corrupt);

        let result = decompress_file(&path);
        assert!(matches!(result, Err(MapError::DecompressFailed { .. })));
        assert_eq!(fs::read(&path).unwrap(), corrupt);
    }

    #[test]
    fn test_decompress_all_counts_and_reports_every_tile() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "5/12/7.pbf", &gzip(RAW_TILE));
        write(root, "5/12/8.pbf", &gzip(b"other"));
        write(root, "6/25/14.pbf", RAW_TILE);
        write(root, "6/25/15.pbf", &[0x1f, 0x8b, 0xff]);
        write(root, "6/25/notes.txt", &gzip(b"ignored"));

        let seen = Mutex::new(Vec::new());
        let stats = TileDecompressor::new()
            .decompress_all(root, |index, total, name| {
                assert_eq!(total, 4);
                seen.lock().unwrap().push((index, name.to_string()));
            })
            .unwrap();

        assert_eq!(stats.total, 4);
        assert_eq!(stats.decompressed, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processed(), 4);
        assert!(!stats.cancelled);

        let mut indexes: Vec<usize> = seen.lock().unwrap().iter().map(|(i, _)| *i).collect();
        indexes.sort_unstable();
        assert_eq!(indexes, vec![1, 2, 3, 4]);

        assert_eq!(fs::read(root.join("5/12/7.pbf")).unwrap(), RAW_TILE);
        assert_eq!(fs::read(root.join("5/12/8.pbf")).unwrap(), b"other");
        assert_eq!(fs::read(root.join("6/25/14.pbf")).unwrap(), RAW_TILE);
        // Non-tile files are not touched.
        assert!(is_gzip(&root.join("6/25/notes.txt")).unwrap());
    }

    #[test]
    fn test_decompress_all_with_dedicated_pool() {
        let temp = TempDir::new().unwrap();
        for i in 0..20 {
            write(temp.path(), &format!("7/1/{}.pbf", i), &gzip(RAW_TILE));
        }

        let stats = TileDecompressor::with_workers(2)
            .decompress_all(temp.path(), |_, _, _| {})
            .unwrap();

        assert_eq!(stats.decompressed, 20);
        assert!(!TileDecompressor::new().has_compressed_tiles(temp.path()).unwrap());
    }

    #[test]
    fn test_decompress_all_cancelled() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "5/1/1.pbf", &gzip(RAW_TILE));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = TileDecompressor::new()
            .decompress_all_until(temp.path(), &cancel, |_, _, _| panic!("no tile expected"))
            .unwrap();

        assert!(stats.cancelled);
        assert_eq!(stats.processed(), 0);
        assert!(is_gzip(&path).unwrap());
    }

    #[test]
    fn test_decompress_all_empty_folder() {
        let temp = TempDir::new().unwrap();
        let stats = TileDecompressor::new()
            .decompress_all(&temp.path().join("missing"), |_, _, _| {})
            .unwrap();
        assert_eq!(stats, DecompressStats::default());
    }

    #[test]
    fn test_needs_decompression_detects_sampled_gzip() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "5/0/0.pbf", &gzip(RAW_TILE));
        write(temp.path(), "5/0/1.pbf", RAW_TILE);

        assert!(TileDecompressor::new().needs_decompression(temp.path()));
    }

    #[test]
    fn test_needs_decompression_all_raw() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "5/0/0.pbf", RAW_TILE);

        assert!(!TileDecompressor::new().needs_decompression(temp.path()));
    }

    /// The sampled check only looks at the first tiles it finds. A
    /// compressed tile outside the sample is missed, and skipping the pass
    /// on that answer leaves the tile compressed.
    #[test]
    fn test_sampled_check_misses_compressed_tile_outside_sample() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for y in 0..SAMPLE_SIZE + 2 {
            write(root, &format!("5/0/{}.pbf", y), RAW_TILE);
        }
        let hidden = write(root, "9/9/9.pbf", &gzip(RAW_TILE));
        let decompressor = TileDecompressor::new();

        assert!(!decompressor.needs_decompression(root));
        // Pass skipped on the sampled answer: the tile stays compressed.
        assert!(is_gzip(&hidden).unwrap());

        // The exhaustive check sees it.
        assert!(decompressor.has_compressed_tiles(root).unwrap());
    }

    #[test]
    fn test_write_normalized_marker() {
        let temp = TempDir::new().unwrap();
        let stats = DecompressStats {
            total: 3,
            decompressed: 1,
            skipped: 2,
            ..Default::default()
        };

        write_normalized_marker(temp.path(), &stats).unwrap();

        let content = fs::read_to_string(temp.path().join(NORMALIZED_MARKER)).unwrap();
        assert!(content.contains("tiles=3"));
        assert!(content.contains("decompressed=1"));
    }
}
