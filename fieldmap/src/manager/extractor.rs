//! Archive extraction for region installation.
//!
//! This module handles:
//! - Unpacking ZIP archives into a destination root, preserving the
//!   archive's relative paths
//! - Skipping entries whose names would escape the destination
//!
//! Every failure while unpacking, local I/O included, is reported as
//! [`MapError::ExtractFailed`].

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{MapError, MapResult};

/// Trait for unpacking downloaded archives.
pub trait ArchiveExtractor: Send + Sync {
    /// Extract every entry of `archive_path` under `dest_dir`.
    ///
    /// `on_entry(done, total)` fires after every archive entry. Cancellation
    /// is checked between entries.
    ///
    /// # Returns
    ///
    /// The number of files written.
    fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        cancel: &CancellationToken,
        on_entry: &mut dyn FnMut(usize, usize),
    ) -> MapResult<usize>;
}

/// ZIP archive extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl ZipExtractor {
    /// Create a new ZIP extractor.
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveExtractor for ZipExtractor {
    fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        cancel: &CancellationToken,
        on_entry: &mut dyn FnMut(usize, usize),
    ) -> MapResult<usize> {
        let failed = |reason: String| extract_failed(archive_path, reason);
        let io_failed = |path: &Path, e: io::Error| failed(format!("{}: {}", path.display(), e));

        let mut archive = open_archive(archive_path)?;

        fs::create_dir_all(dest_dir).map_err(|e| io_failed(dest_dir, e))?;

        let total = archive.len();
        let mut files_written = 0;

        for index in 0..total {
            if cancel.is_cancelled() {
                return Err(MapError::Cancelled);
            }

            let mut entry = archive
                .by_index(index)
                .map_err(|e| failed(format!("entry {}: {}", index, e)))?;
            let name = entry.name().to_string();

            let Some(relative) = entry.enclosed_name() else {
                warn!(entry = %name, "Skipping archive entry with unsafe path");
                on_entry(index + 1, total);
                continue;
            };
            let out_path = dest_dir.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&out_path).map_err(|e| io_failed(&out_path, e))?;
            } else {
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent).map_err(|e| io_failed(parent, e))?;
                }

                let out_file = File::create(&out_path).map_err(|e| io_failed(&out_path, e))?;
                let mut writer = BufWriter::new(out_file);

                io::copy(&mut entry, &mut writer).map_err(|e| failed(format!("{}: {}", name, e)))?;
                io::Write::flush(&mut writer).map_err(|e| io_failed(&out_path, e))?;

                files_written += 1;
            }

            on_entry(index + 1, total);
        }

        debug!(
            archive = %archive_path.display(),
            entries = total,
            files = files_written,
            "Archive extracted"
        );

        Ok(files_written)
    }
}

fn open_archive(archive_path: &Path) -> MapResult<ZipArchive<BufReader<File>>> {
    let file = File::open(archive_path).map_err(|e| extract_failed(archive_path, e.to_string()))?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| extract_failed(archive_path, e.to_string()))
}

fn extract_failed(path: &Path, reason: String) -> MapError {
    MapError::ExtractFailed {
        path: path.to_path_buf(),
        reason,
    }
}

/// Build an in-memory ZIP archive from `(name, bytes)` entries.
///
/// Names ending in `/` become directory entries.
#[cfg(test)]
pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, bytes) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}
