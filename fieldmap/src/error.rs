//! Error types for the offline map pipeline.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::coord::CoordError;

/// Result type for map pipeline operations.
pub type MapResult<T> = Result<T, MapError>;

/// Errors that can occur while acquiring, repairing or managing map regions.
#[derive(Debug, Error)]
pub enum MapError {
    /// The region id is not part of the catalog.
    #[error("region not found: {0}")]
    RegionNotFound(String),

    /// The archive could not be fetched.
    ///
    /// `status` is set when the server answered with a non-success code.
    #[error("failed to download {url}: {reason}")]
    DownloadFailed {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// A stage did not finish within its configured deadline.
    #[error("{stage} timed out after {timeout_secs}s")]
    Timeout {
        stage: &'static str,
        timeout_secs: u64,
    },

    /// The archive could not be unpacked or did not contain the region.
    #[error("failed to extract {}: {reason}", path.display())]
    ExtractFailed { path: PathBuf, reason: String },

    /// A single tile could not be decompressed.
    ///
    /// Never aborts a batch; surfaces only through logs and counters.
    #[error("failed to decompress {}: {reason}", path.display())]
    DecompressFailed { path: PathBuf, reason: String },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The style manifest could not be written.
    #[error("failed to write style manifest {}: {reason}", path.display())]
    ManifestWriteFailed { path: PathBuf, reason: String },

    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file or directory.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to remove a file or directory.
    #[error("failed to remove {}: {source}", path.display())]
    RemoveFailed { path: PathBuf, source: io::Error },

    /// A position or zoom outside the tile grid.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(#[from] CoordError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Anything else, typically a panicked background task.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl MapError {
    /// Stable error code for callers outside the library.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RegionNotFound(_) => ErrorKind::RegionNotFound,
            Self::Timeout { stage, .. } if *stage == "extraction" => ErrorKind::ExtractFailed,
            Self::DownloadFailed { .. } | Self::Timeout { .. } => ErrorKind::DownloadFailed,
            Self::ExtractFailed { .. } => ErrorKind::ExtractFailed,
            Self::DecompressFailed { .. } => ErrorKind::DecompressFailed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ManifestWriteFailed { .. } => ErrorKind::ManifestWriteFailed,
            Self::ReadFailed { .. }
            | Self::WriteFailed { .. }
            | Self::CreateDirFailed { .. }
            | Self::RemoveFailed { .. }
            | Self::InvalidCoordinate(_)
            | Self::Config(_)
            | Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Returns true if the error represents a caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ReadFailed {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn create_dir(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::CreateDirFailed {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn remove(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::RemoveFailed {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for MapError {
    fn from(e: tokio::task::JoinError) -> Self {
        MapError::Unknown(format!("background task failed: {}", e))
    }
}

/// Error taxonomy exposed to UI callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    RegionNotFound,
    DownloadFailed,
    ExtractFailed,
    DecompressFailed,
    Cancelled,
    ManifestWriteFailed,
    Unknown,
}

impl ErrorKind {
    /// The kebab-case code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RegionNotFound => "region-not-found",
            Self::DownloadFailed => "download-failed",
            Self::ExtractFailed => "extract-failed",
            Self::DecompressFailed => "decompress-failed",
            Self::Cancelled => "cancelled",
            Self::ManifestWriteFailed => "manifest-write-failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
