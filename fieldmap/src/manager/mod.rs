//! Region Manager for downloading, repairing and removing offline maps.
//!
//! This module turns a region id into an installed tile pyramid and keeps
//! the maps directory consistent afterwards.
//!
//! # Overview
//!
//! The download workflow:
//! 1. Stream the region archive to a staging directory (`download`)
//! 2. Unpack it (`extractor`)
//! 3. Rewrite GZIP-encoded tiles as raw protobuf (`decompress`)
//! 4. Move the region folder into the maps root and write its style
//!    manifest (`lifecycle`, `manifest`)
//!
//! Every phase reports [`ProgressEvent`]s tagged with its [`Phase`], and a
//! [`CancellationToken`](tokio_util::sync::CancellationToken) stops the
//! pipeline without leaving partial data behind.
//!
//! # Example
//!
//! ```ignore
//! use fieldmap::manager::{ManagerConfig, ProgressSink, RegionLifecycleManager};
//! use fieldmap::region::RegionCatalog;
//! use tokio_util::sync::CancellationToken;
//!
//! let manager = RegionLifecycleManager::new(ManagerConfig::default(), RegionCatalog::builtin())?;
//! let (sink, mut events) = ProgressSink::channel();
//!
//! let report = manager.download_region("sumut", sink, CancellationToken::new()).await?;
//! println!("{:?}: {} bytes", report.outcome, report.bytes_downloaded);
//! ```

mod config;
mod decompress;
mod download;
mod extractor;
mod lifecycle;
mod manifest;

pub use config::{DecompressionPolicy, ManagerConfig, DEFAULT_BASE_URL};
pub use decompress::{
    decompress_file, is_gzip, write_normalized_marker, DecompressStats, TileDecompressor,
    TileOutcome, GZIP_MAGIC, SAMPLE_DEPTH, SAMPLE_SIZE,
};
pub use download::{
    ArchiveBody, ArchiveFetcher, ArchiveTransport, BoxFuture, Phase, ProgressEvent, ProgressSink,
    RegionProgress, ReqwestTransport, TransportError,
};
pub use extractor::{ArchiveExtractor, ZipExtractor};
pub use lifecycle::{
    DownloadOutcome, DownloadReport, DownloadResult, PipelineStage, RegionLifecycleManager,
    RegionState,
};
pub use manifest::{read_manifest, write_manifest, StyleLayer, StyleManifest, STYLE_VERSION};
