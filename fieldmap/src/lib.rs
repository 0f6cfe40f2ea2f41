//! FieldMap - offline vector-tile maps for field work
//!
//! This library fetches per-region tile archives, unpacks them into a
//! `{zoom}/{x}/{y}.pbf` pyramid, repairs tiles left GZIP-encoded, and
//! reports what is on disk.
//!
//! # Modules
//!
//! - [`region`]: the catalog of downloadable regions
//! - [`coord`]: slippy-map tile addressing
//! - [`store`]: paths and existence queries over the tile pyramid
//! - [`manager`]: download, extraction, decompression and deletion
//! - [`verify`]: on-disk structure reports
//! - [`config`] and [`logging`]: the ambient setup shared with the CLI
//!
//! # Example
//!
//! ```ignore
//! use fieldmap::manager::{ManagerConfig, ProgressSink, RegionLifecycleManager};
//! use fieldmap::region::RegionCatalog;
//! use tokio_util::sync::CancellationToken;
//!
//! let manager = RegionLifecycleManager::new(ManagerConfig::default(), RegionCatalog::builtin())?;
//! manager.download_region("sumut", ProgressSink::none(), CancellationToken::new()).await?;
//! assert!(manager.check_region_file_exists("sumut")?);
//! ```

pub mod config;
pub mod coord;
pub mod error;
pub mod logging;
pub mod manager;
pub mod region;
pub mod store;
pub mod verify;

pub use error::{ErrorKind, MapError, MapResult};
