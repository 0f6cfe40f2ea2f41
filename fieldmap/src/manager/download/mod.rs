//! Archive download for region installation.
//!
//! This module provides:
//! - Streaming archive downloads with cancellation and a deadline (`http`)
//! - Phase-tagged progress events delivered over a channel (`progress`)
//!
//! # Architecture
//!
//! ```text
//! ArchiveFetcher
//!         │
//!         ├── ArchiveTransport (trait)
//!         │       └── ReqwestTransport
//!         │
//!         └── on_bytes callback ──► RegionProgress ──► ProgressSink (mpsc)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fieldmap::manager::{ArchiveFetcher, ReqwestTransport};
//!
//! let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(600))?);
//! let fetcher = ArchiveFetcher::new(transport, "https://tiles.example.com", Duration::from_secs(600));
//!
//! fetcher.fetch(&region, &archive_path, |written, total| {
//!     println!("{} of {} bytes", written, total);
//! }, &cancel).await?;
//! ```

mod http;
mod progress;

pub use http::{
    ArchiveBody, ArchiveFetcher, ArchiveTransport, BoxFuture, ReqwestTransport, TransportError,
};
pub use progress::{Phase, ProgressEvent, ProgressSink, RegionProgress};

#[cfg(test)]
pub(crate) use http::tests::StaticTransport;
