//! Integration tests for the region download pipeline.
//!
//! These tests drive `RegionLifecycleManager` end to end against an
//! in-memory archive server:
//! - download -> extract -> decompress -> promote -> manifest
//! - progress events per phase
//! - verification of the installed tree
//!
//! Run with: `cargo test --test download_pipeline`

use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;

use fieldmap::manager::{
    ArchiveBody, ArchiveTransport, BoxFuture, DownloadOutcome, DownloadResult, ManagerConfig,
    Phase, ProgressEvent, ProgressSink, RegionLifecycleManager, TransportError,
};
use fieldmap::region::RegionCatalog;
use fieldmap::verify::RegionStatus;

// ============================================================================
// Mock archive server
// ============================================================================

/// Serves one archive body in fixed-size chunks and counts requests.
struct ArchiveServer {
    body: Vec<u8>,
    chunk_size: usize,
    requests: AtomicUsize,
}

impl ArchiveServer {
    fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            chunk_size: 64,
            requests: AtomicUsize::new(0),
        }
    }
}

struct ChunkedBody {
    chunks: std::vec::IntoIter<Bytes>,
    length: u64,
}

impl ArchiveBody for ChunkedBody {
    fn status(&self) -> u16 {
        200
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn next_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, TransportError>> {
        let chunk = self.chunks.next();
        Box::pin(async move { Ok(chunk) })
    }
}

impl ArchiveTransport for ArchiveServer {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Box<dyn ArchiveBody>, TransportError>> {
        Box::pin(async move {
            assert!(url.ends_with("/sumut.zip"), "unexpected url {}", url);
            self.requests.fetch_add(1, Ordering::SeqCst);

            let chunks: Vec<Bytes> = self
                .body
                .chunks(self.chunk_size)
                .map(Bytes::copy_from_slice)
                .collect();
            Ok(Box::new(ChunkedBody {
                chunks: chunks.into_iter(),
                length: self.body.len() as u64,
            }) as Box<dyn ArchiveBody>)
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

const TILE: &[u8] = b"\x1a\x20layer:water;layer:roads;layer:landuse;layer:place";

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// The `sumut` archive: one GZIP tile at zoom 5, one raw tile at zoom 6.
fn sumut_archive() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    writer.start_file("sumut/5/12/7.pbf", options).unwrap();
    writer.write_all(&gzip(TILE)).unwrap();
    writer.start_file("sumut/6/25/14.pbf", options).unwrap();
    writer.write_all(TILE).unwrap();

    writer.finish().unwrap().into_inner()
}

fn manager(temp: &TempDir, server: Arc<ArchiveServer>) -> RegionLifecycleManager {
    let config = ManagerConfig::new(temp.path().join("maps"))
        .with_base_url("https://tiles.example.com/regions")
        .with_zoom_range(5..=14);
    RegionLifecycleManager::with_transport(config, RegionCatalog::builtin(), server)
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_sumut_end_to_end() {
    let temp = TempDir::new().unwrap();
    let archive = sumut_archive();
    // Enough chunks for several download events.
    assert!(archive.len() > 128);
    let server = Arc::new(ArchiveServer::new(archive));
    let manager = manager(&temp, server.clone());
    let (sink, mut rx) = ProgressSink::channel();

    let result = manager
        .download_region("sumut", sink, CancellationToken::new())
        .await;

    let flat = DownloadResult::from_result("sumut", &result);
    assert!(flat.success, "download failed: {:?}", flat.error);
    let report = result.unwrap();
    assert_eq!(report.outcome, DownloadOutcome::Installed);
    assert_eq!(server.requests.load(Ordering::SeqCst), 1);

    // Download progress: at least two events, bytes increasing.
    let events = drain(&mut rx);
    let downloads: Vec<&ProgressEvent> =
        events.iter().filter(|e| e.phase == Phase::Download).collect();
    assert!(downloads.len() >= 2);
    assert!(downloads.windows(2).all(|w| w[0].current < w[1].current));
    assert!(events.iter().all(|e| e.region_id == "sumut"));

    let decompress: Vec<&ProgressEvent> =
        events.iter().filter(|e| e.phase == Phase::Decompress).collect();
    assert_eq!(decompress.len(), 2);
    assert!(decompress.iter().all(|e| e.total == 2 && e.item.is_some()));

    // Tiles on disk are raw.
    let maps = temp.path().join("maps");
    let decompressed = std::fs::read(maps.join("sumut/5/12/7.pbf")).unwrap();
    assert_ne!(decompressed[0], 0x1f);
    assert_eq!(decompressed, TILE);
    assert_eq!(std::fs::read(maps.join("sumut/6/25/14.pbf")).unwrap(), TILE);

    // Manifest.
    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(maps.join("style-sumut.json")).unwrap())
            .unwrap();
    assert!(manifest["name"].as_str().unwrap().ends_with("Sumatera Utara"));
    assert_eq!(manifest["layers"].as_array().unwrap().len(), 5);

    assert!(manager.check_region_file_exists("sumut").unwrap());
    assert!(!maps.join(".staging/sumut").exists());
}

#[tokio::test]
async fn test_verification_reports_installed_zoom_levels() {
    let temp = TempDir::new().unwrap();
    let server = Arc::new(ArchiveServer::new(sumut_archive()));
    let manager = manager(&temp, server);

    manager
        .download_region("sumut", ProgressSink::none(), CancellationToken::new())
        .await
        .unwrap();
    let report = manager.verify().await.unwrap();

    assert!(report.success);
    let sumut = report.region("sumut").unwrap();
    assert_eq!(sumut.status, RegionStatus::Partial);
    for level in &sumut.zoom_levels {
        let expected = level.level == 5 || level.level == 6;
        assert_eq!(level.exists, expected, "zoom {}", level.level);
    }
    assert!(report.summary.contains("sumut"));
    assert!(report.tree.contains("sumut/"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
    assert_eq!(json["details"]["regions"][0]["zoomLevels"][0]["level"], 5);
}

#[tokio::test]
async fn test_second_download_does_not_refetch() {
    let temp = TempDir::new().unwrap();
    let server = Arc::new(ArchiveServer::new(sumut_archive()));
    let manager = manager(&temp, server.clone());

    for _ in 0..2 {
        manager
            .download_region("sumut", ProgressSink::none(), CancellationToken::new())
            .await
            .unwrap();
    }

    assert_eq!(server.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_downloads_of_one_region() {
    let temp = TempDir::new().unwrap();
    let server = Arc::new(ArchiveServer::new(sumut_archive()));
    let manager = Arc::new(manager(&temp, server.clone()));

    let a = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .download_region("sumut", ProgressSink::none(), CancellationToken::new())
                .await
        })
    };
    let b = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .download_region("sumut", ProgressSink::none(), CancellationToken::new())
                .await
        })
    };

    let mut outcomes = vec![
        a.await.unwrap().unwrap().outcome,
        b.await.unwrap().unwrap().outcome,
    ];
    outcomes.sort_by_key(|o| *o == DownloadOutcome::AlreadyInstalled);

    assert_eq!(
        outcomes,
        vec![DownloadOutcome::Installed, DownloadOutcome::AlreadyInstalled]
    );
    assert_eq!(server.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_delete_then_redownload() {
    let temp = TempDir::new().unwrap();
    let server = Arc::new(ArchiveServer::new(sumut_archive()));
    let manager = manager(&temp, server.clone());

    manager
        .download_region("sumut", ProgressSink::none(), CancellationToken::new())
        .await
        .unwrap();
    assert!(manager.delete_region("sumut").await.unwrap());
    assert!(!manager.check_region_file_exists("sumut").unwrap());

    let report = manager
        .download_region("sumut", ProgressSink::none(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, DownloadOutcome::Installed);
    assert_eq!(server.requests.load(Ordering::SeqCst), 2);
}
