//! Streaming archive downloads.
//!
//! This module provides:
//! - The [`ArchiveTransport`] abstraction over the HTTP client, so tests can
//!   serve archives from memory
//! - [`ReqwestTransport`], the production transport
//! - [`ArchiveFetcher`], which streams a region archive to disk with byte
//!   progress, cancellation and a deadline

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{MapError, MapResult};
use crate::region::Region;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default timeout for establishing a connection.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Buffer size for writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport gave up waiting.
    Timeout,
    /// Any other transport failure.
    Failed(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Failed(e.to_string())
        }
    }
}

/// An open response whose body is read chunk by chunk.
pub trait ArchiveBody: Send {
    /// HTTP status code of the response.
    fn status(&self) -> u16;

    /// Body length announced by the server, if any.
    fn content_length(&self) -> Option<u64>;

    /// Next body chunk, or `None` at end of body.
    ///
    /// Dropping the returned future or the body aborts the transfer.
    fn next_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, TransportError>>;
}

/// Trait for fetching archives from the tile server.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock endpoints in tests.
pub trait ArchiveTransport: Send + Sync {
    /// Issue a GET request and return the open response.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Box<dyn ArchiveBody>, TransportError>>;
}

/// Real transport implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests, body included, end after `timeout`.
    pub fn new(timeout: Duration) -> MapResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fieldmap/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .build()
            .map_err(|e| MapError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl ArchiveTransport for ReqwestTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Box<dyn ArchiveBody>, TransportError>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await?;
            Ok(Box::new(ReqwestBody { response }) as Box<dyn ArchiveBody>)
        })
    }
}

struct ReqwestBody {
    response: reqwest::Response,
}

impl ArchiveBody for ReqwestBody {
    fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    fn next_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, TransportError>> {
        let response = &mut self.response;
        Box::pin(async move { Ok(response.chunk().await?) })
    }
}

/// Streams region archives to local storage.
#[derive(Clone)]
pub struct ArchiveFetcher {
    transport: Arc<dyn ArchiveTransport>,
    base_url: String,
    timeout: Duration,
}

impl ArchiveFetcher {
    /// Create a fetcher for archives under `base_url`.
    pub fn new(transport: Arc<dyn ArchiveTransport>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// URL of the region's archive.
    pub fn archive_url(&self, region: &Region) -> String {
        format!("{}/{}.zip", self.base_url, region.id)
    }

    /// Download the region archive to `dest`.
    ///
    /// `on_bytes(written, total)` fires after every chunk; `total` is 0
    /// when the server does not announce a length. On any error,
    /// cancellation or timeout the partial file is removed.
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    pub async fn fetch<F>(
        &self,
        region: &Region,
        dest: &Path,
        mut on_bytes: F,
        cancel: &CancellationToken,
    ) -> MapResult<u64>
    where
        F: FnMut(u64, u64) + Send,
    {
        if cancel.is_cancelled() {
            return Err(MapError::Cancelled);
        }

        let url = self.archive_url(region);
        info!(region = %region.id, url = %url, "Downloading region archive");

        let result = match tokio::time::timeout(
            self.timeout,
            self.stream_to_file(&url, dest, &mut on_bytes, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MapError::Timeout {
                stage: "download",
                timeout_secs: self.timeout.as_secs(),
            }),
        };

        match &result {
            Ok(bytes) => {
                info!(region = %region.id, bytes, "Archive downloaded");
            }
            Err(e) => {
                if e.is_cancelled() {
                    info!(region = %region.id, "Archive download cancelled");
                } else {
                    warn!(region = %region.id, error = %e, "Archive download failed");
                }
                remove_partial(dest).await;
            }
        }

        result
    }

    async fn stream_to_file<F>(
        &self,
        url: &str,
        dest: &Path,
        on_bytes: &mut F,
        cancel: &CancellationToken,
    ) -> MapResult<u64>
    where
        F: FnMut(u64, u64) + Send,
    {
        let failed = |e: TransportError| match e {
            TransportError::Timeout => MapError::Timeout {
                stage: "download",
                timeout_secs: self.timeout.as_secs(),
            },
            TransportError::Failed(reason) => MapError::DownloadFailed {
                url: url.to_string(),
                status: None,
                reason,
            },
        };

        let mut body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MapError::Cancelled),
            response = self.transport.get(url) => response.map_err(failed)?,
        };

        let status = body.status();
        if !(200..300).contains(&status) {
            return Err(MapError::DownloadFailed {
                url: url.to_string(),
                status: Some(status),
                reason: format!("GET request failed with status {}", status),
            });
        }

        let total = body.content_length().unwrap_or(0);
        debug!(url = %url, total, "Archive response received");

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| MapError::create_dir(parent, e))?;
        }
        let file = File::create(dest).await.map_err(|e| MapError::write(dest, e))?;
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MapError::Cancelled),
                chunk = body.next_chunk() => chunk.map_err(failed)?,
            };

            let Some(chunk) = chunk else {
                break;
            };

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| MapError::write(dest, e))?;

            written += chunk.len() as u64;
            on_bytes(written, total);
        }

        writer.flush().await.map_err(|e| MapError::write(dest, e))?;

        Ok(written)
    }
}

/// Best-effort removal of a partially written archive.
async fn remove_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial archive"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial archive"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::region::RegionCatalog;
    use tempfile::TempDir;

    /// Mock endpoint serving a fixed body in fixed-size chunks.
    pub(crate) struct StaticTransport {
        pub status: u16,
        pub body: Vec<u8>,
        pub chunk_size: usize,
        /// Stop producing chunks after this many (simulates a stalled link).
        pub stall_after: Option<usize>,
    }

    impl StaticTransport {
        pub(crate) fn ok(body: Vec<u8>) -> Self {
            Self {
                status: 200,
                body,
                chunk_size: 16,
                stall_after: None,
            }
        }
    }

    struct StaticBody {
        status: u16,
        chunks: Vec<Bytes>,
        next: usize,
        stall_after: Option<usize>,
    }

    impl ArchiveBody for StaticBody {
        fn status(&self) -> u16 {
            self.status
        }

        fn content_length(&self) -> Option<u64> {
            Some(self.chunks.iter().map(|c| c.len() as u64).sum())
        }

        fn next_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, TransportError>> {
            Box::pin(async move {
                if self.stall_after.is_some_and(|limit| self.next >= limit) {
                    std::future::pending::<()>().await;
                }
                let chunk = self.chunks.get(self.next).cloned();
                self.next += 1;
                Ok(chunk)
            })
        }
    }

    impl ArchiveTransport for StaticTransport {
        fn get<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Box<dyn ArchiveBody>, TransportError>> {
            Box::pin(async move {
                let chunks = self
                    .body
                    .chunks(self.chunk_size.max(1))
                    .map(Bytes::copy_from_slice)
                    .collect();
                Ok(Box::new(StaticBody {
                    status: self.status,
                    chunks,
                    next: 0,
                    stall_after: self.stall_after,
                }) as Box<dyn ArchiveBody>)
            })
        }
    }

    struct FailingTransport;

    impl ArchiveTransport for FailingTransport {
        fn get<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Box<dyn ArchiveBody>, TransportError>> {
            Box::pin(async { Err(TransportError::Failed("connection refused".to_string())) })
        }
    }

    fn sumut() -> Region {
        RegionCatalog::builtin().get("sumut").unwrap().clone()
    }

    fn fetcher(transport: impl ArchiveTransport + 'static) -> ArchiveFetcher {
        ArchiveFetcher::new(
            Arc::new(transport),
            "https://tiles.example.com/regions/",
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_archive_url() {
        let fetcher = fetcher(FailingTransport);
        assert_eq!(
            fetcher.archive_url(&sumut()),
            "https://tiles.example.com/regions/sumut.zip"
        );
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new(Duration::from_secs(60)).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_streams_body_with_progress() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("sumut.zip");
        let body: Vec<u8> = (0..100u8).collect();
        let fetcher = fetcher(StaticTransport::ok(body.clone()));

        let mut ticks = Vec::new();
        let written = fetcher
            .fetch(&sumut(), &dest, |n, total| ticks.push((n, total)), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written, 100);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert_eq!(ticks.len(), 7);
        assert!(ticks.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(ticks.last(), Some(&(100, 100)));
    }

    #[tokio::test]
    async fn test_fetch_http_error_carries_status() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("sumut.zip");
        let mut transport = StaticTransport::ok(b"not found".to_vec());
        transport.status = 404;

        let err = fetcher(transport)
            .fetch(&sumut(), &dest, |_, _| {}, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MapError::DownloadFailed { status: Some(404), .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_transport_error() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("sumut.zip");

        let err = fetcher(FailingTransport)
            .fetch(&sumut(), &dest, |_, _| {}, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MapError::DownloadFailed { status: None, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_cancelled_before_start() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("sumut.zip");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetcher(StaticTransport::ok(vec![1, 2, 3]))
            .fetch(&sumut(), &dest, |_, _| {}, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_cancelled_mid_transfer_removes_partial_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("sumut.zip");
        let mut transport = StaticTransport::ok(vec![7u8; 64]);
        transport.stall_after = Some(2);
        let fetcher = fetcher(transport);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let err = fetcher
            .fetch(
                &sumut(),
                &dest,
                move |written, _| {
                    if written >= 32 {
                        trigger.cancel();
                    }
                },
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_deadline() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("sumut.zip");
        let mut transport = StaticTransport::ok(vec![7u8; 64]);
        transport.stall_after = Some(1);
        let fetcher = ArchiveFetcher::new(
            Arc::new(transport),
            "https://tiles.example.com",
            Duration::from_millis(50),
        );

        let err = fetcher
            .fetch(&sumut(), &dest, |_, _| {}, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MapError::Timeout { stage: "download", .. }));
        assert!(!dest.exists());
    }
}
