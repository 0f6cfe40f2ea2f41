//! Configuration for the region lifecycle manager.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use crate::store::DEFAULT_ZOOM_RANGE;

/// Default tile archive server.
pub const DEFAULT_BASE_URL: &str = "https://tiles.fieldmap.app/regions";

/// How the lifecycle manager decides whether a region needs decompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressionPolicy {
    /// Check the magic bytes of every tile before deciding.
    Exhaustive,
    /// Check a small sample of tiles and skip the pass if none is compressed.
    Sampled,
}

impl DecompressionPolicy {
    /// Parse from a config string.
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "exhaustive" => Some(Self::Exhaustive),
            "sampled" => Some(Self::Sampled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhaustive => "exhaustive",
            Self::Sampled => "sampled",
        }
    }
}

/// Configuration for the region lifecycle manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Root of the tile pyramid and style manifests.
    pub maps_root: PathBuf,

    /// Directory for archives and unpacked tiles before they are promoted.
    ///
    /// Must be on the same filesystem as `maps_root` for atomic promotion;
    /// otherwise promotion falls back to copying.
    pub staging_dir: PathBuf,

    /// Base URL of the archive server; archives live at `{base_url}/{id}.zip`.
    pub base_url: String,

    /// Deadline for the whole archive transfer.
    pub download_timeout: Duration,

    /// Deadline for unpacking the archive.
    pub extract_timeout: Duration,

    /// Zoom levels regions are expected to contain.
    pub zoom_range: RangeInclusive<u8>,

    /// Compression detection strategy.
    pub decompression_policy: DecompressionPolicy,

    /// Worker threads for the decompression pass (0 = one per CPU).
    pub decompress_workers: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let maps_root = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("fieldmap")
            .join("maps");
        Self::new(maps_root)
    }
}

impl ManagerConfig {
    /// Create a new configuration with the given maps root.
    ///
    /// Staging lives under the maps root so promotion is a rename.
    pub fn new(maps_root: impl Into<PathBuf>) -> Self {
        let maps_root = maps_root.into();
        Self {
            staging_dir: maps_root.join(".staging"),
            maps_root,
            base_url: DEFAULT_BASE_URL.to_string(),
            download_timeout: Duration::from_secs(30 * 60),
            extract_timeout: Duration::from_secs(10 * 60),
            zoom_range: DEFAULT_ZOOM_RANGE,
            decompression_policy: DecompressionPolicy::Exhaustive,
            decompress_workers: 0,
        }
    }

    /// Set the archive server base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the staging directory.
    pub fn with_staging_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_dir = path.into();
        self
    }

    /// Set the download deadline.
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Set the extraction deadline.
    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    /// Set the expected zoom range.
    pub fn with_zoom_range(mut self, range: RangeInclusive<u8>) -> Self {
        self.zoom_range = range;
        self
    }

    /// Set the compression detection strategy.
    pub fn with_decompression_policy(mut self, policy: DecompressionPolicy) -> Self {
        self.decompression_policy = policy;
        self
    }

    /// Set the decompression worker count.
    pub fn with_decompress_workers(mut self, workers: usize) -> Self {
        self.decompress_workers = workers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert!(config.maps_root.ends_with("fieldmap/maps"));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.zoom_range, 5..=14);
        assert_eq!(config.decompression_policy, DecompressionPolicy::Exhaustive);
    }

    #[test]
    fn test_staging_under_maps_root() {
        let config = ManagerConfig::new("/data/maps");
        assert_eq!(config.staging_dir, PathBuf::from("/data/maps/.staging"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = ManagerConfig::new("/data/maps")
            .with_base_url("http://10.0.2.2:8080/tiles/")
            .with_staging_dir("/tmp/staging")
            .with_download_timeout(Duration::from_secs(60))
            .with_extract_timeout(Duration::from_secs(5))
            .with_zoom_range(5..=12)
            .with_decompression_policy(DecompressionPolicy::Sampled)
            .with_decompress_workers(2);

        assert_eq!(config.base_url, "http://10.0.2.2:8080/tiles");
        assert_eq!(config.staging_dir, PathBuf::from("/tmp/staging"));
        assert_eq!(config.download_timeout, Duration::from_secs(60));
        assert_eq!(config.extract_timeout, Duration::from_secs(5));
        assert_eq!(config.zoom_range, 5..=12);
        assert_eq!(config.decompression_policy, DecompressionPolicy::Sampled);
        assert_eq!(config.decompress_workers, 2);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ManagerConfig::new("/data").with_base_url("https://example.com/maps/");
        assert_eq!(config.base_url, "https://example.com/maps");
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            DecompressionPolicy::from_config_str("Sampled"),
            Some(DecompressionPolicy::Sampled)
        );
        assert_eq!(
            DecompressionPolicy::from_config_str(" exhaustive "),
            Some(DecompressionPolicy::Exhaustive)
        );
        assert_eq!(DecompressionPolicy::from_config_str("maybe"), None);
    }
}
