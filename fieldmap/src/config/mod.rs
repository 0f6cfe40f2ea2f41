//! Configuration file support.
//!
//! Settings live in an INI file, by default
//! `{config_dir}/fieldmap/config.ini`:
//!
//! ```ini
//! [maps]
//! directory = /home/user/.local/share/fieldmap/maps
//! staging_dir =
//! catalog =
//!
//! [download]
//! base_url = https://tiles.fieldmap.app/regions
//! timeout_secs = 1800
//! extract_timeout_secs = 600
//!
//! [decompress]
//! policy = exhaustive
//! workers = 0
//!
//! [logging]
//! level = info
//! file =
//! rotation = daily
//! ```
//!
//! A missing file or missing keys fall back to defaults.

mod keys;

pub use keys::{ConfigKey, ConfigKeyError};

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::error::MapResult;
use crate::logging::{LogRotation, LoggingConfig};
use crate::manager::{DecompressionPolicy, ManagerConfig, DEFAULT_BASE_URL};
use crate::region::RegionCatalog;

/// Errors from reading or writing the config file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read config {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// `[maps]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct MapsSettings {
    pub directory: PathBuf,
    /// Defaults to `{directory}/.staging`.
    pub staging_dir: Option<PathBuf>,
    /// JSON region catalog replacing the built-in one.
    pub catalog: Option<PathBuf>,
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub extract_timeout_secs: u64,
}

/// `[decompress]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompressSettings {
    pub policy: DecompressionPolicy,
    pub workers: usize,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
    pub rotation: LogRotation,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub maps: MapsSettings,
    pub download: DownloadSettings,
    pub decompress: DecompressSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let manager = ManagerConfig::default();
        Self {
            maps: MapsSettings {
                directory: manager.maps_root,
                staging_dir: None,
                catalog: None,
            },
            download: DownloadSettings {
                base_url: DEFAULT_BASE_URL.to_string(),
                timeout_secs: manager.download_timeout.as_secs(),
                extract_timeout_secs: manager.extract_timeout.as_secs(),
            },
            decompress: DecompressSettings {
                policy: manager.decompression_policy,
                workers: manager.decompress_workers,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                file: None,
                rotation: LogRotation::Daily,
            },
        }
    }
}

/// Default location of the config file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldmap")
        .join("config.ini")
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigFileError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse INI text.
    pub fn parse(content: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigFileError::Read {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigFileError> {
        let mut config = Self::default();

        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|props| props.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }

        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        let write_err = |source| ConfigFileError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini.write_to_file(path).map_err(write_err)
    }

    /// Settings for the lifecycle manager.
    pub fn to_manager_config(&self) -> ManagerConfig {
        let mut config = ManagerConfig::new(&self.maps.directory)
            .with_base_url(&self.download.base_url)
            .with_download_timeout(Duration::from_secs(self.download.timeout_secs))
            .with_extract_timeout(Duration::from_secs(self.download.extract_timeout_secs))
            .with_decompression_policy(self.decompress.policy)
            .with_decompress_workers(self.decompress.workers);
        if let Some(staging) = &self.maps.staging_dir {
            config = config.with_staging_dir(staging);
        }
        config
    }

    /// Settings for [`init_logging`](crate::logging::init_logging).
    pub fn to_logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging.level.clone(),
            file: self.logging.file.clone(),
            rotation: self.logging.rotation,
            ansi: true,
        }
    }

    /// The configured catalog, or the built-in one.
    pub fn load_catalog(&self) -> MapResult<RegionCatalog> {
        match &self.maps.catalog {
            Some(path) => RegionCatalog::from_json_file(path),
            None => Ok(RegionCatalog::builtin()),
        }
    }
}
