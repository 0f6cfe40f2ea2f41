//! Typed access to individual configuration keys.
//!
//! Keys are addressed as `section.key`, e.g. `download.base_url`, both by
//! the INI loader and by `fieldmap config get/set`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigFile, ConfigFileError};
use crate::logging::LogRotation;
use crate::manager::DecompressionPolicy;

/// Every key the config file understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    MapsDirectory,
    MapsStagingDir,
    MapsCatalog,
    DownloadBaseUrl,
    DownloadTimeoutSecs,
    DownloadExtractTimeoutSecs,
    DecompressPolicy,
    DecompressWorkers,
    LoggingLevel,
    LoggingFile,
    LoggingRotation,
}

/// Returned when parsing an unknown `section.key` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKeyError(pub String);

impl fmt::Display for ConfigKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown configuration key '{}'", self.0)
    }
}

impl std::error::Error for ConfigKeyError {}

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            Self::MapsDirectory,
            Self::MapsStagingDir,
            Self::MapsCatalog,
            Self::DownloadBaseUrl,
            Self::DownloadTimeoutSecs,
            Self::DownloadExtractTimeoutSecs,
            Self::DecompressPolicy,
            Self::DecompressWorkers,
            Self::LoggingLevel,
            Self::LoggingFile,
            Self::LoggingRotation,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            Self::MapsDirectory | Self::MapsStagingDir | Self::MapsCatalog => "maps",
            Self::DownloadBaseUrl | Self::DownloadTimeoutSecs | Self::DownloadExtractTimeoutSecs => {
                "download"
            }
            Self::DecompressPolicy | Self::DecompressWorkers => "decompress",
            Self::LoggingLevel | Self::LoggingFile | Self::LoggingRotation => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            Self::MapsDirectory => "directory",
            Self::MapsStagingDir => "staging_dir",
            Self::MapsCatalog => "catalog",
            Self::DownloadBaseUrl => "base_url",
            Self::DownloadTimeoutSecs => "timeout_secs",
            Self::DownloadExtractTimeoutSecs => "extract_timeout_secs",
            Self::DecompressPolicy => "policy",
            Self::DecompressWorkers => "workers",
            Self::LoggingLevel => "level",
            Self::LoggingFile => "file",
            Self::LoggingRotation => "rotation",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as written to the file. Unset options are empty.
    pub fn get(&self, config: &ConfigFile) -> String {
        fn path(p: &Option<PathBuf>) -> String {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        }

        match self {
            Self::MapsDirectory => config.maps.directory.display().to_string(),
            Self::MapsStagingDir => path(&config.maps.staging_dir),
            Self::MapsCatalog => path(&config.maps.catalog),
            Self::DownloadBaseUrl => config.download.base_url.clone(),
            Self::DownloadTimeoutSecs => config.download.timeout_secs.to_string(),
            Self::DownloadExtractTimeoutSecs => config.download.extract_timeout_secs.to_string(),
            Self::DecompressPolicy => config.decompress.policy.as_str().to_string(),
            Self::DecompressWorkers => config.decompress.workers.to_string(),
            Self::LoggingLevel => config.logging.level.clone(),
            Self::LoggingFile => path(&config.logging.file),
            Self::LoggingRotation => config.logging.rotation.as_str().to_string(),
        }
    }

    /// Parse and store `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigFileError> {
        let value = value.trim();
        let optional_path = || (!value.is_empty()).then(|| PathBuf::from(value));

        match self {
            Self::MapsDirectory => {
                if value.is_empty() {
                    return Err(self.invalid(value, "must not be empty"));
                }
                config.maps.directory = PathBuf::from(value);
            }
            Self::MapsStagingDir => config.maps.staging_dir = optional_path(),
            Self::MapsCatalog => config.maps.catalog = optional_path(),
            Self::DownloadBaseUrl => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(self.invalid(value, "must be an http(s) URL"));
                }
                config.download.base_url = value.trim_end_matches('/').to_string();
            }
            Self::DownloadTimeoutSecs => config.download.timeout_secs = self.parse_secs(value)?,
            Self::DownloadExtractTimeoutSecs => {
                config.download.extract_timeout_secs = self.parse_secs(value)?
            }
            Self::DecompressPolicy => {
                config.decompress.policy = DecompressionPolicy::from_config_str(value)
                    .ok_or_else(|| self.invalid(value, "expected 'exhaustive' or 'sampled'"))?;
            }
            Self::DecompressWorkers => {
                config.decompress.workers = value
                    .parse()
                    .map_err(|e: std::num::ParseIntError| self.invalid(value, &e.to_string()))?;
            }
            Self::LoggingLevel => {
                if value.is_empty() {
                    return Err(self.invalid(value, "must not be empty"));
                }
                config.logging.level = value.to_string();
            }
            Self::LoggingFile => config.logging.file = optional_path(),
            Self::LoggingRotation => {
                config.logging.rotation = LogRotation::from_config_str(value)
                    .ok_or_else(|| self.invalid(value, "expected 'daily' or 'never'"))?;
            }
        }

        Ok(())
    }

    fn parse_secs(&self, value: &str) -> Result<u64, ConfigFileError> {
        match value.parse::<u64>() {
            Ok(0) => Err(self.invalid(value, "must be greater than zero")),
            Ok(secs) => Ok(secs),
            Err(e) => Err(self.invalid(value, &e.to_string())),
        }
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.section(),
            key: self.key_name(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|key| key.name() == s.trim())
            .ok_or_else(|| ConfigKeyError(s.to_string()))
    }
}
