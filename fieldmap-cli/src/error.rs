//! CLI error type.

use std::fmt;

use fieldmap::config::ConfigFileError;
use fieldmap::MapError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Bad or missing configuration.
    Config(String),
    /// The config file could not be read or written.
    ConfigFile(ConfigFileError),
    /// A library operation failed.
    Map(MapError),
    /// The user interrupted the operation.
    Cancelled,
    /// Interactive prompt failure.
    Prompt(String),
    /// Verification found no usable region.
    Verification(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Map(e) => write!(f, "{} [{}]", e, e.kind()),
            CliError::Cancelled => write!(f, "Cancelled"),
            CliError::Prompt(msg) => write!(f, "Prompt failed: {}", msg),
            CliError::Verification(msg) => write!(f, "Verification failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<MapError> for CliError {
    fn from(e: MapError) -> Self {
        if e.is_cancelled() {
            CliError::Cancelled
        } else {
            CliError::Map(e)
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<dialoguer::Error> for CliError {
    fn from(e: dialoguer::Error) -> Self {
        CliError::Prompt(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_map_error_becomes_cancelled() {
        assert!(matches!(CliError::from(MapError::Cancelled), CliError::Cancelled));
    }

    #[test]
    fn test_map_error_display_includes_kind() {
        let err = CliError::from(MapError::RegionNotFound("atlantis".to_string()));
        assert_eq!(err.to_string(), "region not found: atlantis [region-not-found]");
    }
}
