//! Shared setup for commands that touch map data.

use std::future::Future;
use std::path::{Path, PathBuf};

use fieldmap::config::{config_file_path, ConfigFile};
use fieldmap::logging::{init_logging, LoggingGuard};
use fieldmap::manager::RegionLifecycleManager;
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;

/// Loads configuration, installs logging and owns the async runtime.
pub struct CliRunner {
    config_path: PathBuf,
    config: ConfigFile,
    runtime: Runtime,
    _log_guard: LoggingGuard,
}

impl CliRunner {
    /// Load the config at `config_path` (or the default location).
    pub fn new(config_path: Option<&Path>, verbose: bool) -> Result<Self, CliError> {
        let config_path = resolve_config_path(config_path);
        let config = ConfigFile::load_from(&config_path)?;

        let mut logging = config.to_logging_config();
        if verbose {
            logging.level = "debug".to_string();
        }
        let log_guard = init_logging(&logging)?;

        let runtime = Runtime::new()
            .map_err(|e| CliError::Config(format!("Failed to start async runtime: {}", e)))?;

        Ok(Self {
            config_path,
            config,
            runtime,
            _log_guard: log_guard,
        })
    }

    /// Log the command being run along with where data lives.
    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = env!("CARGO_PKG_VERSION"),
            config = %self.config_path.display(),
            maps = %self.config.maps.directory.display(),
            "FieldMap starting"
        );
    }

    /// Build the lifecycle manager from the loaded config.
    pub fn manager(&self) -> Result<RegionLifecycleManager, CliError> {
        let catalog = self.config.load_catalog()?;
        // reqwest needs a runtime context to build its client.
        let _enter = self.runtime.enter();
        Ok(RegionLifecycleManager::new(
            self.config.to_manager_config(),
            catalog,
        )?)
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// The `--config` path if given, otherwise the default location.
pub(crate) fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map(Path::to_path_buf).unwrap_or_else(config_file_path)
}
