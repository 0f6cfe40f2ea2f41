//! Logging setup.
//!
//! Installs a `tracing` subscriber writing to stderr and, optionally, to a
//! log file through a non-blocking appender. `RUST_LOG` overrides the
//! configured level.

use std::path::PathBuf;

use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{MapError, MapResult};

/// Log file rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogRotation {
    #[default]
    Daily,
    Never,
}

impl LogRotation {
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "never" => Some(Self::Never),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Never => "never",
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `fieldmap=debug`.
    pub level: String,
    /// Log file; `None` logs to stderr only.
    pub file: Option<PathBuf>,
    pub rotation: LogRotation,
    /// Colored stderr output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            rotation: LogRotation::Daily,
            ansi: true,
        }
    }
}

/// Keeps the file writer alive. Dropping it flushes pending log lines.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Fails if the filter is invalid or a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> MapResult<LoggingGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| MapError::Config(format!("invalid log level '{}': {}", config.level, e)))?,
    };

    let timer = OffsetTime::local_rfc_3339()
        .unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_timer(timer.clone())
        .with_target(false);

    let (file_layer, file_guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .ok_or_else(|| MapError::Config(format!("invalid log file {}", path.display())))?;
            std::fs::create_dir_all(&dir).map_err(|e| MapError::create_dir(&dir, e))?;

            let appender = match config.rotation {
                LogRotation::Daily => tracing_appender::rolling::daily(&dir, name),
                LogRotation::Never => tracing_appender::rolling::never(&dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(timer)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| MapError::Config(format!("failed to install logger: {}", e)))?;

    Ok(LoggingGuard { _file: file_guard })
}
