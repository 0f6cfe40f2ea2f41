//! Progress reporting for region downloads.
//!
//! Every stage of a download reports [`ProgressEvent`]s tagged with the
//! [`Phase`] they belong to, so callers never have to infer the stage from
//! a number range. Events travel over a tokio unbounded channel; a closed
//! receiver is ignored so a UI that goes away never stalls the pipeline.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Archive transfer; `current`/`total` are bytes.
    Download,
    /// Archive unpacking; `current`/`total` are archive entries.
    Extract,
    /// Tile repair; `current`/`total` are tile files.
    Decompress,
}

impl Phase {
    /// Get a human-readable name for the phase.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Download => "Downloading",
            Self::Extract => "Extracting",
            Self::Decompress => "Decompressing",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One progress tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub region_id: String,
    pub phase: Phase,
    /// Units done so far within the phase.
    pub current: u64,
    /// Units expected for the phase; 0 when unknown.
    pub total: u64,
    /// File name of the tile just processed (decompress phase only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
}

impl ProgressEvent {
    /// Completion of the phase in percent (0.0 - 100.0).
    ///
    /// Returns 0.0 while the total is unknown.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f64 / self.total as f64 * 100.0).min(100.0)
    }
}

/// Sending half of a progress channel.
///
/// Cloneable and `Sync`, so it can be shared with blocking and rayon
/// workers.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// Create a sink and the receiver its events arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event.
    pub fn none() -> Self {
        Self { tx: None }
    }

    /// Emit an event. Dropped silently if nobody is listening.
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    /// Bind the sink to a region so stages only pass numbers.
    pub fn for_region(&self, region_id: &str) -> RegionProgress {
        RegionProgress {
            sink: self.clone(),
            region_id: region_id.to_string(),
        }
    }
}

/// A [`ProgressSink`] bound to one region.
#[derive(Debug, Clone)]
pub struct RegionProgress {
    sink: ProgressSink,
    region_id: String,
}

impl RegionProgress {
    pub fn report(&self, phase: Phase, current: u64, total: u64) {
        self.sink.emit(ProgressEvent {
            region_id: self.region_id.clone(),
            phase,
            current,
            total,
            item: None,
        });
    }

    pub fn report_item(&self, phase: Phase, current: u64, total: u64, item: &str) {
        self.sink.emit(ProgressEvent {
            region_id: self.region_id.clone(),
            phase,
            current,
            total,
            item: Some(item.to_string()),
        });
    }
}
