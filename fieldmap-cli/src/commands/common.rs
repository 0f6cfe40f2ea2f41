//! Common utilities shared across CLI commands.

use std::collections::HashMap;
use std::time::Duration;

use console::style;
use dialoguer::Confirm;
use fieldmap::manager::{Phase, ProgressEvent};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Install a Ctrl+C handler that cancels `token`.
pub fn cancel_on_ctrlc(token: &CancellationToken) -> Result<(), CliError> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received interrupt, cancelling...");
        token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))
}

/// Ask before destructive operations unless `assume_yes` is set.
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool, CliError> {
    if assume_yes {
        return Ok(true);
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

fn bar_style(phase: Phase) -> ProgressStyle {
    let template = match phase {
        Phase::Download => {
            "{prefix:>14} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})"
        }
        Phase::Extract => "{prefix:>14} [{bar:40.cyan/blue}] {pos}/{len} entries",
        Phase::Decompress => "{prefix:>14} [{bar:40.cyan/blue}] {pos}/{len} tiles {msg}",
    };
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Renders pipeline progress events as one bar per phase.
pub struct ProgressDisplay {
    multi: MultiProgress,
    bars: HashMap<Phase, ProgressBar>,
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressDisplay {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }

    fn bar(&mut self, phase: Phase) -> &ProgressBar {
        let multi = &self.multi;
        self.bars.entry(phase).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(0));
            bar.set_style(bar_style(phase));
            bar.set_prefix(phase.name());
            bar.enable_steady_tick(Duration::from_millis(200));
            bar
        })
    }

    pub fn update(&mut self, event: &ProgressEvent) {
        let bar = self.bar(event.phase);
        if event.total > 0 {
            bar.set_length(event.total);
        }
        bar.set_position(event.current);
        if let Some(item) = &event.item {
            bar.set_message(item.clone());
        }
    }

    /// Drain events until the sending side closes.
    pub async fn run(mut self, mut rx: UnboundedReceiver<ProgressEvent>) {
        while let Some(event) = rx.recv().await {
            self.update(&event);
        }
        for bar in self.bars.values() {
            bar.finish_and_clear();
        }
    }
}

/// Format a byte count for display.
pub fn format_bytes(bytes: u64) -> String {
    fieldmap::verify::format_size(bytes)
}

/// Green check or red cross.
pub fn mark(ok: bool) -> String {
    if ok {
        style("✓").green().to_string()
    } else {
        style("✗").red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_assume_yes_skips_prompt() {
        assert!(confirm("Delete everything?", true).unwrap());
    }

    #[test]
    fn test_progress_display_tracks_phases() {
        let mut display = ProgressDisplay::new();
        display.update(&ProgressEvent {
            region_id: "sumut".to_string(),
            phase: Phase::Download,
            current: 50,
            total: 100,
            item: None,
        });
        display.update(&ProgressEvent {
            region_id: "sumut".to_string(),
            phase: Phase::Decompress,
            current: 1,
            total: 4,
            item: Some("7.pbf".to_string()),
        });

        assert_eq!(display.bars.len(), 2);
        assert_eq!(display.bars[&Phase::Download].position(), 50);
        assert_eq!(display.bars[&Phase::Decompress].length(), Some(4));
    }
}
