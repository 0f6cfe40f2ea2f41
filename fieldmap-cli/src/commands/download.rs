//! `fieldmap download` and `fieldmap repair`.

use console::style;
use fieldmap::manager::{DownloadOutcome, DownloadResult, ProgressSink};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::common::{cancel_on_ctrlc, format_bytes, ProgressDisplay};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Download and install one region.
pub fn run_download(runner: &CliRunner, region_id: &str) -> Result<(), CliError> {
    runner.log_startup("download");
    let manager = runner.manager()?;
    let region = manager.catalog().require(region_id)?.clone();

    let cancel = CancellationToken::new();
    cancel_on_ctrlc(&cancel)?;

    println!(
        "Downloading {} ({}, ~{})",
        style(&region.display_name).bold(),
        region.id,
        format_bytes(region.approx_size_bytes)
    );

    let (sink, rx) = ProgressSink::channel();
    let result = runner.block_on(async {
        let display = tokio::spawn(ProgressDisplay::new().run(rx));
        let result = manager.download_region(&region.id, sink, cancel).await;
        // The sink is dropped with the pipeline, which ends the display loop.
        let _ = display.await;
        result
    });

    let flat = DownloadResult::from_result(&region.id, &result);
    info!(region = %flat.region_id, success = flat.success, "Download finished");

    let report = result?;
    match report.outcome {
        DownloadOutcome::AlreadyInstalled => {
            println!("{} is already installed.", region.display_name);
        }
        DownloadOutcome::Installed => {
            println!(
                "{} Installed {} ({} downloaded, {} files)",
                style("✓").green(),
                region.display_name,
                format_bytes(report.bytes_downloaded),
                report.files_extracted
            );
            if let Some(stats) = report.decompression {
                println!(
                    "  Tiles: {} decompressed, {} already raw, {} failed",
                    stats.decompressed, stats.skipped, stats.failed
                );
                if stats.failed > 0 {
                    warn!(region = %region.id, failed = stats.failed, "Some tiles could not be decompressed");
                    println!("  Run 'fieldmap repair {}' to retry.", region.id);
                }
            }
        }
    }

    Ok(())
}

/// Re-run decompression over an installed region.
pub fn run_repair(runner: &CliRunner, region_id: &str) -> Result<(), CliError> {
    runner.log_startup("repair");
    let manager = runner.manager()?;

    let cancel = CancellationToken::new();
    cancel_on_ctrlc(&cancel)?;

    let (sink, rx) = ProgressSink::channel();
    let result = runner.block_on(async {
        let display = tokio::spawn(ProgressDisplay::new().run(rx));
        let result = manager.repair_region(region_id, sink, cancel).await;
        let _ = display.await;
        result
    });

    match result? {
        None => println!("{} is not installed.", region_id),
        Some(stats) if stats.total == 0 => println!("{} has no compressed tiles.", region_id),
        Some(stats) => println!(
            "Repaired {}: {} decompressed, {} already raw, {} failed, {} saved",
            region_id,
            stats.decompressed,
            stats.skipped,
            stats.failed,
            format_bytes(stats.bytes_saved.max(0) as u64)
        ),
    }

    Ok(())
}
