//! Read-only commands: `size`, `verify`, `status` and `tile`.

use console::style;

use super::common::{format_bytes, mark};
use crate::error::CliError;
use crate::runner::CliRunner;

pub fn run_size(runner: &CliRunner, region_id: Option<&str>) -> Result<(), CliError> {
    runner.log_startup("size");
    let manager = runner.manager()?;
    let bytes = runner.block_on(manager.region_storage_size(region_id))?;

    match region_id {
        Some(id) => println!("{}: {}", id, format_bytes(bytes)),
        None => println!("All regions: {}", format_bytes(bytes)),
    }
    Ok(())
}

/// Print the structure report; fails when no region is usable.
pub fn run_verify(runner: &CliRunner, json: bool) -> Result<(), CliError> {
    runner.log_startup("verify");
    let manager = runner.manager()?;
    let report = runner.block_on(manager.verify())?;

    if json {
        println!("{}", report.to_json());
    } else {
        print!("{}", report.to_text());
    }

    if report.success {
        Ok(())
    } else {
        Err(CliError::Verification(
            "no installed region has tiles".to_string(),
        ))
    }
}

pub fn run_status(runner: &CliRunner, region_id: &str) -> Result<(), CliError> {
    runner.log_startup("status");
    let manager = runner.manager()?;
    let region = manager.catalog().require(region_id)?.clone();
    let state = runner.block_on(manager.region_status(region_id))?;

    println!("{} ({})", style(&region.display_name).bold(), region.id);
    println!("  Installed:   {}", mark(state.installed));
    println!("  Ready:       {}", mark(state.ready));
    println!("  Normalized:  {}", mark(state.normalized));
    let levels: Vec<String> = state.zoom_levels.iter().map(u8::to_string).collect();
    println!(
        "  Zoom levels: {}",
        if levels.is_empty() {
            "-".to_string()
        } else {
            levels.join(", ")
        }
    );
    println!("  Size:        {}", format_bytes(state.size_bytes));
    if let Some(path) = manager.style_path(region_id)? {
        println!("  Style:       {}", path.display());
    }
    Ok(())
}

/// Resolve the tile file under a position.
pub fn run_tile(
    runner: &CliRunner,
    lat: f64,
    lon: f64,
    zoom: Option<u8>,
    region_id: Option<&str>,
) -> Result<(), CliError> {
    runner.log_startup("tile");
    let manager = runner.manager()?;

    let candidates: Vec<String> = match region_id {
        Some(id) => vec![manager.catalog().require(id)?.id.clone()],
        None => manager
            .catalog()
            .regions_at(lon, lat)
            .into_iter()
            .map(|r| r.id.clone())
            .collect(),
    };

    if candidates.is_empty() {
        println!("No catalog region covers {:.5}, {:.5}.", lat, lon);
        return Ok(());
    }

    for id in &candidates {
        if let Some(path) = manager.tile_path_for_location(id, lon, lat, zoom)? {
            println!("{}", path.display());
            return Ok(());
        }
    }

    println!(
        "No tile on disk for {:.5}, {:.5} (checked {}).",
        lat,
        lon,
        candidates.join(", ")
    );
    Ok(())
}
