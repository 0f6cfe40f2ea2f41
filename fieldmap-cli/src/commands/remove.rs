//! `fieldmap delete` and `fieldmap clear`.

use crate::error::CliError;
use crate::runner::CliRunner;

use super::common::confirm;

pub fn run_delete(runner: &CliRunner, region_id: &str, yes: bool) -> Result<(), CliError> {
    runner.log_startup("delete");
    let manager = runner.manager()?;
    let region = manager.catalog().require(region_id)?;

    if !confirm(&format!("Delete {}?", region.display_name), yes)? {
        println!("Aborted.");
        return Ok(());
    }

    if runner.block_on(manager.delete_region(region_id))? {
        println!("Deleted {}.", region.display_name);
    } else {
        println!("{} was not installed.", region.display_name);
    }
    Ok(())
}

pub fn run_clear(runner: &CliRunner, yes: bool) -> Result<(), CliError> {
    runner.log_startup("clear");
    let manager = runner.manager()?;
    let root = manager.config().maps_root.clone();

    if !confirm(
        &format!("Delete ALL map data under {}?", root.display()),
        yes,
    )? {
        println!("Aborted.");
        return Ok(());
    }

    if runner.block_on(manager.delete_all_map_data())? {
        println!("Removed {}.", root.display());
    } else {
        println!("No map data found.");
    }
    Ok(())
}
