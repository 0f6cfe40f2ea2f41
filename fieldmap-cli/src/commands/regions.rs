//! `fieldmap regions`: list the catalog and what is installed.

use console::style;

use super::common::{format_bytes, mark};
use crate::error::CliError;
use crate::runner::CliRunner;

pub fn run(runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("regions");
    let manager = runner.manager()?;

    println!("{}", style("Available regions").bold());
    println!();
    println!(
        "  {:<8} {:<24} {:>10}  {:<9} Ready",
        "ID", "Name", "Size", "Installed"
    );

    for region in manager.catalog().regions() {
        let installed = manager.store().is_installed(region);
        let ready = manager.check_region_file_exists(&region.id)?;
        println!(
            "  {:<8} {:<24} {:>10}  {:<9} {}",
            region.id,
            region.display_name,
            format_bytes(region.approx_size_bytes),
            mark(installed),
            mark(ready),
        );
    }

    println!();
    if manager.has_any_region_ready() {
        let ids: Vec<&str> = manager
            .installed_regions()
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        println!("Installed: {}", ids.join(", "));
    } else {
        println!("No regions installed. Run 'fieldmap download <id>' to fetch one.");
    }

    Ok(())
}
