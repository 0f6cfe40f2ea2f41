//! FieldMap CLI - Command-line interface
//!
//! Downloads, repairs, verifies and removes offline map regions.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "fieldmap")]
#[command(about = "Offline vector-tile maps for field work", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog regions and their install state
    Regions,

    /// Download and install a region
    Download {
        /// Region id (see `fieldmap regions`)
        region: String,
    },

    /// Delete an installed region
    Delete {
        region: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete all map data
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show disk usage of one region or all of them
    Size {
        region: Option<String>,
    },

    /// Check the on-disk structure of every region
    Verify {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the install state of a region
    Status {
        region: String,
    },

    /// Decompress any tiles still GZIP-encoded
    Repair {
        region: String,
    },

    /// Print the tile file covering a position
    #[command(allow_negative_numbers = true)]
    Tile {
        /// Latitude in degrees
        lat: f64,

        /// Longitude in degrees
        lon: f64,

        /// Zoom level (defaults to the top of the configured range)
        #[arg(short, long)]
        zoom: Option<u8>,

        /// Only look in this region
        #[arg(short, long)]
        region: Option<String>,
    },

    /// View or modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(match e {
            CliError::Cancelled => 130,
            _ => 1,
        });
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    // Config commands work on the raw file and skip logging setup.
    let command = match cli.command {
        Commands::Config { command } => return commands::config::run(command, cli.config.as_deref()),
        other => other,
    };

    let runner = CliRunner::new(cli.config.as_deref(), cli.verbose)?;

    match command {
        Commands::Regions => commands::regions::run(&runner),
        Commands::Download { region } => commands::download::run_download(&runner, &region),
        Commands::Delete { region, yes } => commands::remove::run_delete(&runner, &region, yes),
        Commands::Clear { yes } => commands::remove::run_clear(&runner, yes),
        Commands::Size { region } => commands::inspect::run_size(&runner, region.as_deref()),
        Commands::Verify { json } => commands::inspect::run_verify(&runner, json),
        Commands::Status { region } => commands::inspect::run_status(&runner, &region),
        Commands::Repair { region } => commands::download::run_repair(&runner, &region),
        Commands::Tile {
            lat,
            lon,
            zoom,
            region,
        } => commands::inspect::run_tile(&runner, lat, lon, zoom, region.as_deref()),
        // Handled before the runner is built.
        Commands::Config { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_negative_coordinates() {
        let cli = Cli::try_parse_from(["fieldmap", "tile", "-0.5", "101.4", "--zoom", "10"]).unwrap();
        match cli.command {
            Commands::Tile { lat, lon, zoom, .. } => {
                assert_eq!(lat, -0.5);
                assert_eq!(lon, 101.4);
                assert_eq!(zoom, Some(10));
            }
            _ => panic!("expected tile command"),
        }
    }

    #[test]
    fn test_cli_global_config_flag() {
        let cli = Cli::try_parse_from(["fieldmap", "verify", "--json", "--config", "/tmp/f.ini"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/f.ini")));
        assert!(matches!(cli.command, Commands::Verify { json: true }));
    }

    #[test]
    fn clap_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
