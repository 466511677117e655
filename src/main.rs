//! eobands CLI entrypoint.
//!
//! Provides a thin wrapper over the `cli` module: parse args, open the
//! product, load or stack the requested bands, and exit with appropriate
//! status. For programmatic use, prefer the library API (`eobands::api`).

use clap::Parser;

mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::CliArgs::parse();
    cli::run(args)
}
