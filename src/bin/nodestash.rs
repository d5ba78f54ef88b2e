//! Nodestash CLI Binary
//!
//! Command-line inspection of nodestash containers.

use anyhow::Context;
use clap::Parser;
use nodestash::config::ConfigLoader;
use nodestash::logging::init_logging;
use nodestash::tooling::cli::{Cli, CliContext};
use std::process;

fn run(cli: &Cli) -> anyhow::Result<String> {
    let mut config =
        ConfigLoader::load_with(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    init_logging(Some(&config.logging)).context("Failed to initialize logging")?;

    let context = CliContext::from_config(config).context("Failed to open store")?;
    Ok(context.execute(&cli.command)?)
}

fn main() {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
