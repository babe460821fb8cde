//! oget
//!
//! Entry point for the command line client. Logs go to stderr, responses to
//! stdout.

use anyhow::Context;
use clap::Parser;
use oget::cli::Cli;
use oget::runner::{self, OutputOptions, Requests};
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "oget=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli
        .load_config()?
        .to_runtime()
        .context("Invalid configuration")?;

    tracing::info!(
        "Using {} with {:?} authentication",
        config.service_root,
        config.auth_mode
    );

    let requests = match cli.entity_path {
        Some(path) => Requests::Single(path),
        None => Requests::Lines(tokio::io::stdin()),
    };
    let options = OutputOptions {
        dump_header: cli.dump_header,
    };

    let mut stdout = io::stdout();
    let count = runner::run(Arc::new(config), requests, options, &mut stdout).await?;

    tracing::info!("Dispatched {} request(s)", count);
    Ok(())
}
