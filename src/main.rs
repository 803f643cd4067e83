//! panlive - live preview server for pandoc markdown.

mod biblio;
mod cache;
mod cli;
mod config;
mod convert;
mod core;
mod error;
mod freshness;
mod hub;
mod ingest;
mod logger;
mod pipeline;
mod render;
mod server;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::PreviewConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = PreviewConfig::load(&cli.config, cli.command.server_args())?;

    match &cli.command {
        Commands::Serve { .. } => cli::serve::run(&config),
        Commands::Send { file, target, .. } => {
            cli::send::run(&config, file.as_deref(), target.as_deref())
        }
        Commands::Status { .. } => cli::status::run(&config),
    }
}
