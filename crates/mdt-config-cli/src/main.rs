//! MDT configuration CLI
//!
//! Loads the layered MDT configuration and shows what a model resolves to.

mod cli;
mod commands;
mod error;

use clap::Parser;
use colored::Colorize;
use mdt_config::{ConfigLoader, ConfigStore};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands};
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing if verbose
    if cli.verbose {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_target(true)
            .with_writer(std::io::stderr)
            .finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("{}: tracing subscriber already set", "warning".yellow().bold());
        }
        tracing::debug!("Verbose mode enabled");
    }

    let store = load_store(&cli)?;
    execute_command(&store, cli.command)
}

fn load_store(cli: &Cli) -> Result<ConfigStore> {
    let mut loader = ConfigLoader::new();
    if cli.no_user_config {
        loader = loader.without_user_config();
    }
    for path in &cli.configs {
        loader = loader.with_file(path);
    }

    let store = ConfigStore::new();
    loader.load_into(&store)?;
    Ok(store)
}

fn execute_command(store: &ConfigStore, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Resolve {
            model,
            cascade_hint,
            json,
        } => commands::run_resolve(store, &model, cascade_hint.as_deref(), json),
        Commands::Get { path } => commands::run_get(store, &path),
        Commands::Rules { model } => commands::run_rules(store, model.as_deref()),
    }
}
