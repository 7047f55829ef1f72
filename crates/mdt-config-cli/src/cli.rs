//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect the effective MDT configuration
#[derive(Parser, Debug)]
#[command(name = "mdt-config")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Extra configuration file, merged after the user configuration.
    /// May be given more than once.
    #[arg(short, long = "config", global = true, value_name = "FILE")]
    pub configs: Vec<PathBuf>,

    /// Do not read the user configuration file
    #[arg(long, global = true, env = "MDT_NO_USER_CONFIG")]
    pub no_user_config: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show the effective optimization settings of a model
    ///
    /// Examples:
    ///   mdt-config resolve Noddi
    ///   mdt-config resolve BallStickStick --json
    ///   mdt-config resolve Noddi --cascade-hint hint.yaml
    Resolve {
        /// Model name, matched against the single model rules
        model: String,

        /// Settings file merged last, on top of every rule
        #[arg(long, value_name = "FILE")]
        cascade_hint: Option<PathBuf>,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Print one option of the loaded document, e.g. `batch_fitting.output_subdir`
    Get {
        /// Dotted path, with `[n]` for sequence items
        path: String,
    },

    /// List the single model rules in the order they apply
    Rules {
        /// Mark the rules that match this model
        model: Option<String>,
    },
}
