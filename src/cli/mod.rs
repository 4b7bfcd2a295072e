//! Command-line interface.

pub mod serve;

use clap::{Parser, Subcommand};

/// Veplane control-plane worker.
#[derive(Debug, Parser)]
#[command(name = "veplane", version, about = "Virtual-employee platform control plane")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a configuration file (overrides the project config).
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the worker: workflow engine, recovery, and HTTP surface.
    Serve {
        /// Bind address override (e.g. 0.0.0.0:7420).
        #[arg(long)]
        bind: Option<String>,
    },
    /// Apply database migrations and exit.
    Migrate,
    /// Validate the effective configuration and print it.
    ConfigCheck,
}
