//! CLI command definitions for the `mlorch` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod catalog;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Orchestrate ML service workflows.
#[derive(Parser)]
#[command(name = "mlorch", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the TOML config file. Defaults apply when it does not exist.
    #[arg(long, global = true, env = "MLORCH_CONFIG", default_value = "mlorch.toml")]
    pub config: PathBuf,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Port to listen on (overrides `[server] port`).
        #[arg(long, short, env = "PORT")]
        port: Option<u16>,

        /// Host to bind to (overrides `[server] host`).
        #[arg(long, env = "HOST")]
        host: Option<String>,
    },

    /// Run a single orchestration request and print its report.
    Run {
        /// Request JSON, or `@path` to read it from a file.
        #[arg(long, short)]
        request: String,

        /// Print execution events as they happen.
        #[arg(long)]
        watch: bool,
    },

    /// Inspect the workflow catalog.
    Catalog {
        #[command(subcommand)]
        action: CatalogCommand,
    },
}

#[derive(Subcommand)]
pub enum CatalogCommand {
    /// List the loaded workflows in selection order.
    #[command(alias = "ls")]
    List,

    /// Validate a catalog file without starting anything.
    Validate {
        /// Catalog YAML file.
        file: PathBuf,
    },
}
