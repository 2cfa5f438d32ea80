//! Command-line interface for the `rookery` server.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rookery - chess session server with live updates and archival
#[derive(Parser, Debug)]
#[command(name = "rookery")]
#[command(about = "Turn-based chess session server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "ROOKERY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP and WebSocket server
    Serve {
        /// Host to bind to
        #[arg(long, env = "ROOKERY_HOST")]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long, env = "ROOKERY_PORT")]
        port: Option<u16>,

        /// SQLite file for finished games (kept in memory if omitted)
        #[arg(long, env = "ROOKERY_ARCHIVE")]
        archive: Option<String>,
    },

    /// Validate the configuration and print the effective values
    CheckConfig,
}
