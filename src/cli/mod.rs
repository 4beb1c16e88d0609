//! Command-line front end for the device runtime.

pub mod auth;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tether device runtime
#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "Cloud-connected device runtime")]
pub struct Cli {
    /// TOML configuration file (environment variables still override it)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the device until interrupted
    Run,
    /// Show whether stored credentials exist
    Status,
    /// Forget the stored credentials
    Logout,
}
