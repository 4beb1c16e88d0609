//! Tether device binary entry point.

use clap::Parser;
use tether::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tether::cli::run::init_logging();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Run => tether::cli::run::handle_run(config).await,
        Commands::Status => tether::cli::auth::handle_status(config),
        Commands::Logout => tether::cli::auth::handle_logout(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
