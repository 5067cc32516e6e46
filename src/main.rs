use clap::Parser;
use tracing_subscriber::EnvFilter;

use askuser::cli::handlers;
use askuser::cli::{Cli, Commands};
use askuser::{Config, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing. Logs go to stderr; stdout carries the session
    // result when running as a host.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("askuser=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    // Handle commands
    match cli.command {
        Commands::Serve { port } => handlers::serve(config, port).await,
        Commands::Ask {
            summary,
            dir,
            save,
            endpoint,
            json,
        } => handlers::ask(config, summary, dir, save, endpoint, json).await,
        Commands::Session {
            dir,
            prompt,
            settings_file,
        } => handlers::session(config, dir, prompt, settings_file).await,
    }
}
