use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "askuser")]
#[command(about = "Ask a person for feedback from an automated workflow", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the feedback server in the foreground
    Serve {
        /// Port to listen on (defaults from config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Request feedback from the person at the server's terminal
    Ask {
        /// One-line summary shown as the prompt
        summary: String,
        /// Project directory the feedback is about
        #[arg(short, long, default_value = ".")]
        dir: String,
        /// Also save the result to this path on the server
        #[arg(long)]
        save: Option<String>,
        /// Server endpoint (defaults from config)
        #[arg(long)]
        endpoint: Option<String>,
        /// Print the raw result JSON instead of formatted output
        #[arg(long)]
        json: bool,
    },
    /// Run one feedback session in this terminal (the server spawns this)
    Session {
        /// Project directory for the session
        #[arg(long)]
        dir: PathBuf,
        /// Prompt shown to the user
        #[arg(long)]
        prompt: String,
        /// Project settings file to use instead of the default
        #[arg(long)]
        settings_file: Option<PathBuf>,
    },
}
