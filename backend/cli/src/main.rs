mod doctor_cmd;
mod serve;
mod status_cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatitp")]
#[command(about = "ChatITP: a conversational guide to the ITP capstone archive")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $CHATITP_CONFIG or ./chatitp.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Query a running server's health endpoint
    Status,
    /// Validate the configuration and print it with secrets redacted
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => serve::run(cli.config.as_deref(), port).await,
        Commands::Status => status_cmd::run(cli.config.as_deref()).await,
        Commands::CheckConfig => doctor_cmd::run(cli.config.as_deref()).await,
    }
}
