use anyhow::Result;
use clap::Parser;
use log::info;

mod cli;

use cli::{Cli, Commands};
use cli::commands::{handle_config_command, handle_request_command, handle_token_command};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env().format_timestamp_millis().init();

    let cli = Cli::parse();
    info!("Starting partner-cli");

    match &cli.command {
        Commands::Request(args) => handle_request_command(&cli, args).await,
        Commands::Token(args) => handle_token_command(&cli, args).await,
        Commands::Config(args) => handle_config_command(&cli, args),
    }
}
