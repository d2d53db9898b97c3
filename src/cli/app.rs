use super::commands::config::ConfigCommands;
use super::commands::request::RequestCommands;
use super::commands::token::TokenCommands;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "partner-cli")]
#[command(about = "A CLI tool for calling the Partner Center REST API")]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Locale sent with every request (overrides the config)
    #[arg(long, global = true)]
    pub locale: Option<String>,

    /// Correlation id shared by every request of this invocation
    #[arg(long, global = true)]
    pub correlation_id: Option<Uuid>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a request through the partner service proxy
    Request(RequestCommands),
    /// Acquire an access token with the configured credentials
    Token(TokenCommands),
    /// Configuration management
    Config(ConfigCommands),
}
