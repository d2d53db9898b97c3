use anyhow::{Context, Result};
use clap::Args;
use colored::*;

use crate::cli::Cli;
use crate::cli::session;

#[derive(Args)]
pub struct TokenCommands {
    /// Print the access token itself
    #[arg(long)]
    pub show_token: bool,
}

pub async fn handle_token_command(cli: &Cli, args: &TokenCommands) -> Result<()> {
    let config = session::load_config(cli)?;
    let provider = config
        .token_provider()?
        .context("No credentials configured. Add a [credentials] section or set PARTNER_CENTER_TENANT_ID and friends")?;

    let credentials = provider.acquire_token().await.context("Failed to acquire partner token")?;

    println!("{} Token acquired from {}", "✓".bright_green(), provider.token_url().cyan());
    println!("  {}: {}", "Expires at".dimmed(), credentials.expires_at.to_rfc3339());
    println!("  {}: {}s", "Valid for".dimmed(), credentials.expires_in().as_secs());
    if args.show_token {
        println!("{}", credentials.access_token);
    }

    Ok(())
}
