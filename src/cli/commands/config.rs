use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::*;
use partner_center::config::PartnerServiceConfiguration;

use crate::cli::Cli;
use crate::cli::session;

const REDACTED: &str = "<redacted>";

#[derive(Args)]
pub struct ConfigCommands {
    #[command(subcommand)]
    pub command: ConfigSubcommands,
}

#[derive(Subcommand)]
pub enum ConfigSubcommands {
    /// Show the effective configuration (file + environment), secrets redacted
    Show,
    /// Print the config file location
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config_command(cli: &Cli, args: &ConfigCommands) -> Result<()> {
    match &args.command {
        ConfigSubcommands::Show => {
            let config = redacted(session::load_config(cli)?);
            let rendered = toml::to_string_pretty(&config).context("Failed to serialize config to TOML")?;
            println!("{}", rendered);
        }
        ConfigSubcommands::Path => {
            println!("{}", session::config_path(cli)?.display());
        }
        ConfigSubcommands::Init { force } => {
            let path = session::config_path(cli)?;
            if path.exists() && !force {
                anyhow::bail!("Config file already exists at {} (use --force to overwrite)", path.display());
            }
            PartnerServiceConfiguration::default().save_to(&path)?;
            println!("{} Wrote default config to {}", "✓".bright_green(), path.display().to_string().cyan());
        }
    }
    Ok(())
}

fn redacted(mut config: PartnerServiceConfiguration) -> PartnerServiceConfiguration {
    if let Some(credentials) = config.credentials.as_mut() {
        if credentials.client_secret.is_some() {
            credentials.client_secret = Some(REDACTED.to_string());
        }
        if credentials.password.is_some() {
            credentials.password = Some(REDACTED.to_string());
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use partner_center::config::CredentialSettings;

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = PartnerServiceConfiguration::default();
        config.credentials = Some(CredentialSettings {
            tenant_id: "tenant".into(),
            client_id: "client".into(),
            client_secret: Some("hunter2".into()),
            ..Default::default()
        });

        let rendered = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains(REDACTED));
        assert!(rendered.contains("tenant"));
    }
}
