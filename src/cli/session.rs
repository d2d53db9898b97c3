//! Builds the configured proxy for CLI commands

use anyhow::{Context, Result};
use log::info;
use partner_center::api::{CredentialStore, PartnerCredentials, PartnerServiceProxy, RequestContext};
use partner_center::config::{ENV_PREFIX, PartnerServiceConfiguration};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::Cli;

/// Assumed lifetime of a token passed in through the environment
const STATIC_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

pub fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => PartnerServiceConfiguration::get_config_path(),
    }
}

pub fn load_config(cli: &Cli) -> Result<PartnerServiceConfiguration> {
    let mut config = PartnerServiceConfiguration::load(cli.config.as_deref())?;
    if let Some(locale) = &cli.locale {
        config.locale = locale.clone();
    }
    Ok(config)
}

/// Connect with a static token from the environment, or acquire one with the
/// configured credentials and keep the provider around for refreshes
pub async fn connect(cli: &Cli) -> Result<PartnerServiceProxy> {
    let config = load_config(cli)?;

    let mut context = RequestContext::new().with_locale(config.locale.clone());
    if let Some(correlation_id) = cli.correlation_id {
        context = context.with_correlation_id(correlation_id);
    }

    let token_var = format!("{}ACCESS_TOKEN", ENV_PREFIX);
    if let Some(token) = std::env::var(&token_var).ok().filter(|t| !t.trim().is_empty()) {
        info!("Using access token from {}", token_var);
        let credentials = CredentialStore::new(PartnerCredentials::expiring_in(token, STATIC_TOKEN_LIFETIME));
        return Ok(PartnerServiceProxy::new(&config, credentials)?.with_context(context));
    }

    let provider = config.token_provider()?.with_context(|| {
        format!(
            "No credentials configured. Set {} or add a [credentials] section to the config file",
            token_var
        )
    })?;

    let credentials = provider
        .acquire_token()
        .await
        .context("Failed to acquire partner token")?;

    let proxy = PartnerServiceProxy::new(&config, CredentialStore::new(credentials))?
        .with_refresher(Arc::new(provider))
        .with_context(context);
    Ok(proxy)
}
