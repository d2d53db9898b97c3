use crate::api::auth::{AadTokenProvider, CredentialSet};
use crate::api::constants::{API_VERSION, DEFAULT_AUTHORITY, DEFAULT_ENDPOINT, DEFAULT_LOCALE, DEFAULT_RESOURCE};
use crate::api::resilience::{ResilienceConfig, RetryConfig};
use anyhow::{Context, Result};
use log::{debug, info};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the environment variables that override the config file
pub const ENV_PREFIX: &str = "PARTNER_CENTER_";

/// Settings for talking to the partner service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartnerServiceConfiguration {
    pub endpoint: String,
    pub api_version: String,
    pub locale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub request_logging: bool,
    pub retry: RetrySettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

/// Azure AD credentials used to acquire partner tokens
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub tenant_id: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub authority: String,
    pub resource: String,
}

impl Default for PartnerServiceConfiguration {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_version: API_VERSION.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            application_name: None,
            timeout_secs: 60,
            connect_timeout_secs: 10,
            request_logging: true,
            retry: RetrySettings::default(),
            credentials: None,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            base_delay_ms: retry.base_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            backoff_multiplier: retry.backoff_multiplier,
            jitter: retry.jitter,
        }
    }
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: None,
            username: None,
            password: None,
            authority: DEFAULT_AUTHORITY.to_string(),
            resource: DEFAULT_RESOURCE.to_string(),
        }
    }
}

impl fmt::Debug for CredentialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSettings")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("authority", &self.authority)
            .field("resource", &self.resource)
            .finish()
    }
}

impl CredentialSettings {
    /// Pick the grant: username/password when both are present, client secret otherwise
    pub fn to_credential_set(&self) -> Result<CredentialSet> {
        if self.tenant_id.trim().is_empty() || self.client_id.trim().is_empty() {
            anyhow::bail!("Credentials need both tenant_id and client_id");
        }

        match (&self.username, &self.password, &self.client_secret) {
            (Some(username), Some(password), _) => Ok(CredentialSet::UsernamePassword {
                tenant_id: self.tenant_id.clone(),
                client_id: self.client_id.clone(),
                username: username.clone(),
                password: password.clone(),
            }),
            (_, _, Some(client_secret)) => Ok(CredentialSet::ClientCredentials {
                tenant_id: self.tenant_id.clone(),
                client_id: self.client_id.clone(),
                client_secret: client_secret.clone(),
            }),
            _ => anyhow::bail!("Credentials need either client_secret or username and password"),
        }
    }
}

impl PartnerServiceConfiguration {
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "linux") {
            // Use XDG config directory on Linux
            dirs::config_dir()
                .context("Failed to get XDG config directory")?
                .join("partner-center")
        } else {
            // Use home directory with dot prefix on Windows/Mac
            dirs::home_dir()
                .context("Failed to get home directory")?
                .join(".partner-center")
        };

        Ok(config_dir)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.toml"))
    }

    /// Load the config file (explicit path or the default location), apply
    /// environment overrides and validate the result
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::get_config_path()?,
        };

        let mut config = Self::load_from(&path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from: {:?}", path);

        if !path.exists() {
            info!("Config file doesn't exist, using default config");
            return Ok(Self::default());
        }

        let config_content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Self =
            toml::from_str(&config_content).with_context(|| format!("Failed to parse config file: {:?}", path))?;

        debug!("Loaded config for endpoint {}", config.endpoint);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        debug!("Saving config to: {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
                info!("Created config directory: {:?}", parent);
            }
        }

        let config_content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(path, config_content).with_context(|| format!("Failed to write config file: {:?}", path))?;

        info!("Config saved successfully");
        Ok(())
    }

    /// Override settings from `PARTNER_CENTER_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix)).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = var("ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(api_version) = var("API_VERSION") {
            self.api_version = api_version;
        }
        if let Some(locale) = var("LOCALE") {
            self.locale = locale;
        }
        if let Some(application_name) = var("APPLICATION_NAME") {
            self.application_name = Some(application_name);
        }

        let tenant_id = var("TENANT_ID");
        let client_id = var("CLIENT_ID");
        let client_secret = var("CLIENT_SECRET");
        let username = var("USERNAME");
        let password = var("PASSWORD");

        let any_set = [&tenant_id, &client_id, &client_secret, &username, &password]
            .iter()
            .any(|v| v.is_some());
        if !any_set {
            return;
        }

        debug!("Applying credential overrides from environment");
        let credentials = self.credentials.get_or_insert_with(CredentialSettings::default);
        if let Some(tenant_id) = tenant_id {
            credentials.tenant_id = tenant_id;
        }
        if let Some(client_id) = client_id {
            credentials.client_id = client_id;
        }
        if client_secret.is_some() {
            credentials.client_secret = client_secret;
        }
        if username.is_some() {
            credentials.username = username;
        }
        if password.is_some() {
            credentials.password = password;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint =
            Url::parse(&self.endpoint).with_context(|| format!("Invalid endpoint URL: {}", self.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("Endpoint must use http or https, got '{}'", endpoint.scheme());
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }
        if !(self.retry.backoff_multiplier.is_finite() && self.retry.backoff_multiplier >= 1.0) {
            anyhow::bail!("retry.backoff_multiplier must be a finite number of at least 1.0");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            anyhow::bail!("retry.base_delay_ms must not exceed retry.max_delay_ms");
        }
        Ok(())
    }

    pub fn resilience(&self) -> ResilienceConfig {
        ResilienceConfig {
            retry: RetryConfig {
                max_attempts: self.retry.max_attempts,
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
                max_delay: Duration::from_millis(self.retry.max_delay_ms),
                backoff_multiplier: self.retry.backoff_multiplier,
                jitter: self.retry.jitter,
            },
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_logging: self.request_logging,
        }
    }

    pub fn credential_set(&self) -> Result<Option<CredentialSet>> {
        self.credentials.as_ref().map(CredentialSettings::to_credential_set).transpose()
    }

    /// Token provider for the configured credentials, if any
    pub fn token_provider(&self) -> Result<Option<AadTokenProvider>> {
        let Some(settings) = &self.credentials else {
            return Ok(None);
        };

        let provider = AadTokenProvider::new(settings.to_credential_set()?)
            .with_authority(settings.authority.clone())
            .with_resource(settings.resource.clone());
        Ok(Some(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PartnerServiceConfiguration::default();
        assert_eq!(config.endpoint, "https://api.partnercenter.microsoft.com");
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.locale, "en-US");
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: PartnerServiceConfiguration = toml::from_str(
            r#"
            endpoint = "https://partner.example.com"
            application_name = "Contoso Portal"

            [retry]
            max_attempts = 5
            jitter = false

            [credentials]
            tenant_id = "contoso.onmicrosoft.com"
            client_id = "app-id"
            client_secret = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint, "https://partner.example.com");
        assert_eq!(config.application_name.as_deref(), Some("Contoso Portal"));
        assert_eq!(config.locale, "en-US");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert!(!config.retry.jitter);

        let credentials = config.credentials.as_ref().unwrap();
        assert_eq!(credentials.authority, "https://login.microsoftonline.com");
        assert!(matches!(
            config.credential_set().unwrap(),
            Some(CredentialSet::ClientCredentials { .. })
        ));
    }

    #[test]
    fn test_resilience_mapping() {
        let mut config = PartnerServiceConfiguration::default();
        config.retry.base_delay_ms = 250;
        config.timeout_secs = 15;
        config.request_logging = false;

        let resilience = config.resilience();
        assert_eq!(resilience.retry.base_delay, Duration::from_millis(250));
        assert_eq!(resilience.timeout, Duration::from_secs(15));
        assert!(!resilience.request_logging);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PartnerServiceConfiguration::default();
        config.apply_env_from(lookup(&[
            ("PARTNER_CENTER_ENDPOINT", "https://sandbox.example.com"),
            ("PARTNER_CENTER_LOCALE", "ja-JP"),
            ("PARTNER_CENTER_TENANT_ID", "tenant"),
            ("PARTNER_CENTER_CLIENT_ID", "client"),
            ("PARTNER_CENTER_USERNAME", "admin@contoso.com"),
            ("PARTNER_CENTER_PASSWORD", "pw"),
            ("PARTNER_CENTER_APPLICATION_NAME", ""),
        ]));

        assert_eq!(config.endpoint, "https://sandbox.example.com");
        assert_eq!(config.locale, "ja-JP");
        assert!(config.application_name.is_none());
        assert!(matches!(
            config.credential_set().unwrap(),
            Some(CredentialSet::UsernamePassword { .. })
        ));
    }

    #[test]
    fn test_no_env_leaves_credentials_unset() {
        let mut config = PartnerServiceConfiguration::default();
        config.apply_env_from(lookup(&[]));
        assert!(config.credentials.is_none());
        assert!(config.token_provider().unwrap().is_none());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = PartnerServiceConfiguration::default();
        config.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = PartnerServiceConfiguration::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = PartnerServiceConfiguration::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = PartnerServiceConfiguration::default();
        config.retry.backoff_multiplier = f64::NAN;
        assert!(config.validate().is_err());

        let config: PartnerServiceConfiguration = toml::from_str("[retry]\nbackoff_multiplier = inf\n").unwrap();
        assert!(config.validate().is_err());

        let mut config = PartnerServiceConfiguration::default();
        config.retry.base_delay_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_incomplete_credentials() {
        let settings = CredentialSettings {
            tenant_id: "tenant".into(),
            client_id: "client".into(),
            ..Default::default()
        };
        assert!(settings.to_credential_set().is_err());

        let settings = CredentialSettings {
            client_secret: Some("secret".into()),
            ..Default::default()
        };
        assert!(settings.to_credential_set().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("partner-center-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let mut config = PartnerServiceConfiguration::default();
        config.application_name = Some("Round Trip".to_string());
        config.credentials = Some(CredentialSettings {
            tenant_id: "tenant".into(),
            client_id: "client".into(),
            client_secret: Some("secret".into()),
            ..Default::default()
        });

        config.save_to(&path).unwrap();
        let loaded = PartnerServiceConfiguration::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!("partner-center-missing-{}.toml", uuid::Uuid::new_v4()));
        let config = PartnerServiceConfiguration::load_from(&path).unwrap();
        assert_eq!(config, PartnerServiceConfiguration::default());
    }
}
