//! Partner credentials, expiry tracking and token refresh

use super::constants::{DEFAULT_AUTHORITY, DEFAULT_RESOURCE};
use super::error::{PartnerError, PartnerResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Credentials are treated as expired this long before their actual expiry
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// Access token used to authorize calls to the partner service
#[derive(Clone, PartialEq, Eq)]
pub struct PartnerCredentials {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl PartnerCredentials {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Credentials that expire `lifetime` from now
    pub fn expiring_in(access_token: impl Into<String>, lifetime: Duration) -> Self {
        let lifetime = TimeDelta::from_std(lifetime).unwrap_or_else(|_| TimeDelta::days(365 * 100));
        Self::new(access_token, Utc::now() + lifetime)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() + TimeDelta::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }

    /// Remaining lifetime, zero once expired
    pub fn expires_in(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Debug for PartnerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartnerCredentials")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Async callback invoked when the current credentials have expired
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, expired: &PartnerCredentials) -> anyhow::Result<PartnerCredentials>;
}

type RefreshFuture = Pin<Box<dyn Future<Output = anyhow::Result<PartnerCredentials>> + Send>>;

/// Adapts an async closure into a [`TokenRefresher`]
pub struct RefreshFn {
    callback: Box<dyn Fn(PartnerCredentials) -> RefreshFuture + Send + Sync>,
}

impl RefreshFn {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(PartnerCredentials) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<PartnerCredentials>> + Send + 'static,
    {
        Self {
            callback: Box::new(move |expired| Box::pin(callback(expired))),
        }
    }
}

#[async_trait]
impl TokenRefresher for RefreshFn {
    async fn refresh(&self, expired: &PartnerCredentials) -> anyhow::Result<PartnerCredentials> {
        (self.callback)(expired.clone()).await
    }
}

/// Shared holder of the credentials used by one or more proxies
#[derive(Clone)]
pub struct CredentialStore {
    current: Arc<RwLock<PartnerCredentials>>,
    refresh_lock: Arc<Mutex<()>>,
}

impl CredentialStore {
    pub fn new(credentials: PartnerCredentials) -> Self {
        Self {
            current: Arc::new(RwLock::new(credentials)),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn current(&self) -> PartnerCredentials {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, credentials: PartnerCredentials) {
        *self.current.write().await = credentials;
    }

    /// Return valid credentials, refreshing them first if they have expired
    pub async fn ensure_fresh(&self, refresher: Option<&dyn TokenRefresher>) -> PartnerResult<PartnerCredentials> {
        let current = self.current().await;
        if !current.is_expired() {
            return Ok(current);
        }

        let Some(refresher) = refresher else {
            warn!("Partner credentials expired at {} and no refresher is registered", current.expires_at);
            return Err(PartnerError::CredentialsExpired);
        };

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        let current = self.current().await;
        if !current.is_expired() {
            debug!("Credentials already refreshed by a concurrent call");
            return Ok(current);
        }

        self.refresh_with(refresher, &current).await
    }

    /// Refresh even though the credentials look valid, e.g. after the service rejected them.
    /// `rejected_token` is the token the service refused.
    pub async fn force_refresh(
        &self,
        refresher: &dyn TokenRefresher,
        rejected_token: &str,
    ) -> PartnerResult<PartnerCredentials> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.current().await;
        if current.access_token != rejected_token && !current.is_expired() {
            debug!("Rejected token was already replaced by a concurrent call");
            return Ok(current);
        }

        self.refresh_with(refresher, &current).await
    }

    async fn refresh_with(
        &self,
        refresher: &dyn TokenRefresher,
        current: &PartnerCredentials,
    ) -> PartnerResult<PartnerCredentials> {
        info!("Refreshing partner credentials (expired at {})", current.expires_at);

        let refreshed = refresher.refresh(current).await.map_err(PartnerError::refresh_failed)?;

        if refreshed.is_expired() {
            warn!("Refresher returned credentials that are already expired ({})", refreshed.expires_at);
            return Err(PartnerError::CredentialsExpired);
        }

        *self.current.write().await = refreshed.clone();
        info!("Partner credentials refreshed, valid until {}", refreshed.expires_at);
        Ok(refreshed)
    }
}

/// Set of credentials used to obtain tokens from Azure AD
#[derive(Clone)]
pub enum CredentialSet {
    /// App-only authentication
    ClientCredentials {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// App + user authentication
    UsernamePassword {
        tenant_id: String,
        client_id: String,
        username: String,
        password: String,
    },
}

impl CredentialSet {
    pub fn tenant_id(&self) -> &str {
        match self {
            Self::ClientCredentials { tenant_id, .. } | Self::UsernamePassword { tenant_id, .. } => tenant_id,
        }
    }

    fn form(&self, resource: &str) -> Vec<(&'static str, String)> {
        match self {
            Self::ClientCredentials {
                client_id,
                client_secret,
                ..
            } => vec![
                ("grant_type", "client_credentials".to_string()),
                ("client_id", client_id.clone()),
                ("client_secret", client_secret.clone()),
                ("resource", resource.to_string()),
            ],
            Self::UsernamePassword {
                client_id,
                username,
                password,
                ..
            } => vec![
                ("grant_type", "password".to_string()),
                ("client_id", client_id.clone()),
                ("username", username.clone()),
                ("password", password.clone()),
                ("resource", resource.to_string()),
            ],
        }
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientCredentials { tenant_id, client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Self::UsernamePassword {
                tenant_id,
                client_id,
                username,
                ..
            } => f
                .debug_struct("UsernamePassword")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

/// Obtains partner credentials from the Azure AD token endpoint
#[derive(Clone)]
pub struct AadTokenProvider {
    authority: String,
    resource: String,
    credentials: CredentialSet,
    http_client: reqwest::Client,
}

impl AadTokenProvider {
    pub fn new(credentials: CredentialSet) -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            resource: DEFAULT_RESOURCE.to_string(),
            credentials,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/token",
            self.authority.trim_end_matches('/'),
            self.credentials.tenant_id()
        )
    }

    pub async fn acquire_token(&self) -> anyhow::Result<PartnerCredentials> {
        let token_url = self.token_url();
        info!("Acquiring partner token from {} for resource {}", token_url, self.resource);

        let response = self
            .http_client
            .post(&token_url)
            .form(&self.credentials.form(&self.resource))
            .send()
            .await?;

        debug!("Token request status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Token request failed with status {}: {}", status, error_text);
        }

        let token_data: Value = response.json().await?;

        let access_token = token_data
            .get("access_token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow::anyhow!("No access token in response"))?;

        // The v1 endpoint reports expires_in as a string
        let expires_in = token_data
            .get("expires_in")
            .and_then(|e| e.as_u64().or_else(|| e.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(3600);

        let credentials = PartnerCredentials::expiring_in(access_token, Duration::from_secs(expires_in));
        info!("Acquired partner token valid until {}", credentials.expires_at);
        Ok(credentials)
    }
}

#[async_trait]
impl TokenRefresher for AadTokenProvider {
    async fn refresh(&self, _expired: &PartnerCredentials) -> anyhow::Result<PartnerCredentials> {
        self.acquire_token().await
    }
}
