//! Partner service proxy
//!
//! Every SDK call is funnelled through [`PartnerServiceProxy`]: credentials are
//! checked (and refreshed when expired), the URI is built from the resource path,
//! headers are injected, the verb is sent through the retryable call, and the
//! response is either deserialized or wrapped into a [`PartnerError`].

use super::auth::{CredentialStore, PartnerCredentials, TokenRefresher};
use super::constants::{self, headers};
use super::context::RequestContext;
use super::error::{PartnerError, PartnerErrorCategory, PartnerResult};
use super::headers::HeaderInjector;
use super::json;
use super::resilience::{ResilienceConfig, RetryableHttpCall};
use crate::config::PartnerServiceConfiguration;
use log::{debug, warn};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Longest slice of a non-JSON error body kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 512;

/// HTTP proxy used by every partner service operation
#[derive(Clone)]
pub struct PartnerServiceProxy {
    endpoint: String,
    api_version: String,
    http_client: reqwest::Client,
    credentials: CredentialStore,
    refresher: Option<Arc<dyn TokenRefresher>>,
    context: RequestContext,
    headers: HeaderInjector,
    retry: RetryableHttpCall,
    request_logging: bool,
}

/// Raw outcome of one proxied call, before status handling
struct CallOutcome {
    method: Method,
    uri: Url,
    status: StatusCode,
    body: Vec<u8>,
    request_id: Uuid,
    correlation_id: Uuid,
}

impl CallOutcome {
    fn into_body(self) -> PartnerResult<Vec<u8>> {
        if self.status.is_success() {
            Ok(self.body)
        } else {
            Err(self.into_error())
        }
    }

    fn into_error(self) -> PartnerError {
        let status = self.status.as_u16();
        let fault = json::parse_fault(&self.body);

        let message = fault
            .as_ref()
            .and_then(|f| f.description.clone())
            .or_else(|| {
                let text = String::from_utf8_lossy(&self.body);
                let text = text.trim();
                (!text.is_empty()).then(|| text.chars().take(MAX_ERROR_BODY_CHARS).collect())
            })
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or("Unknown error").to_string());

        PartnerError::Service {
            category: PartnerErrorCategory::from_status(status),
            status,
            method: self.method.to_string(),
            uri: self.uri.to_string(),
            fault,
            message,
            request_id: self.request_id,
            correlation_id: self.correlation_id,
        }
    }
}

impl PartnerServiceProxy {
    pub fn new(config: &PartnerServiceConfiguration, credentials: CredentialStore) -> PartnerResult<Self> {
        config
            .validate()
            .map_err(|e| PartnerError::Configuration(format!("{:#}", e)))?;

        let resilience = config.resilience();
        let http_client = Self::build_http_client(&resilience)?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_version: config.api_version.clone(),
            http_client,
            credentials,
            refresher: None,
            context: RequestContext::new().with_locale(config.locale.clone()),
            headers: HeaderInjector::new(config.application_name.clone(), config.api_version.clone()),
            retry: RetryableHttpCall::new(resilience.retry),
            request_logging: resilience.request_logging,
        })
    }

    fn build_http_client(resilience: &ResilienceConfig) -> PartnerResult<reqwest::Client> {
        reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(resilience.timeout)
            .connect_timeout(resilience.connect_timeout)
            .user_agent(format!("partner-center-rust/{}", constants::sdk_version()))
            .build()
            .map_err(|e| PartnerError::Configuration(format!("Failed to build HTTP client: {}", e)))
    }

    /// Register the callback used when credentials expire or are rejected
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Replace the HTTP client, e.g. to share a connection pool
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Override the resilience settings taken from the configuration
    pub fn with_resilience(mut self, resilience: &ResilienceConfig) -> PartnerResult<Self> {
        self.http_client = Self::build_http_client(resilience)?;
        self.retry = RetryableHttpCall::new(resilience.retry.clone());
        self.request_logging = resilience.request_logging;
        Ok(self)
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: &str, value: &str) -> PartnerResult<Self> {
        self.headers = self.headers.with_header(name, value)?;
        Ok(self)
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Full URI a resource path resolves to
    pub fn uri(&self, path: &str, query: &[(&str, &str)]) -> PartnerResult<Url> {
        constants::build_uri(&self.endpoint, &self.api_version, path, query)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> PartnerResult<T> {
        self.send::<(), T>(Method::GET, path, query, None).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> PartnerResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> PartnerResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> PartnerResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::PATCH, path, &[], Some(body)).await
    }

    /// Delete a resource; any response body is ignored
    pub async fn delete(&self, path: &str) -> PartnerResult<()> {
        let uri = self.uri(path, &[])?;
        self.dispatch(Method::DELETE, uri, None).await?.into_body()?;
        Ok(())
    }

    /// Check whether a resource exists. `404` yields `false`.
    pub async fn head(&self, path: &str) -> PartnerResult<bool> {
        let uri = self.uri(path, &[])?;
        let outcome = self.dispatch(Method::HEAD, uri, None).await?;

        if outcome.status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        outcome.into_body()?;
        Ok(true)
    }

    /// Send any verb with an optional JSON body and decode the JSON response
    pub async fn send<B, T>(&self, method: Method, path: &str, query: &[(&str, &str)], body: Option<&B>) -> PartnerResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let uri = self.uri(path, query)?;
        let body = body.map(json::to_body).transpose()?;
        let outcome = self.dispatch(method, uri, body).await?;

        let uri = outcome.uri.to_string();
        let body = outcome.into_body()?;
        json::from_body(&uri, &body)
    }

    async fn dispatch(&self, method: Method, uri: Url, body: Option<Vec<u8>>) -> PartnerResult<CallOutcome> {
        let mut credentials = self.credentials.ensure_fresh(self.refresher.as_deref()).await?;
        let request_id = self.context.request_id_for_call();
        let correlation_id = self.context.correlation_id;
        let started = Instant::now();
        let mut replayed = false;

        loop {
            let response = self
                .retry
                .execute(|_attempt| self.build_request(&method, &uri, body.as_deref(), &credentials, request_id).send())
                .await
                .map_err(|source| {
                    warn!(
                        "{} {} failed after {:?} (request {}, correlation {}): {}",
                        method,
                        uri,
                        started.elapsed(),
                        request_id,
                        correlation_id,
                        source
                    );
                    PartnerError::Transport {
                        method: method.to_string(),
                        uri: uri.to_string(),
                        timed_out: source.is_timeout(),
                        source,
                    }
                })?;

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !replayed {
                if let Some(refresher) = self.refresher.as_deref() {
                    warn!(
                        "{} {} rejected the partner credentials, refreshing and replaying (request {})",
                        method, uri, request_id
                    );
                    credentials = self.credentials.force_refresh(refresher, &credentials.access_token).await?;
                    replayed = true;
                    continue;
                }
            }

            let body = response.bytes().await.map_err(|source| PartnerError::Transport {
                method: method.to_string(),
                uri: uri.to_string(),
                timed_out: source.is_timeout(),
                source,
            })?;

            if self.request_logging {
                debug!(
                    "{} {} -> {} in {:?} (request {}, correlation {})",
                    method,
                    uri,
                    status.as_u16(),
                    started.elapsed(),
                    request_id,
                    correlation_id
                );
            }
            if !status.is_success() {
                warn!("{} {} returned {} (request {})", method, uri, status.as_u16(), request_id);
            }

            return Ok(CallOutcome {
                method,
                uri,
                status,
                body: body.to_vec(),
                request_id,
                correlation_id,
            });
        }
    }

    fn build_request(
        &self,
        method: &Method,
        uri: &Url,
        body: Option<&[u8]>,
        credentials: &PartnerCredentials,
        request_id: Uuid,
    ) -> reqwest::RequestBuilder {
        let builder = self.http_client.request(method.clone(), uri.clone());
        let builder = self.headers.inject(builder, credentials, &self.context, request_id);

        match body {
            Some(body) => builder
                .header(headers::CONTENT_TYPE, headers::CONTENT_TYPE_JSON)
                .body(body.to_vec()),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiFault;

    fn proxy() -> PartnerServiceProxy {
        let config = PartnerServiceConfiguration {
            endpoint: "https://api.example.com".to_string(),
            ..Default::default()
        };
        let credentials = CredentialStore::new(PartnerCredentials::expiring_in("t", Duration::from_secs(3600)));
        PartnerServiceProxy::new(&config, credentials).unwrap()
    }

    fn outcome(status: u16, body: &[u8]) -> CallOutcome {
        CallOutcome {
            method: Method::GET,
            uri: Url::parse("https://api.example.com/v1/customers").unwrap(),
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_vec(),
            request_id: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_uri_uses_configured_version() {
        let uri = proxy().uri("customers/c-1/orders", &[("size", "5")]).unwrap();
        assert_eq!(uri.as_str(), "https://api.example.com/v1/customers/c-1/orders?size=5");
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        let config = PartnerServiceConfiguration {
            endpoint: "ftp://api.example.com".to_string(),
            ..Default::default()
        };
        let credentials = CredentialStore::new(PartnerCredentials::expiring_in("t", Duration::from_secs(3600)));
        let result = PartnerServiceProxy::new(&config, credentials);
        assert!(matches!(result, Err(PartnerError::Configuration(_))));
    }

    #[test]
    fn test_outcome_error_uses_fault_description() {
        let error = outcome(404, br#"{"code":600008,"description":"Customer not found"}"#)
            .into_body()
            .unwrap_err();

        assert_eq!(error.category(), PartnerErrorCategory::NotFound);
        assert_eq!(error.status(), Some(404));
        assert_eq!(
            error.fault(),
            Some(&ApiFault {
                code: Some("600008".to_string()),
                description: Some("Customer not found".to_string()),
                ..Default::default()
            })
        );
        assert!(error.to_string().contains("Customer not found"));
    }

    #[test]
    fn test_outcome_error_falls_back_to_body_then_reason() {
        let error = outcome(502, b"upstream unavailable").into_body().unwrap_err();
        assert!(error.fault().is_none());
        assert!(error.to_string().contains("upstream unavailable"));

        let error = outcome(503, b"").into_body().unwrap_err();
        assert_eq!(error.category(), PartnerErrorCategory::ServerError);
        assert!(error.to_string().contains("Service Unavailable"));
    }

    #[test]
    fn test_long_error_body_is_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY_CHARS * 2);
        match outcome(500, body.as_bytes()).into_error() {
            PartnerError::Service { message, .. } => assert_eq!(message.len(), MAX_ERROR_BODY_CHARS),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
