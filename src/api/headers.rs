//! Header injection for outgoing partner service requests

use super::auth::PartnerCredentials;
use super::constants::{self, headers};
use super::context::RequestContext;
use super::error::{PartnerError, PartnerResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

/// Stamps authorization and partner-context headers on every request
#[derive(Debug, Clone)]
pub struct HeaderInjector {
    application_name: Option<String>,
    api_version: String,
    extra: HeaderMap,
}

impl HeaderInjector {
    pub fn new(application_name: Option<String>, api_version: impl Into<String>) -> Self {
        Self {
            application_name: application_name.filter(|name| !name.trim().is_empty()),
            api_version: api_version.into(),
            extra: HeaderMap::new(),
        }
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: &str, value: &str) -> PartnerResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| PartnerError::InvalidRequest(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| PartnerError::InvalidRequest(format!("Invalid value for header '{}': {}", name, e)))?;
        self.extra.insert(name, value);
        Ok(self)
    }

    pub fn client_header_value() -> String {
        format!("{}/{}", constants::SDK_CLIENT_NAME, constants::sdk_version())
    }

    pub fn inject(
        &self,
        builder: reqwest::RequestBuilder,
        credentials: &PartnerCredentials,
        context: &RequestContext,
        request_id: Uuid,
    ) -> reqwest::RequestBuilder {
        let mut builder = builder
            .bearer_auth(&credentials.access_token)
            .header(headers::ACCEPT, headers::CONTENT_TYPE_JSON)
            .header(headers::REQUEST_ID, request_id.to_string())
            .header(headers::CORRELATION_ID, context.correlation_id.to_string())
            .header(headers::LOCALE, &context.locale)
            .header(headers::CLIENT_NAME, Self::client_header_value());

        if let Some(application_name) = &self.application_name {
            builder = builder.header(headers::APPLICATION_NAME, application_name);
        }

        if !self.api_version.is_empty() {
            builder = builder.header(headers::CONTRACT_VERSION, &self.api_version);
        }

        builder.headers(self.extra.clone())
    }
}
