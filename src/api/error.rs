//! Uniform error type for every call made through the Partner Center proxy

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

pub type PartnerResult<T> = Result<T, PartnerError>;

/// Broad classification of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartnerErrorCategory {
    BadInput,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Timeout,
    ServerBusy,
    ServerError,
    InvalidResponse,
    Network,
    Unknown,
}

impl PartnerErrorCategory {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadInput,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            408 => Self::Timeout,
            409 => Self::Conflict,
            429 => Self::ServerBusy,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PartnerErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BadInput => "bad input",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::Timeout => "timeout",
            Self::ServerBusy => "server busy",
            Self::ServerError => "server error",
            Self::InvalidResponse => "invalid response",
            Self::Network => "network",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Error payload returned by the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFault {
    #[serde(default, deserialize_with = "string_or_number")]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum PartnerError {
    /// The service answered with a failure status
    #[error("{method} {uri} failed with status {status} ({category}): {message}")]
    Service {
        category: PartnerErrorCategory,
        status: u16,
        method: String,
        uri: String,
        fault: Option<ApiFault>,
        message: String,
        request_id: Uuid,
        correlation_id: Uuid,
    },

    /// The request never produced a response
    #[error("{method} {uri} failed: {source}")]
    Transport {
        method: String,
        uri: String,
        timed_out: bool,
        #[source]
        source: reqwest::Error,
    },

    #[error("Could not deserialize response from {uri}: {source}")]
    InvalidResponse {
        uri: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Partner credentials have expired and could not be refreshed")]
    CredentialsExpired,

    #[error("Credential refresh failed: {source}")]
    CredentialRefresh {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PartnerError {
    pub fn category(&self) -> PartnerErrorCategory {
        match self {
            Self::Service { category, .. } => *category,
            Self::Transport { timed_out: true, .. } => PartnerErrorCategory::Timeout,
            Self::Transport { .. } => PartnerErrorCategory::Network,
            Self::InvalidResponse { .. } => PartnerErrorCategory::InvalidResponse,
            Self::InvalidRequest(_) | Self::Configuration(_) => PartnerErrorCategory::BadInput,
            Self::CredentialsExpired | Self::CredentialRefresh { .. } => PartnerErrorCategory::Unauthorized,
        }
    }

    /// HTTP status of the failed call, when the service answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn fault(&self) -> Option<&ApiFault> {
        match self {
            Self::Service { fault, .. } => fault.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn refresh_failed(error: anyhow::Error) -> Self {
        Self::CredentialRefresh { source: error.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_from_status() {
        assert_eq!(PartnerErrorCategory::from_status(400), PartnerErrorCategory::BadInput);
        assert_eq!(PartnerErrorCategory::from_status(401), PartnerErrorCategory::Unauthorized);
        assert_eq!(PartnerErrorCategory::from_status(403), PartnerErrorCategory::Forbidden);
        assert_eq!(PartnerErrorCategory::from_status(404), PartnerErrorCategory::NotFound);
        assert_eq!(PartnerErrorCategory::from_status(408), PartnerErrorCategory::Timeout);
        assert_eq!(PartnerErrorCategory::from_status(409), PartnerErrorCategory::Conflict);
        assert_eq!(PartnerErrorCategory::from_status(429), PartnerErrorCategory::ServerBusy);
        assert_eq!(PartnerErrorCategory::from_status(503), PartnerErrorCategory::ServerError);
        assert_eq!(PartnerErrorCategory::from_status(418), PartnerErrorCategory::Unknown);
    }

    #[test]
    fn test_fault_accepts_numeric_code() {
        let fault: ApiFault = serde_json::from_value(json!({
            "code": 600008,
            "description": "The customer does not exist",
            "data": ["c-1"],
            "source": "PartnerFD"
        }))
        .unwrap();

        assert_eq!(fault.code.as_deref(), Some("600008"));
        assert_eq!(fault.description.as_deref(), Some("The customer does not exist"));
        assert_eq!(fault.data, vec!["c-1".to_string()]);
        assert_eq!(fault.source.as_deref(), Some("PartnerFD"));
    }

    #[test]
    fn test_fault_tolerates_missing_fields() {
        let fault: ApiFault = serde_json::from_value(json!({"code": "InvalidInput"})).unwrap();
        assert_eq!(fault.code.as_deref(), Some("InvalidInput"));
        assert!(fault.description.is_none());
        assert!(fault.data.is_empty());
    }

    #[test]
    fn test_service_error_accessors() {
        let error = PartnerError::Service {
            category: PartnerErrorCategory::NotFound,
            status: 404,
            method: "GET".to_string(),
            uri: "https://api.example.com/v1/customers/x".to_string(),
            fault: Some(ApiFault {
                code: Some("600008".to_string()),
                ..Default::default()
            }),
            message: "missing".to_string(),
            request_id: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
        };

        assert_eq!(error.category(), PartnerErrorCategory::NotFound);
        assert_eq!(error.status(), Some(404));
        assert_eq!(error.fault().and_then(|f| f.code.as_deref()), Some("600008"));
        assert!(error.to_string().contains("status 404"));
    }

    #[test]
    fn test_non_service_categories() {
        assert_eq!(PartnerError::CredentialsExpired.category(), PartnerErrorCategory::Unauthorized);
        assert_eq!(
            PartnerError::refresh_failed(anyhow::anyhow!("boom")).category(),
            PartnerErrorCategory::Unauthorized
        );
        assert_eq!(PartnerError::InvalidRequest("x".into()).status(), None);
    }
}
