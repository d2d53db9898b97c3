//! API Constants and URI construction for the Partner Center REST API

use super::error::{PartnerError, PartnerResult};
use reqwest::Url;

/// Partner Center REST API version
pub const API_VERSION: &str = "v1";

/// Default service endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.partnercenter.microsoft.com";

/// Default locale sent with every request
pub const DEFAULT_LOCALE: &str = "en-US";

/// Azure AD authority used for token acquisition
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Resource the access tokens are issued for
pub const DEFAULT_RESOURCE: &str = "https://api.partnercenter.microsoft.com";

/// Client name reported in the `MS-PartnerCenter-Client` header
pub const SDK_CLIENT_NAME: &str = "Partner Center Rust SDK";

/// Crate version reported alongside the client name
pub fn sdk_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Standard headers for Partner Center requests
pub mod headers {
    pub const ACCEPT: &str = "Accept";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const LOCALE: &str = "X-Locale";
    pub const REQUEST_ID: &str = "MS-RequestId";
    pub const CORRELATION_ID: &str = "MS-CorrelationId";
    pub const APPLICATION_NAME: &str = "MS-PartnerCenter-Application";
    pub const CLIENT_NAME: &str = "MS-PartnerCenter-Client";
    pub const CONTRACT_VERSION: &str = "MS-Contract-Version";
    pub const RETRY_AFTER: &str = "Retry-After";

    /// Content type for JSON requests and responses
    pub const CONTENT_TYPE_JSON: &str = "application/json";
}

/// Expand positional `{0}`, `{1}`, ... placeholders with path-encoded arguments
///
/// `expand_path_template("customers/{0}/orders/{1}", &["c-1", "o 2"])`
/// yields `customers/c-1/orders/o%202`.
pub fn expand_path_template(template: &str, args: &[&str]) -> PartnerResult<String> {
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        expanded.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            PartnerError::InvalidRequest(format!("Unterminated placeholder in path template '{}'", template))
        })?;

        let index: usize = after[..close].parse().map_err(|_| {
            PartnerError::InvalidRequest(format!(
                "Invalid placeholder '{{{}}}' in path template '{}'",
                &after[..close],
                template
            ))
        })?;

        let arg = args.get(index).ok_or_else(|| {
            PartnerError::InvalidRequest(format!(
                "Path template '{}' references argument {} but only {} were supplied",
                template,
                index,
                args.len()
            ))
        })?;

        expanded.push_str(&urlencoding::encode(arg));
        rest = &after[close + 1..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}

/// Build the full request URI for a resource path
///
/// Absolute `http(s)://` paths are links handed back by the service and are used
/// unchanged apart from the extra query pairs.
pub fn build_uri(endpoint: &str, api_version: &str, path: &str, query: &[(&str, &str)]) -> PartnerResult<Url> {
    let raw = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        let mut joined = endpoint.trim_end_matches('/').to_string();
        let version = api_version.trim_matches('/');
        if !version.is_empty() {
            joined.push('/');
            joined.push_str(version);
        }
        let path = path.trim_start_matches('/');
        if !path.is_empty() {
            joined.push('/');
            joined.push_str(path);
        }
        joined
    };

    let mut url = Url::parse(&raw)
        .map_err(|e| PartnerError::InvalidRequest(format!("Invalid request URI '{}': {}", raw, e)))?;

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    Ok(url)
}
