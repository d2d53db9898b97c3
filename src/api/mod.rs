//! Partner Center REST API client core
//!
//! Every SDK operation issues its HTTP call through [`PartnerServiceProxy`],
//! which builds the request URI, injects partner headers, retries transient
//! failures, refreshes expired credentials and wraps failures in
//! [`PartnerError`].

pub mod auth;
pub mod constants;
pub mod context;
pub mod error;
pub mod headers;
pub mod json;
pub mod proxy;
pub mod resilience;

pub use auth::{AadTokenProvider, CredentialSet, CredentialStore, PartnerCredentials, RefreshFn, TokenRefresher};
pub use constants::{build_uri, expand_path_template};
pub use context::RequestContext;
pub use error::{ApiFault, PartnerError, PartnerErrorCategory, PartnerResult};
pub use headers::HeaderInjector;
pub use proxy::PartnerServiceProxy;
pub use resilience::{ResilienceConfig, RetryConfig, RetryableError, RetryableHttpCall};
