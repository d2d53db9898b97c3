//! Resilience module for retrying transient failures
//!
//! Provides the retryable HTTP call used by the partner service proxy and the
//! configuration that drives it.

pub mod config;
pub mod retry;

pub use config::{ResilienceConfig, ResilienceConfigBuilder};
pub use retry::{NON_RETRYABLE_STATUS_CODES, RetryConfig, RetryableError, RetryableHttpCall};
