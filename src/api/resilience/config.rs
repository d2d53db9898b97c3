//! Resilience configuration with builder pattern
//!
//! Bundles retry behavior, HTTP timeouts and request logging for a proxy.

use super::retry::RetryConfig;
use std::time::Duration;

/// Resilience settings applied to every call made through a proxy
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    /// Whole-request timeout, per attempt
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub request_logging: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            request_logging: true,
        }
    }
}

impl ResilienceConfig {
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Conservative config for production environments
    pub fn conservative() -> Self {
        Self {
            retry: RetryConfig::conservative(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            request_logging: true,
        }
    }

    /// Aggressive config for development/testing
    pub fn development() -> Self {
        Self {
            retry: RetryConfig::aggressive(),
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            request_logging: true,
        }
    }

    /// Disable retries and request logging (for testing)
    pub fn disabled() -> Self {
        Self {
            retry: RetryConfig::none(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            request_logging: false,
        }
    }
}

/// Builder for ResilienceConfig
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set total attempts, including the first
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.retry.max_delay = delay;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.retry.jitter = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.config.request_logging = enabled;
        self
    }

    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
