//! Retryable HTTP calls with exponential backoff
//!
//! Transient failures (network errors and any failure status outside the
//! non-retryable list) are retried; everything else is handed straight back.

use crate::api::constants::headers;
use log::{debug, info, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Failure statuses that are never retried
pub const NON_RETRYABLE_STATUS_CODES: &[u16] = &[400, 401, 402, 403, 404, 405, 406, 409, 410, 412, 413, 415, 422, 501];

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Conservative config for production
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 1.5,
            jitter: true,
        }
    }

    /// Aggressive config for development/testing
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.5,
            jitter: true,
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Types of failures and their retry behavior
#[derive(Debug, Clone, PartialEq)]
pub enum RetryableError {
    /// Network-level errors (connection refused, DNS, reset)
    Network,
    /// Request or response timed out
    Timeout,
    /// HTTP 429 Too Many Requests
    RateLimited,
    /// Failure status outside the non-retryable list
    Transient(u16),
    /// Status in the non-retryable list
    Permanent(u16),
    /// Errors that cannot improve by retrying (body, decode, builder)
    Unknown,
}

impl RetryableError {
    pub fn should_retry(&self) -> bool {
        match self {
            RetryableError::Network => true,
            RetryableError::Timeout => true,
            RetryableError::RateLimited => true,
            RetryableError::Transient(_) => true,
            RetryableError::Permanent(_) => false,
            RetryableError::Unknown => false,
        }
    }

    /// Classify a failure status. Success statuses yield `None`.
    pub fn from_status_code(status: u16) -> Option<Self> {
        if (100..400).contains(&status) {
            return None;
        }

        Some(match status {
            408 => RetryableError::Timeout,
            429 => RetryableError::RateLimited,
            s if NON_RETRYABLE_STATUS_CODES.contains(&s) => RetryableError::Permanent(s),
            s => RetryableError::Transient(s),
        })
    }

    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            RetryableError::Timeout
        } else if error.is_connect() || error.is_request() {
            RetryableError::Network
        } else if let Some(status) = error.status() {
            Self::from_status_code(status.as_u16()).unwrap_or(RetryableError::Unknown)
        } else {
            RetryableError::Unknown
        }
    }
}

/// Runs an HTTP call, retrying transient failures with exponential backoff and jitter
#[derive(Debug, Clone)]
pub struct RetryableHttpCall {
    config: RetryConfig,
}

impl RetryableHttpCall {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `send` until it yields a response worth returning.
    ///
    /// The closure receives the 1-based attempt number. The last response is
    /// returned once attempts run out, so callers can still report its status.
    pub async fn execute<F, Fut>(&self, mut send: F) -> Result<reqwest::Response, reqwest::Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("Executing request (attempt {}/{})", attempt, max_attempts);

            let delay = match send(attempt).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let classification = RetryableError::from_status_code(status);

                    let retryable = classification.as_ref().is_some_and(RetryableError::should_retry);
                    if !retryable || attempt >= max_attempts {
                        if attempt > 1 && classification.is_none() {
                            info!("Request succeeded after {} attempts", attempt);
                        } else if retryable {
                            warn!("Request still failing with status {} after {} attempts", status, attempt);
                        }
                        return Ok(response);
                    }

                    warn!("Request failed on attempt {} with retryable status {}", attempt, status);
                    retry_after(&response)
                        .map(|d| d.min(self.config.max_delay))
                        .unwrap_or_else(|| self.calculate_delay(attempt))
                }
                Err(error) => {
                    let should_retry = RetryableError::from_reqwest_error(&error).should_retry();

                    if !should_retry || attempt >= max_attempts {
                        warn!(
                            "Request failed permanently on attempt {} (should_retry: {}): {}",
                            attempt, should_retry, error
                        );
                        return Err(error);
                    }

                    warn!("Request failed on attempt {} (retryable): {}", attempt, error);
                    self.calculate_delay(attempt)
                }
            };

            debug!("Waiting {:?} before retry", delay);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Calculate exponential backoff delay with optional jitter
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.config.base_delay.as_millis() as f64)
            * self.config.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let mut delay = Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64);

        // Spread retries out so clients don't hammer the service in lockstep
        if self.config.jitter {
            let jitter_factor = rand::rng().random_range(0.5..=1.5);
            let jittered_ms = (delay.as_millis() as f64 * jitter_factor) as u64;
            delay = Duration::from_millis(jittered_ms);
        }

        // max_delay bounds the jittered wait too
        delay.min(self.config.max_delay)
    }
}

impl Default for RetryableHttpCall {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Numeric `Retry-After` header, in seconds
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    let value = response.headers().get(headers::RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_error_classification() {
        assert!(RetryableError::Network.should_retry());
        assert!(RetryableError::Timeout.should_retry());
        assert!(RetryableError::RateLimited.should_retry());
        assert!(RetryableError::Transient(503).should_retry());

        assert!(!RetryableError::Permanent(400).should_retry());
        assert!(!RetryableError::Unknown.should_retry());
    }

    #[test]
    fn test_status_code_classification() {
        assert_eq!(RetryableError::from_status_code(200), None);
        assert_eq!(RetryableError::from_status_code(204), None);
        assert_eq!(RetryableError::from_status_code(304), None);
        assert_eq!(RetryableError::from_status_code(408), Some(RetryableError::Timeout));
        assert_eq!(RetryableError::from_status_code(429), Some(RetryableError::RateLimited));
        assert_eq!(RetryableError::from_status_code(500), Some(RetryableError::Transient(500)));
        assert_eq!(RetryableError::from_status_code(503), Some(RetryableError::Transient(503)));

        for status in NON_RETRYABLE_STATUS_CODES {
            assert_eq!(
                RetryableError::from_status_code(*status),
                Some(RetryableError::Permanent(*status))
            );
        }
    }

    #[test]
    fn test_delay_calculation() {
        let policy = RetryableHttpCall::new(RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: false,
        });

        assert_eq!(policy.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryableHttpCall::new(RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: false,
        });

        assert_eq!(policy.calculate_delay(5), Duration::from_secs(5));
        assert_eq!(policy.calculate_delay(10), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryableHttpCall::new(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        });

        for _ in 0..50 {
            let delay = policy.calculate_delay(1);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_jitter_never_exceeds_max_delay() {
        let policy = RetryableHttpCall::new(RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        });

        for attempt in 1..=6 {
            for _ in 0..20 {
                assert!(policy.calculate_delay(attempt) <= Duration::from_secs(2));
            }
        }
    }

    #[tokio::test]
    async fn test_non_retryable_transport_error_is_returned_once() {
        let policy = RetryableHttpCall::new(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        });

        let mut attempts = 0;
        // A relative URL fails in the builder, which is not retryable
        let result = policy
            .execute(|_| {
                attempts += 1;
                reqwest::Client::new().get("not-a-url").send()
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
