//! Rate limiting for calls to the group API
//!
//! A token bucket keeps the request rate under the configured limit, and
//! `RetryHelper` retries transient failures with linear or exponential backoff.
//! Server-issued flood waits are honoured as long as they stay under the
//! configured ceiling.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

/// Request budget refilled continuously at `per_second`, holding at most one second's worth
#[derive(Debug)]
struct TokenBucket {
    available: f64,
    per_second: f64,
    refreshed: Instant,
}

impl TokenBucket {
    fn new(per_second: u32) -> Self {
        let per_second = f64::from(per_second);
        Self {
            available: per_second,
            per_second,
            refreshed: Instant::now(),
        }
    }

    /// Take one request from the bucket, or report how long until one is available
    fn take(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        let gained = now.duration_since(self.refreshed).as_secs_f64() * self.per_second;
        self.available = (self.available + gained).min(self.per_second);
        self.refreshed = now;

        if self.available >= 1.0 {
            self.available -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.available) / self.per_second))
        }
    }
}

/// Shared request throttle; `requests_per_second = 0` disables it
#[derive(Debug, Clone)]
pub struct Throttle {
    bucket: Option<Arc<Mutex<TokenBucket>>>,
}

impl Throttle {
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            bucket: (requests_per_second > 0)
                .then(|| Arc::new(Mutex::new(TokenBucket::new(requests_per_second)))),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.bucket.is_none()
    }

    /// Wait until the next request may be sent
    pub async fn wait(&self) {
        let Some(bucket) = &self.bucket else {
            return;
        };
        let mut bucket = bucket.lock().await;
        while let Err(delay) = bucket.take() {
            debug!("Throttled, next request in {:?}", delay);
            sleep(delay).await;
        }
    }
}

/// What the retry loop needs to know about a failure
pub trait RetryHint {
    /// Whether repeating the same call could succeed
    fn is_retryable(&self) -> bool;

    /// Wait demanded by the server before the next attempt, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Retry helper with configurable backoff
#[derive(Debug, Clone)]
pub struct RetryHelper {
    config: RateLimitConfig,
}

impl RetryHelper {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Execute an async operation, retrying retryable failures with backoff
    pub async fn with_retry<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: RetryHint + std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt > self.config.max_retries {
                        warn!(
                            "All {} retry attempts exhausted, giving up: {}",
                            self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    let delay = match e.retry_after() {
                        Some(wait) if wait > self.config.max_flood_wait() => {
                            warn!(
                                "Server asked to wait {:?}, longer than the allowed {:?}: {}",
                                wait,
                                self.config.max_flood_wait(),
                                e
                            );
                            return Err(e);
                        }
                        Some(wait) => wait,
                        None => self.config.calculate_backoff_delay(attempt),
                    };
                    debug!(
                        "Attempt {} failed ({}), retrying in {:?} with {:?} backoff",
                        attempt, e, delay, self.config.backoff_strategy
                    );

                    sleep(delay).await;
                }
            }
        }
    }
}

/// Throttle and retry policy for one API client
#[derive(Debug, Clone)]
pub struct RateLimitContext {
    pub throttle: Throttle,
    pub config: RateLimitConfig,
}

impl RateLimitContext {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            throttle: Throttle::new(config.requests_per_second),
            config: config.clone(),
        }
    }

    pub fn retry_helper(&self) -> RetryHelper {
        RetryHelper::new(&self.config)
    }

    pub fn log_config(&self) {
        let rate = if self.throttle.is_unlimited() {
            "unlimited".to_string()
        } else {
            format!("{} rps", self.config.requests_per_second)
        };

        debug!(
            "Gateway requests: {}, {:?} backoff, {} retries, flood waits up to {}s",
            rate,
            self.config.backoff_strategy,
            self.config.max_retries,
            self.config.max_flood_wait_secs
        );
    }
}
