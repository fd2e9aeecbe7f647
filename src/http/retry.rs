//! Retry policy with exponential backoff and error-kind predicates.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::{ApiError, ConfigError};

/// Default number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default lower bound of the wait between attempts.
pub const DEFAULT_WAIT_MIN: Duration = Duration::from_secs(2);

/// Default upper bound of the wait between attempts.
pub const DEFAULT_WAIT_MAX: Duration = Duration::from_secs(10);

/// Decides whether a failed attempt may be retried.
pub type RetryPredicate = Arc<dyn Fn(&ApiError) -> bool + Send + Sync>;

/// The default predicate: network failures and 5xx responses.
pub fn default_retryable(error: &ApiError) -> bool {
    error.is_transient()
}

/// Bounded retries with deterministic exponential backoff.
///
/// The wait after failed attempt `n` (1-based) is
/// `multiplier * 2^(n-1)` seconds, clamped to `[wait_min, wait_max]`.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    wait_min: Duration,
    wait_max: Duration,
    multiplier: f64,
    predicate: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("wait_min", &self.wait_min)
            .field("wait_max", &self.wait_max)
            .field("multiplier", &self.multiplier)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_min: DEFAULT_WAIT_MIN,
            wait_max: DEFAULT_WAIT_MAX,
            multiplier: 1.0,
            predicate: Arc::new(default_retryable),
        }
    }
}

impl RetryPolicy {
    /// Starts from the defaults: 3 attempts, 2..10 s, multiplier 1.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Default policy with a different attempt count.
    pub fn with_attempts(max_attempts: u32) -> Result<Self, ConfigError> {
        Self::builder().max_attempts(max_attempts).build()
    }

    /// Attempts per call, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `(wait_min, wait_max)`.
    pub fn wait_bounds(&self) -> (Duration, Duration) {
        (self.wait_min, self.wait_max)
    }

    /// Seconds waited after the first failure, before clamping.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Whether `error` is eligible for another attempt.
    pub fn should_retry(&self, error: &ApiError) -> bool {
        (self.predicate)(error)
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based).
    ///
    /// Never exceeds `wait_max`, even when the bounds are beyond what float
    /// seconds can represent exactly.
    pub fn wait_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(62) as i32;
        let secs = self.multiplier * 2f64.powi(exponent);
        let min = self.wait_min.as_secs_f64();
        let max = self.wait_max.as_secs_f64();
        Duration::try_from_secs_f64(secs.clamp(min, max))
            .map_or(self.wait_max, |wait| wait.min(self.wait_max))
    }
}

/// Builder for [`RetryPolicy`]. Validation happens in [`build`](Self::build).
#[derive(Default)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    wait: Option<(Duration, Duration)>,
    multiplier: Option<f64>,
    predicate: Option<RetryPredicate>,
    extra: Vec<RetryPredicate>,
}

impl RetryPolicyBuilder {
    /// Attempts per call including the first; must be at least 1.
    #[must_use]
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Bounds for the wait between attempts; `min` must not exceed `max`.
    #[must_use]
    pub fn wait(mut self, min: Duration, max: Duration) -> Self {
        self.wait = Some((min, max));
        self
    }

    /// Seconds waited after the first failure, before clamping.
    #[must_use]
    pub fn multiplier(mut self, m: f64) -> Self {
        self.multiplier = Some(m);
        self
    }

    /// Replace the base predicate.
    #[must_use]
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ApiError) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Widen the retryable set: an error is retried if the base predicate or
    /// any added predicate accepts it.
    #[must_use]
    pub fn or_retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ApiError) -> bool + Send + Sync + 'static,
    {
        self.extra.push(Arc::new(predicate));
        self
    }

    /// Validates the settings and composes the predicates.
    pub fn build(self) -> Result<RetryPolicy, ConfigError> {
        let defaults = RetryPolicy::default();

        let max_attempts = self.max_attempts.unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }

        let (wait_min, wait_max) = self.wait.unwrap_or((defaults.wait_min, defaults.wait_max));
        if wait_min > wait_max {
            return Err(ConfigError::InvalidWaitBounds {
                min: wait_min,
                max: wait_max,
            });
        }

        let multiplier = self.multiplier.unwrap_or(defaults.multiplier);
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ConfigError::InvalidMultiplier(multiplier));
        }

        let base = self.predicate.unwrap_or(defaults.predicate);
        let predicate: RetryPredicate = if self.extra.is_empty() {
            base
        } else {
            let extra = self.extra;
            Arc::new(move |e: &ApiError| base(e) || extra.iter().any(|p| p(e)))
        };

        Ok(RetryPolicy {
            max_attempts,
            wait_min,
            wait_max,
            multiplier,
            predicate,
        })
    }
}

/// Executes an async operation under `policy`.
///
/// The error of the last attempt is returned unchanged. Dropping the returned
/// future cancels both the in-flight attempt and any pending backoff sleep.
pub async fn call_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> Result<T, ApiError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !policy.should_retry(&e) {
                    debug!("{}: non-retryable error: {}", operation_name, e);
                    return Err(e);
                }

                if attempt >= max_attempts {
                    debug!(
                        "{}: giving up after {} attempts: {}",
                        operation_name, max_attempts, e
                    );
                    return Err(e);
                }

                let wait = policy.wait_for(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    error = %e,
                    "{}: attempt {}/{} failed ({}), retrying in {:?}...",
                    operation_name,
                    attempt,
                    max_attempts,
                    e,
                    wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
