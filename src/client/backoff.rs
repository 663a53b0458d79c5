//! Backoff strategies for retried client requests.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use retry_policies::{policies, Jitter, RetryDecision, RetryPolicy};

/// Delay before the next retry, or `None` to stop retrying.
pub trait Backoff: Send {
    fn next_backoff(&mut self) -> Option<Duration>;
}

/// Creates a fresh backoff for every request.
pub type BackoffFactory = Arc<dyn Fn() -> Box<dyn Backoff> + Send + Sync>;

pub fn exponential() -> BackoffFactory {
    Arc::new(|| Box::new(ExponentialBackoff::default()) as Box<dyn Backoff>)
}

pub fn constant(delay: Duration) -> BackoffFactory {
    Arc::new(move || Box::new(ConstantBackoff(delay)) as Box<dyn Backoff>)
}

pub fn zero() -> BackoffFactory {
    Arc::new(|| Box::new(ZeroBackoff) as Box<dyn Backoff>)
}

pub fn stop() -> BackoffFactory {
    Arc::new(|| Box::new(StopBackoff) as Box<dyn Backoff>)
}

/// Jittered exponential backoff on top of the `retry-policies` exponential policy.
///
/// Delays start at `min_interval`, double per retry and are capped at
/// `max_interval`. Once `max_elapsed_time` has passed the backoff stops.
pub struct ExponentialBackoff {
    policy: policies::ExponentialBackoff,
    max_elapsed_time: Option<Duration>,
    start: SystemTime,
    retries: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(500),
            Duration::from_secs(60),
            Jitter::Bounded,
            Some(Duration::from_secs(15 * 60)),
        )
    }
}

impl ExponentialBackoff {
    pub fn new(
        min_interval: Duration,
        max_interval: Duration,
        jitter: Jitter,
        max_elapsed_time: Option<Duration>,
    ) -> Self {
        let policy = policies::ExponentialBackoff::builder()
            .retry_bounds(min_interval, max_interval.max(min_interval))
            .jitter(jitter)
            .base(2)
            .build_with_max_retries(u32::MAX);

        Self {
            policy,
            max_elapsed_time,
            start: SystemTime::now(),
            retries: 0,
        }
    }

    pub fn reset(&mut self) {
        self.retries = 0;
        self.start = SystemTime::now();
    }
}

impl Backoff for ExponentialBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            let elapsed = self.start.elapsed().unwrap_or_default();
            if elapsed >= max_elapsed {
                return None;
            }
        }

        match self.policy.should_retry(self.start, self.retries) {
            RetryDecision::Retry { execute_after } => {
                self.retries = self.retries.saturating_add(1);
                Some(
                    execute_after
                        .duration_since(SystemTime::now())
                        .unwrap_or_default(),
                )
            }
            RetryDecision::DoNotRetry => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff(pub Duration);

impl Backoff for ConstantBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        Some(self.0)
    }
}

/// Retries immediately.
#[derive(Debug, Clone, Copy)]
pub struct ZeroBackoff;

impl Backoff for ZeroBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        Some(Duration::ZERO)
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy)]
pub struct StopBackoff;

impl Backoff for StopBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        None
    }
}
