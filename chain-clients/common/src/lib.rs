//! Shared utilities for chain client libraries
//!
//! Retry and polling helpers used by clients that talk to redundant
//! endpoints or wait for on-chain state to settle.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// RETRY POLICY
// ============================================================================

/// Bounded polling policy: a fixed number of attempts separated by a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (0 means the operation is never tried)
    pub max_attempts: u32,
    /// Sleep between two consecutive attempts
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// Result of a single polling attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// The awaited state was observed
    Ready(T),
    /// Not there yet, try again after the interval
    Pending,
}

/// Failure of every endpoint tried by [`try_each`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllEndpointsFailed {
    /// One `(endpoint, error message)` pair per endpoint, in the order tried
    pub failures: Vec<(String, String)>,
}

impl Display for AllEndpointsFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.failures.is_empty() {
            return write!(f, "no endpoints configured");
        }
        let details: Vec<String> = self
            .failures
            .iter()
            .map(|(endpoint, error)| format!("{}: {}", endpoint, error))
            .collect();
        write!(f, "all endpoints failed: {}", details.join("; "))
    }
}

impl std::error::Error for AllEndpointsFailed {}

// ============================================================================
// HELPERS
// ============================================================================

/// Tries `op` against each endpoint in order and returns the first success
/// together with the endpoint that produced it.
///
/// Endpoints are tried sequentially; the first success wins and later
/// endpoints are never contacted. If every endpoint fails, the per-endpoint
/// error messages are aggregated in [`AllEndpointsFailed`].
pub async fn try_each<'a, T, E, F, Fut>(
    endpoints: &'a [String],
    mut op: F,
) -> Result<(T, &'a str), AllEndpointsFailed>
where
    E: Display,
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut failures = Vec::with_capacity(endpoints.len());

    for endpoint in endpoints {
        match op(endpoint.as_str()).await {
            Ok(value) => {
                debug!("Endpoint {} succeeded after {} failure(s)", endpoint, failures.len());
                return Ok((value, endpoint.as_str()));
            }
            Err(e) => {
                warn!("Endpoint {} failed: {}", endpoint, e);
                failures.push((endpoint.clone(), e.to_string()));
            }
        }
    }

    Err(AllEndpointsFailed { failures })
}

/// Polls `op` until it reports [`PollStatus::Ready`] or the attempt budget is spent.
///
/// Sleeps `policy.interval` between attempts (not after the last one).
/// Returns `None` when the budget is exhausted without a ready state.
pub async fn poll_until<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollStatus<T>>,
{
    for attempt in 1..=policy.max_attempts {
        if let PollStatus::Ready(value) = op(attempt).await {
            return Some(value);
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    None
}
