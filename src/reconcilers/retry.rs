// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Backoff schedules for the operator.
//!
//! Three schedules share one exponential shape:
//!
//! | Schedule              | Start | Cap | Budget    | Jitter |
//! |-----------------------|-------|-----|-----------|--------|
//! | [`default_backoff`]   | 100ms | 30s | 5 minutes | ±10%   |
//! | [`conflict_backoff`]  | 20ms  | 1s  | caller    | ±10%   |
//! | [`rate_limit_delay`]  | 100ms | 30s | queue cap | none   |
//!
//! [`retry_api_call`] wraps a single API request and retries only transient
//! failures (429, 5xx, transport errors).

use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const API_START: Duration = Duration::from_millis(100);
const API_CAP: Duration = Duration::from_secs(30);
const API_BUDGET: Duration = Duration::from_secs(300);
const CONFLICT_START: Duration = Duration::from_millis(20);
const CONFLICT_CAP: Duration = Duration::from_secs(1);
const GROWTH: f64 = 2.0;
const JITTER: f64 = 0.1;

/// Stateful exponential backoff with optional jitter and time budget.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub current_interval: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// `None` means the caller bounds the number of attempts
    pub max_elapsed_time: Option<Duration>,
    pub multiplier: f64,
    /// Fraction of the interval added or removed at random
    pub randomization_factor: f64,
    started: Instant,
}

impl ExponentialBackoff {
    fn starting_at(initial: Duration, cap: Duration, budget: Option<Duration>) -> Self {
        Self {
            current_interval: initial,
            initial_interval: initial,
            max_interval: cap,
            max_elapsed_time: budget,
            multiplier: GROWTH,
            randomization_factor: JITTER,
            started: Instant::now(),
        }
    }

    fn budget_spent(&self) -> bool {
        self.max_elapsed_time
            .is_some_and(|budget| self.started.elapsed() >= budget)
    }

    /// Next delay, or `None` once the time budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.budget_spent() {
            return None;
        }
        let delay = jitter(self.current_interval, self.randomization_factor);
        self.current_interval = self
            .current_interval
            .mul_f64(self.multiplier)
            .min(self.max_interval);
        Some(delay)
    }

    /// Start over from the initial interval with a fresh budget.
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.started = Instant::now();
    }
}

fn jitter(interval: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return interval;
    }
    let spread = interval.mul_f64(factor);
    let low = interval.saturating_sub(spread);
    let high = interval + spread;
    rand::rng().random_range(low..=high)
}

/// Schedule for transient API failures.
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::starting_at(API_START, API_CAP, Some(API_BUDGET))
}

/// Schedule between optimistic-concurrency status retries.
#[must_use]
pub fn conflict_backoff() -> ExponentialBackoff {
    ExponentialBackoff::starting_at(CONFLICT_START, CONFLICT_CAP, None)
}

/// Delay before a failed key is handed out again by the work queue.
///
/// `100ms * 2^requeues`, capped at 30 seconds, without jitter.
#[must_use]
pub fn rate_limit_delay(requeues: u32) -> Duration {
    2u32.checked_pow(requeues)
        .and_then(|factor| API_START.checked_mul(factor))
        .map_or(API_CAP, |delay| delay.min(API_CAP))
}

/// Run `operation` until it succeeds, fails permanently or the budget is spent.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last error once
/// [`default_backoff`] gives up.
pub async fn retry_api_call<T, F, Fut>(mut operation: F, operation_name: &str) -> Result<T, kube::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = default_backoff();
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, elapsed = ?started.elapsed(), "API call recovered");
                }
                return Ok(value);
            }
            Err(err) if !is_retryable_error(&err) => return Err(err),
            Err(err) => err,
        };

        let Some(delay) = backoff.next_backoff() else {
            error!(operation = operation_name, attempt, elapsed = ?started.elapsed(), error = %err, "Giving up on API call");
            return Err(err);
        };
        warn!(operation = operation_name, attempt, retry_after = ?delay, error = %err, "Transient API error");
        tokio::time::sleep(delay).await;
    }
}

fn api_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

/// Rate limiting, server errors and transport failures are retryable.
pub(crate) fn is_retryable_error(err: &kube::Error) -> bool {
    match api_code(err) {
        Some(code) => code == 429 || (500..600).contains(&code),
        None => matches!(err, kube::Error::Service(_)),
    }
}

/// HTTP 404.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    api_code(err) == Some(404)
}

/// HTTP 409: the write carried a stale resource version.
#[must_use]
pub fn is_conflict(err: &kube::Error) -> bool {
    api_code(err) == Some(409)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
