//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Retry policies consulted by the execution pipeline.
//!
//! The pipeline asks the policy only about errors that are
//! [retryable](crate::NoSQLError::is_retryable()), and never retries past
//! the request's timeout whatever the policy says.
use rand::Rng;
use std::fmt::Debug;
use std::time::Duration;

use crate::error::{NoSQLError, NoSQLErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Send the request again after this delay.
    Retry(Duration),
    Stop,
}

pub trait RetryPolicy: Send + Sync + Debug {
    /// Decide what to do after attempt number `attempt` (starting at 1)
    /// failed with `err`, `elapsed` after the request started.
    fn should_retry(&self, attempt: u32, err: &NoSQLError, elapsed: Duration) -> RetryDecision;
}

/// Exponential backoff with jitter for throttling and server errors, and a
/// short fixed delay for authentication retries.
#[derive(Debug, Clone)]
pub struct DefaultRetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        DefaultRetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(30),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl DefaultRetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let d = self.base_delay.saturating_mul(1 << exp).min(self.max_delay);
        let jitter_ms = (d.as_millis() as u64) / 4;
        if jitter_ms == 0 {
            return d;
        }
        d + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(&self, attempt: u32, err: &NoSQLError, _elapsed: Duration) -> RetryDecision {
        if !err.is_retryable() || attempt >= self.max_attempts {
            return RetryDecision::Stop;
        }
        match err.code {
            NoSQLErrorCode::RetryAuthentication | NoSQLErrorCode::SecurityInfoUnavailable => {
                RetryDecision::Retry(self.base_delay)
            }
            _ => RetryDecision::Retry(self.backoff(attempt)),
        }
    }
}

/// Never retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&self, _attempt: u32, _err: &NoSQLError, _elapsed: Duration) -> RetryDecision {
        RetryDecision::Stop
    }
}
