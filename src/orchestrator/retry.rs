//! Fixed-delay retry around a single transfer attempt.
//!
//! A step reports [`StepOutcome`]; [`RetryPolicy::run`] decides whether to go
//! again and folds the final attempt into a [`RetryResult`].

use std::time::Duration;
use tracing::{info, warn};

use crate::models::FailureKind;
use crate::store::StoreError;

/// Result of a single attempt at a step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T> {
    Success(T),
    /// Worth trying again after the retry delay.
    Retryable(String),
    /// Trying again will not help.
    Fatal(String),
}

impl<T> StepOutcome<T> {
    /// Fold a store error into an outcome according to its transience.
    pub fn from_store_error(error: &StoreError) -> Self {
        if error.is_transient() {
            StepOutcome::Retryable(error.to_string())
        } else {
            StepOutcome::Fatal(error.to_string())
        }
    }
}

/// Final result of running a step under a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub enum RetryResult<T> {
    Succeeded { value: T, attempts: u32 },
    Failed {
        kind: FailureKind,
        reason: String,
        attempts: u32,
    },
}

/// Fixed-delay retry with an attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Run `step` until it succeeds, fails fatally, or the ceiling is hit.
    ///
    /// `step` receives the 1-based attempt number. `label` identifies the
    /// work in log lines.
    pub fn run<T, F>(&self, label: &str, mut step: F) -> RetryResult<T>
    where
        F: FnMut(u32) -> StepOutcome<T>,
    {
        let mut attempt = 1;
        loop {
            match step(attempt) {
                StepOutcome::Success(value) => {
                    return RetryResult::Succeeded {
                        value,
                        attempts: attempt,
                    }
                }
                StepOutcome::Fatal(reason) => {
                    warn!(target: "tsmigrate::retry", %label, attempt, %reason, "not retrying");
                    return RetryResult::Failed {
                        kind: FailureKind::Permanent,
                        reason,
                        attempts: attempt,
                    };
                }
                StepOutcome::Retryable(reason) => {
                    if !self.should_retry(attempt) {
                        warn!(target: "tsmigrate::retry", %label, attempt, %reason, "retries exhausted");
                        return RetryResult::Failed {
                            kind: FailureKind::TransientIo,
                            reason,
                            attempts: attempt,
                        };
                    }
                    info!(
                        target: "tsmigrate::retry",
                        %label,
                        attempt,
                        %reason,
                        delay = ?self.delay,
                        "retrying after delay"
                    );
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
