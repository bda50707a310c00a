//! Bounded optimistic-retry loop around the reference CAS.
//!
//! A lost CAS race (`ReferenceConflict`) is the only recoverable failure:
//! the whole operation is recomputed from fresh state and retried with
//! capped exponential backoff plus jitter. Every other error propagates
//! immediately. Exhausting the ceiling yields `RetryExhausted`, which is
//! distinguishable from a data conflict.

use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::{EngineResult, VersionStoreError};

/// Retry policy for CAS-based reference updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempt ceiling, including the first attempt.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub initial_backoff: Duration,
    /// Cap for the exponential backoff.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// A config that never sleeps, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

/// Run `attempt` until it succeeds, fails terminally, or the ceiling is
/// reached. `attempt` must recompute from freshly loaded state on every
/// call; nothing durable happens before its final successful CAS, so
/// repeated calls are safe.
pub(crate) fn with_retry<T>(
    operation: &'static str,
    name: &str,
    config: &RetryConfig,
    mut attempt: impl FnMut() -> EngineResult<T>,
) -> EngineResult<T> {
    let mut backoff = config.initial_backoff;
    let attempts = config.max_attempts.max(1);
    for round in 1..=attempts {
        match attempt() {
            Err(VersionStoreError::ReferenceConflict { .. }) if round < attempts => {
                debug!(operation, name, round, "lost CAS race, retrying");
                sleep_with_jitter(backoff);
                backoff = (backoff * 2).min(config.max_backoff);
            }
            Err(VersionStoreError::ReferenceConflict { .. }) => {
                return Err(VersionStoreError::RetryExhausted {
                    operation,
                    name: name.to_string(),
                    attempts,
                });
            }
            other => return other,
        }
    }
    unreachable!("loop always returns")
}

fn sleep_with_jitter(backoff: Duration) {
    if backoff.is_zero() {
        return;
    }
    let jitter_micros = rand::thread_rng().gen_range(0..=backoff.as_micros() as u64 / 2);
    thread::sleep(backoff + Duration::from_micros(jitter_micros));
}
