//! Purpose: Retry wrapper for remote calls with capped exponential backoff and jitter.
//! Exports: `RetryPolicy`, `with_retry`.
//! Role: Every remote read, write, clear and metadata call goes through here.
//! Invariants: Only retryable `ErrorKind`s are retried; permanent errors return on first sight.
//! Invariants: At most `max_attempts` calls are made; exhaustion yields `ErrorKind::Exhausted`.
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use super::error::{Error, ErrorKind};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_secs: f64,
    pub cap_secs: f64,
    pub jitter_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_secs: 3.0,
            cap_secs: 90.0,
            jitter_secs: 1.5,
        }
    }
}

impl RetryPolicy {
    /// No waiting at all; used by tests and dry runs against local stubs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_secs: 0.0,
            cap_secs: 0.0,
            jitter_secs: 0.0,
        }
    }

    /// Wait after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let raw = self.base_secs * 2f64.powi(exponent) + self.jitter_secs * random_unit();
        let secs = raw.min(self.cap_secs).max(0.0);
        Duration::from_secs_f64(secs)
    }
}

pub fn with_retry<T, F>(policy: &RetryPolicy, desc: &str, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Result<T, Error>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last: Option<Error> = None;
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt < attempts {
                    let wait = policy.backoff(attempt);
                    warn!(
                        "{desc}: attempt {attempt}/{attempts} failed: {err}; waiting {:.1}s",
                        wait.as_secs_f64()
                    );
                    pause(wait);
                } else {
                    warn!("{desc}: attempt {attempt}/{attempts} failed: {err}");
                }
                last = Some(err);
            }
        }
    }

    let mut exhausted = Error::new(ErrorKind::Exhausted)
        .with_message(format!("{desc}: failed after {attempts} attempts"));
    if let Some(err) = last {
        if let Some(spreadsheet) = err.spreadsheet() {
            exhausted = exhausted.with_spreadsheet(spreadsheet.to_string());
        }
        if let Some(range) = err.range() {
            exhausted = exhausted.with_range(range.to_string());
        }
        exhausted = exhausted.with_source(err);
    }
    Err(exhausted)
}

pub(crate) fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

/// Uniform in `[0, 1)`.
fn random_unit() -> f64 {
    let mut bytes = [0u8; 8];
    if getrandom::fill(&mut bytes).is_err() {
        return 0.0;
    }
    (u64::from_le_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64
}
