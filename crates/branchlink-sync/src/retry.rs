//! # Retry Policy
//!
//! Delay schedule between failed queue drains.
//!
//! ```text
//! Fixed(5s):               fail ─5s─ fail ─5s─ fail ─5s─ ok
//! Exponential(1s..60s):    fail ─1s─ fail ─2s─ fail ─4s─ ... ─60s─ ok
//! ```
//!
//! The policy is a plain value so tests can inject short or zero delays.

use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shape of the retry schedule, as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryKind {
    #[default]
    Fixed,
    Exponential,
}

impl std::str::FromStr for RetryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" | "constant" => Ok(RetryKind::Fixed),
            "exponential" | "backoff" => Ok(RetryKind::Exponential),
            other => Err(format!("unknown retry policy '{}'", other)),
        }
    }
}

/// Delay schedule for failed drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Same delay after every failure.
    Fixed(Duration),
    /// Doubling delay, capped at `max`, reset after a success.
    Exponential { initial: Duration, max: Duration },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Fixed(Duration::from_millis(branchlink_core::SYNC_RETRY_DELAY_MS))
    }
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        RetryPolicy::Fixed(delay)
    }

    pub fn exponential(initial: Duration, max: Duration) -> Self {
        RetryPolicy::Exponential { initial, max }
    }

    /// Creates a fresh backoff iterator for this policy.
    ///
    /// The returned backoff never gives up: drain failures have no
    /// permanent-failure path.
    pub fn backoff(&self) -> Box<dyn Backoff + Send> {
        match *self {
            RetryPolicy::Fixed(delay) => Box::new(Constant::new(delay)),
            RetryPolicy::Exponential { initial, max } => Box::new(ExponentialBackoff {
                initial_interval: initial,
                current_interval: initial,
                max_interval: max,
                multiplier: 2.0,
                randomization_factor: 0.0,
                max_elapsed_time: None,
                ..Default::default()
            }),
        }
    }
}
