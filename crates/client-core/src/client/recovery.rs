//! Retry policy and retry state for the callee search loop
//!
//! The callee keeps trying to reach the caller's well-known endpoint while
//! the caller may not be online yet. The policy is deliberately simple:
//!
//! - a **constant** delay between attempts (no exponential backoff, no jitter)
//! - a **hard count** bound, checked after incrementing, so with the default
//!   bound of 12 the callee makes 13 attempts in total before giving up
//!
//! # Examples
//!
//! ```rust
//! use duocall_client_core::client::recovery::{RetryDecision, RetryPolicy, RetryState};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.max_attempts, 12);
//! assert_eq!(policy.delay(), Duration::from_secs(5));
//!
//! let mut state = RetryState::new();
//! for failure in 1..=12 {
//!     assert_eq!(
//!         state.record_failure(&policy),
//!         RetryDecision::Retry { attempt: failure, delay: policy.delay() }
//!     );
//! }
//! assert_eq!(state.record_failure(&policy), RetryDecision::GiveUp { attempts: 13 });
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::timer::{Timer, TimerFired};

/// Configuration for callee retry behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Failures tolerated before giving up (exceeding this count gives up)
    pub max_attempts: u32,
    /// Fixed delay between attempts, in seconds
    pub delay_secs: u64,
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            delay_secs: 5,
        }
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule exactly one more attempt after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Bound exceeded, stop searching
    GiveUp { attempts: u32 },
}

/// Attempt counter plus the single pending retry timer
#[derive(Debug, Default)]
pub struct RetryState {
    attempts: u32,
    pending: Option<Timer>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failed attempts recorded since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Check whether a retry timer is pending
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Count one failed attempt and decide whether to try again
    pub fn record_failure(&mut self, policy: &RetryPolicy) -> RetryDecision {
        self.attempts += 1;
        if self.attempts > policy.max_attempts {
            warn!(
                attempts = self.attempts,
                max_attempts = policy.max_attempts,
                "Retry bound exceeded, giving up"
            );
            self.pending = None;
            RetryDecision::GiveUp {
                attempts: self.attempts,
            }
        } else {
            warn!(
                attempt = self.attempts,
                max_attempts = policy.max_attempts,
                next_delay_ms = policy.delay().as_millis() as u64,
                "Attempt failed, will retry"
            );
            RetryDecision::Retry {
                attempt: self.attempts,
                delay: policy.delay(),
            }
        }
    }

    /// Own `timer` as the pending retry, canceling any previous one
    pub fn schedule(&mut self, timer: Timer) {
        self.pending = Some(timer);
    }

    /// Consume a firing. Returns `false` for a firing this state no longer owns.
    pub fn take_fired(&mut self, fired: &TimerFired) -> bool {
        match &self.pending {
            Some(timer) if timer.owns(fired) => {
                self.pending = None;
                true
            }
            _ => {
                debug!(generation = fired.generation, "Ignoring stale retry timer");
                false
            }
        }
    }

    /// The remote answered: cancel any pending retry and reset the count
    pub fn succeed(&mut self) {
        self.pending = None;
        self.attempts = 0;
    }
}
