//! Caller join-by countdown
//!
//! Once the caller has notified the other side it waits a bounded time for
//! them to join. The countdown ticks once per second, shows `M:SS`, and
//! raises a one-shot "still waiting" notice when the grace time elapses.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

use super::timer::{Timer, TimerFactory, TimerFired, TimerKind};

/// Countdown timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    /// Time the callee has to join, in seconds
    pub duration_secs: u32,
    /// Seconds between ticks
    pub tick_secs: u64,
    /// Seconds after which the "still waiting" notice is shown
    pub grace_secs: u64,
}

impl CountdownConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            duration_secs: 300,
            tick_secs: 1,
            grace_secs: 60,
        }
    }
}

/// Format remaining seconds as `M:SS`
pub fn format_remaining(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Result of one honoured tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTick {
    pub remaining: u32,
    pub display: String,
    pub expired: bool,
}

/// Running countdown. Dropping it cancels both timers.
#[derive(Debug)]
pub struct CountdownState {
    remaining: u32,
    step: u32,
    tick: Timer,
    grace: Option<Timer>,
}

impl CountdownState {
    pub fn start(config: &CountdownConfig, timers: &mut TimerFactory) -> Self {
        Self {
            remaining: config.duration_secs,
            step: u32::try_from(config.tick_secs).unwrap_or(u32::MAX),
            tick: timers.every(TimerKind::CountdownTick, config.tick()),
            grace: Some(timers.once(TimerKind::Grace, config.grace())),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn display(&self) -> String {
        format_remaining(self.remaining)
    }

    pub fn grace_pending(&self) -> bool {
        self.grace.is_some()
    }

    /// Apply a tick. `None` when the firing is not from this countdown.
    pub fn on_tick(&mut self, fired: &TimerFired) -> Option<CountdownTick> {
        if !self.tick.owns(fired) {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(self.step);
        trace!(remaining_secs = self.remaining, "Countdown tick");
        Some(CountdownTick {
            remaining: self.remaining,
            display: self.display(),
            expired: self.remaining == 0,
        })
    }

    /// Consume the grace firing. Returns `true` only once.
    pub fn on_grace(&mut self, fired: &TimerFired) -> bool {
        match &self.grace {
            Some(timer) if timer.owns(fired) => {
                self.grace = None;
                true
            }
            _ => false,
        }
    }
}
