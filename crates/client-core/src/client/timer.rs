//! Owned, cancelable timers
//!
//! A [`Timer`] is a tokio task posting [`TimerFired`] into the controller
//! queue. Dropping the timer aborts the task. Every timer carries a
//! generation number; the controller only honours a firing whose generation
//! matches the timer it still owns, so a firing already queued when the timer
//! was dropped is discarded.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

use super::controller::ControllerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// One-shot delay before the next callee attempt
    Retry,
    /// Recurring countdown tick
    CountdownTick,
    /// One-shot "still waiting" notice
    Grace,
}

/// A timer firing as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug)]
pub struct Timer {
    kind: TimerKind,
    generation: u64,
    handle: JoinHandle<()>,
}

impl Timer {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Check whether `fired` came from this very timer
    pub fn owns(&self, fired: &TimerFired) -> bool {
        self.kind == fired.kind && self.generation == fired.generation
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
        trace!(kind = ?self.kind, generation = self.generation, "Timer canceled");
    }
}

/// Spawns timers wired to the controller queue
#[derive(Debug)]
pub struct TimerFactory {
    next_generation: u64,
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl TimerFactory {
    pub fn new(tx: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self {
            next_generation: 0,
            tx,
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Fire once after `delay`
    pub fn once(&mut self, kind: TimerKind, delay: Duration) -> Timer {
        let generation = self.next_generation();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ControllerEvent::Timer(TimerFired { kind, generation }));
        });
        Timer {
            kind,
            generation,
            handle,
        }
    }

    /// Fire every `period`, first firing one period from now
    pub fn every(&mut self, kind: TimerKind, period: Duration) -> Timer {
        let generation = self.next_generation();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx
                    .send(ControllerEvent::Timer(TimerFired { kind, generation }))
                    .is_err()
                {
                    break;
                }
            }
        });
        Timer {
            kind,
            generation,
            handle,
        }
    }
}
