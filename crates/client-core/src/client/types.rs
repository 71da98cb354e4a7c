//! Type definitions for the client runtime

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::call::{CallState, Role};

/// Point-in-time view of the controller
///
/// Published after every processed command, transport event and timer
/// firing, so observers never see a half-applied transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    /// Resolved role, `None` before initialization or when unresolved
    pub role: Option<Role>,
    /// Name of the resolved user
    pub user: Option<String>,
    pub state: CallState,
    /// Failed callee attempts in the current search cycle
    pub retry_attempts: u32,
    /// Whether a retry timer is armed
    pub retry_pending: bool,
    /// Seconds left on the caller countdown, if running
    pub countdown_remaining: Option<u32>,
    /// Whether the "still waiting" notice is still to come
    pub grace_pending: bool,
    /// Whether a session is attached as current
    pub session_current: bool,
    /// Whether the transport binding is still held
    pub binding_held: bool,
    /// Whether full teardown has run
    pub torn_down: bool,
    /// When the call connected
    pub connected_at: Option<DateTime<Utc>>,
}

impl ControllerSnapshot {
    /// Snapshot of a controller that has not been initialized
    pub fn initial() -> Self {
        Self {
            role: None,
            user: None,
            state: CallState::Uninitialized,
            retry_attempts: 0,
            retry_pending: false,
            countdown_remaining: None,
            grace_pending: false,
            session_current: false,
            binding_held: false,
            torn_down: false,
            connected_at: None,
        }
    }

    /// Check whether any timer is still owned
    pub fn has_pending_timers(&self) -> bool {
        self.retry_pending || self.countdown_remaining.is_some() || self.grace_pending
    }
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self::initial()
    }
}
