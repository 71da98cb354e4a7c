//! User-facing events emitted by the call client
//!
//! Everything a front end needs to render lives in [`CallEvent`]: the welcome
//! line, the status line, blocking and informational notices, the countdown
//! display, which controls are visible, and when to go back to the entry
//! screen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::call::{CallState, Role};
use crate::transport::{RemoteStream, SessionId};

/// How prominently a notice must be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NoticeLevel {
    /// Informational, does not change state
    Info,
    /// Something ended or went wrong; the call is being torn down
    Warning,
    /// Unrecoverable; a full restart is required
    Fatal,
}

/// Which affordances are visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlsView {
    /// Caller "start call" button
    pub start_visible: bool,
    /// Callee "join call" button
    pub join_visible: bool,
    /// "End call" button and remote playback
    pub in_call_visible: bool,
}

impl ControlsView {
    pub fn hidden() -> Self {
        Self::default()
    }

    /// Controls shown before a call, per role
    pub fn ready(role: Role) -> Self {
        Self {
            start_visible: role == Role::Caller,
            join_visible: role == Role::Callee,
            in_call_visible: false,
        }
    }

    pub fn in_call() -> Self {
        Self {
            start_visible: false,
            join_visible: false,
            in_call_visible: true,
        }
    }
}

/// Events published to subscribers
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// The lifecycle moved to a new state
    StateChanged {
        previous: CallState,
        current: CallState,
        role: Option<Role>,
        at: DateTime<Utc>,
    },
    /// Greeting for the resolved user
    Welcome { user: String, role: Role },
    /// Status line text
    Status { text: String },
    /// A notice the user must see
    Notice { level: NoticeLevel, message: String },
    /// Countdown display; `None` hides it
    Countdown { display: Option<String> },
    /// Visible affordances changed
    Controls(ControlsView),
    /// Local capture is ready for preview
    LocalMediaReady,
    /// Remote media bound for playback
    RemoteStreamBound { session_id: SessionId, stream: RemoteStream },
    /// Go back to the entry screen
    NavigateToEntry,
}

impl CallEvent {
    pub fn status(text: impl Into<String>) -> Self {
        CallEvent::Status { text: text.into() }
    }

    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        CallEvent::Notice {
            level,
            message: message.into(),
        }
    }

    /// Check if this is a notice of the given level
    pub fn is_notice(&self, level: NoticeLevel) -> bool {
        matches!(self, CallEvent::Notice { level: l, .. } if *l == level)
    }
}

/// Status line texts
pub mod status {
    pub const READY_CALLER: &str = "Ready to start a call.";
    pub const READY_CALLEE: &str = "Waiting for your friend to start a call...";
    pub const WAITING_FOR_JOIN: &str = "Notified admin. Waiting for them to join...";
    pub const SEARCHING: &str = "Searching... Please wait";
    pub const CONNECTED: &str = "Connected.";
    pub const GAVE_UP: &str = "Could not connect. Your friend is not online.";
    pub const FATAL: &str = "Could not connect. Please refresh and try again.";

    pub fn retrying(attempt: u32, max_attempts: u32) -> String {
        format!("Friend is not online yet... Retrying ({attempt}/{max_attempts})")
    }
}

/// Notice texts
pub mod notice {
    pub const MEDIA_DENIED: &str = "You must allow access to your camera and microphone.";
    pub const PROVIDER_ERROR: &str = "Could not connect. Please refresh and try again.";
    pub const STILL_WAITING: &str = "Please wait 60 seconds. The admin has been notified.";
    pub const EXPIRED: &str = "Admin did not join in time.";
    pub const GAVE_UP: &str = "Could not reach your friend. Press join to try again.";
    pub const REMOTE_CLOSED: &str = "The other user has ended the call.";
    pub const SESSION_ERROR: &str = "The call was interrupted by a connection error.";
}
