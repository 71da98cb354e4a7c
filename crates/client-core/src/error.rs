//! Error types and handling for the client-core library
//!
//! This module defines all error types that can occur while driving a call
//! and maps each of them onto the handling policy the controller applies.
//!
//! # Error Categories
//!
//! - **Fatal** - Media acquisition denied or the transport provider failed.
//!   A blocking notice is shown and nothing is retried; a full restart is needed.
//! - **Recoverable** - A single session attempt failed because the remote
//!   endpoint is not reachable yet. The callee retries on a bounded schedule.
//! - **Peer termination** - The remote side closed or errored during a call.
//!   The local user is notified and the call is torn down.
//! - **Side channel** - The call-start notifier failed. Logged only.
//! - **Rejected** - An operation or transition not allowed in the current
//!   state. Nothing changes and the caller of the operation gets the error.
//!
//! ## Basic Pattern
//!
//! ```rust
//! use duocall_client_core::{ClientError, ErrorSeverity};
//!
//! let err = ClientError::session_failed("peer unavailable");
//! assert!(err.is_recoverable());
//! assert_eq!(err.severity(), ErrorSeverity::Recoverable);
//!
//! let err = ClientError::media_denied("camera permission refused");
//! assert!(err.is_fatal());
//! assert_eq!(err.category(), "media");
//! ```

use thiserror::Error;

use crate::call::CallState;

/// Result type alias for client-core operations
pub type ClientResult<T> = Result<T, ClientError>;

/// How the controller reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Blocking notice, no automatic recovery
    Fatal,
    /// Bounded automatic retry, then manual re-trigger
    Recoverable,
    /// Remote hangup or mid-call failure, notice plus teardown
    PeerTermination,
    /// Best-effort side channel, log only
    SideChannel,
    /// Refused before anything changed
    Rejected,
}

/// Error types for call lifecycle operations
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Media related errors
    #[error("Media acquisition denied: {reason}")]
    MediaDenied { reason: String },

    /// Transport provider errors (not tied to one session)
    #[error("Transport provider error: {reason}")]
    TransportFailed { reason: String },

    #[error("Endpoint already registered: {endpoint}")]
    EndpointUnavailable { endpoint: String },

    /// Session related errors
    #[error("Session establishment failed: {reason}")]
    SessionFailed { reason: String },

    #[error("Session error: {reason}")]
    SessionError { reason: String },

    #[error("Session closed by remote peer")]
    SessionClosed,

    /// Notifier errors
    #[error("Notifier failed: {reason}")]
    NotifierFailed { reason: String },

    /// Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// State machine errors
    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: CallState, to: CallState },

    #[error("Operation {operation} not allowed in state {state:?}")]
    InvalidState { operation: String, state: CallState },

    /// Runtime errors
    #[error("Client event loop has stopped")]
    ClientStopped,
}

impl ClientError {
    /// Create a media denied error
    pub fn media_denied(reason: impl Into<String>) -> Self {
        Self::MediaDenied { reason: reason.into() }
    }

    /// Create a transport failure error
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        Self::TransportFailed { reason: reason.into() }
    }

    /// Create a session establishment error
    pub fn session_failed(reason: impl Into<String>) -> Self {
        Self::SessionFailed { reason: reason.into() }
    }

    /// Create a mid-session error
    pub fn session_error(reason: impl Into<String>) -> Self {
        Self::SessionError { reason: reason.into() }
    }

    /// Create a notifier error
    pub fn notifier_failed(reason: impl Into<String>) -> Self {
        Self::NotifierFailed { reason: reason.into() }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Policy bucket for this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ClientError::MediaDenied { .. }
            | ClientError::TransportFailed { .. }
            | ClientError::EndpointUnavailable { .. }
            | ClientError::InvalidConfiguration { .. }
            | ClientError::ClientStopped => ErrorSeverity::Fatal,

            ClientError::SessionFailed { .. } => ErrorSeverity::Recoverable,

            ClientError::SessionError { .. } | ClientError::SessionClosed => {
                ErrorSeverity::PeerTermination
            }

            ClientError::NotifierFailed { .. } => ErrorSeverity::SideChannel,

            ClientError::InvalidTransition { .. } | ClientError::InvalidState { .. } => {
                ErrorSeverity::Rejected
            }
        }
    }

    /// Check if this error is worth another automatic attempt
    pub fn is_recoverable(&self) -> bool {
        self.severity() == ErrorSeverity::Recoverable
    }

    /// Check if this error requires a full manual restart
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::MediaDenied { .. } => "media",

            ClientError::TransportFailed { .. } | ClientError::EndpointUnavailable { .. } => {
                "transport"
            }

            ClientError::SessionFailed { .. }
            | ClientError::SessionError { .. }
            | ClientError::SessionClosed => "session",

            ClientError::NotifierFailed { .. } => "notifier",

            ClientError::InvalidConfiguration { .. } => "configuration",

            ClientError::InvalidTransition { .. } | ClientError::InvalidState { .. } => "state",

            ClientError::ClientStopped => "system",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_follows_taxonomy() {
        assert_eq!(ClientError::media_denied("x").severity(), ErrorSeverity::Fatal);
        assert_eq!(ClientError::transport_failed("x").severity(), ErrorSeverity::Fatal);
        assert_eq!(ClientError::session_failed("x").severity(), ErrorSeverity::Recoverable);
        assert_eq!(ClientError::SessionClosed.severity(), ErrorSeverity::PeerTermination);
        assert_eq!(ClientError::notifier_failed("x").severity(), ErrorSeverity::SideChannel);
    }

    #[test]
    fn test_only_session_failures_are_recoverable() {
        assert!(ClientError::session_failed("peer unavailable").is_recoverable());
        assert!(!ClientError::SessionClosed.is_recoverable());
        assert!(!ClientError::session_error("ice failed").is_recoverable());
        assert!(!ClientError::notifier_failed("503").is_recoverable());
        assert!(!ClientError::media_denied("denied").is_recoverable());
    }

    #[test]
    fn test_display_carries_reason() {
        let err = ClientError::invalid_config("retry.max_attempts", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: retry.max_attempts - must be at least 1"
        );
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_rejected_operations_are_their_own_bucket() {
        let err = ClientError::InvalidState {
            operation: "start_call".into(),
            state: CallState::Searching,
        };
        assert_eq!(err.severity(), ErrorSeverity::Rejected);
        assert!(!err.is_recoverable());
        assert!(!err.is_fatal());

        let err = ClientError::InvalidTransition {
            from: CallState::Ended,
            to: CallState::Idle,
        };
        assert_eq!(err.severity(), ErrorSeverity::Rejected);
        assert_eq!(err.category(), "state");
    }
}
